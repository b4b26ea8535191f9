//! Loading engine and object configuration from disk

use std::fs;
use tempfile::TempDir;
use watchkeeper_core::config::{ConfigError, DelegateKind, EngineConfig, LogFormat, ObjectConfig};
use watchkeeper_core::contracts::CheckResult;
use watchkeeper_core::engine::{EngineContext, TimeoutState};
use watchkeeper_core::model::{CheckableId, CheckableState, HostState};

const ENGINE_TOML: &str = r#"
tick_interval_ms = 250
max_concurrent_checks = 8
default_check_timeout = 20
timeout_state = "unknown"
max_jitter = 0
log_format = "pretty"
http_listen = "0.0.0.0:9180"
"#;

const OBJECTS_YAML: &str = r#"
contacts:
  - name: ops
    notification_command: "notify --to ops '$NOTIFICATIONTYPE$ $HOSTNAME$'"
hosts:
  - name: router
    address: 10.0.0.254
  - name: web01
    address: 10.0.0.1
    parents: [router]
    check_command: check_ping -H $HOSTADDRESS$
    max_check_attempts: 1
    contacts: [ops]
    services:
      - description: http
        check_command: check_http
hostgroups:
  - name: web
    members: [web01]
"#;

#[test]
fn test_engine_config_from_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    fs::write(&path, ENGINE_TOML).unwrap();

    let config = EngineConfig::from_file(&path).unwrap();
    assert_eq!(config.tick_interval_ms, 250);
    assert_eq!(config.max_concurrent_checks, Some(8));
    assert_eq!(config.default_check_timeout, 20);
    assert_eq!(config.timeout_state, TimeoutState::Unknown);
    assert_eq!(config.log_format, LogFormat::Pretty);
    assert_eq!(config.delegate, DelegateKind::Process);
    assert_eq!(config.http_listen.as_deref(), Some("0.0.0.0:9180"));
    // Unset fields keep their defaults
    assert!(config.enable_notifications);
}

#[test]
fn test_connector_without_command_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.yaml");
    fs::write(&path, "delegate: connector\n").unwrap();

    assert!(matches!(
        EngineConfig::from_file(&path),
        Err(ConfigError::InvalidValue { ref field, .. }) if field == "connector_command"
    ));
}

#[test]
fn test_unknown_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.ini");
    fs::write(&path, "").unwrap();
    assert!(matches!(
        EngineConfig::from_file(&path),
        Err(ConfigError::UnknownFormat(_))
    ));
}

#[test]
fn test_objects_drive_an_engine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("objects.yaml");
    fs::write(&path, OBJECTS_YAML).unwrap();

    let registry = ObjectConfig::from_file(&path).unwrap().into_registry().unwrap();
    let config = EngineConfig::builder().max_jitter(0).build();
    let mut ctx = EngineContext::new(config, registry).unwrap();

    let requests = ctx.tick(1_000).requests;
    let ping = requests
        .iter()
        .find(|request| request.id == CheckableId::host("web01"))
        .unwrap();
    assert_eq!(ping.command, "check_ping -H 10.0.0.1");

    // Parent router is down, so web01 going down is unreachable
    ctx.handle_result(CheckResult::passive(CheckableId::host("router"), 1, "DOWN"), 1_001);
    let outcome = ctx.handle_result(CheckResult::passive(CheckableId::host("web01"), 1, "DOWN"), 1_002);
    assert_eq!(
        ctx.registry().host("web01").unwrap().checkable.current_state,
        CheckableState::Host(HostState::Unreachable)
    );

    let jobs = ctx.notification_jobs(outcome.dispatches(), 1_002);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].command, "notify --to ops 'PROBLEM web01'");
}

#[test]
fn test_reload_from_edited_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("objects.yaml");
    fs::write(&path, OBJECTS_YAML).unwrap();
    let registry = ObjectConfig::from_file(&path).unwrap().into_registry().unwrap();
    let mut ctx = EngineContext::new(EngineConfig::builder().max_jitter(0).build(), registry).unwrap();
    ctx.handle_command("[10] DISABLE_HOST_CHECK;web01", 10).unwrap();
    ctx.handle_command("[10] PROCESS_HOST_CHECK_RESULT;web01;1;PING CRITICAL", 10)
        .unwrap();

    let edited = OBJECTS_YAML.replace("hostgroups:", "  - name: db01\n    address: 10.0.0.5\nhostgroups:");
    fs::write(&path, edited).unwrap();
    let registry = ObjectConfig::from_file(&path).unwrap().into_registry().unwrap();
    ctx.reload(registry, 20).unwrap();

    assert!(ctx.registry().host("db01").is_some());
    let web01 = &ctx.registry().host("web01").unwrap().checkable;
    // Runtime status survives, object settings come from the file
    assert_eq!(web01.plugin_output, "PING CRITICAL");
    assert_eq!(web01.current_notification_number, 1);
    assert!(web01.checks_enabled);
}
