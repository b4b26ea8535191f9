//! End-to-end engine scenarios
//!
//! Drives an `EngineContext` through ticks, check results and external
//! commands the way the runner does, without a tokio runtime.

use watchkeeper_core::commands::CommandError;
use watchkeeper_core::config::EngineConfig;
use watchkeeper_core::contracts::{CheckResult, NotificationKind};
use watchkeeper_core::engine::{
    Decision, EngineContext, NotificationEngine, NotificationError, NotificationTrigger,
    ResultOutcome, SuppressReason, TimeoutState,
};
use watchkeeper_core::model::{
    CheckableId, CheckableState, Contact, Escalation, Host, HostGroup, HostState, Service,
    ServiceState, StateType, Timestamp,
};
use watchkeeper_core::Registry;

const NOON: Timestamp = 43_200;

fn config() -> EngineConfig {
    EngineConfig::builder()
        .max_jitter(0)
        .max_concurrent_checks(None)
        .build()
}

fn http() -> CheckableId {
    CheckableId::service("web01", "http")
}

fn base_registry() -> Registry {
    let mut registry = Registry::new();
    registry.add_contact(Contact::new("ops")).unwrap();
    registry.add_contact(Contact::new("oncall")).unwrap();
    registry
}

/// Tick at `now`, answer the request for `id` with `return_code`
fn run_check(ctx: &mut EngineContext, id: &CheckableId, return_code: i32, now: Timestamp) -> ResultOutcome {
    let outcome = ctx.tick(now);
    let request = outcome
        .requests
        .into_iter()
        .find(|request| &request.id == id)
        .unwrap_or_else(|| panic!("no request for {} at {}", id, now));
    ctx.handle_result(
        CheckResult::active(request.id, request.generation, return_code, "CRITICAL - refused", 12),
        now,
    )
}

fn status(ctx: &EngineContext, id: &CheckableId) -> (CheckableState, StateType, u32) {
    let checkable = ctx.registry().checkable(id).unwrap();
    (checkable.current_state, checkable.state_type, checkable.current_attempt)
}

#[test]
fn test_soft_retries_then_hard_problem_notifies_once() {
    let mut registry = base_registry();
    registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
    registry
        .add_service(Service::new("web01", "http").with_checkable(|c| {
            c.with_check_command("check_http")
                .with_max_attempts(3)
                .with_intervals(300, 60)
                .with_contact("ops")
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();
    let critical = CheckableState::Service(ServiceState::Critical);

    let first = run_check(&mut ctx, &http(), 2, NOON);
    assert!(first.dispatches().is_empty());
    assert_eq!(status(&ctx, &http()), (critical, StateType::Soft, 1));
    assert_eq!(ctx.scheduler().next_due(&http()), Some(NOON + 60));

    let second = run_check(&mut ctx, &http(), 2, NOON + 60);
    assert!(second.dispatches().is_empty());
    assert_eq!(status(&ctx, &http()), (critical, StateType::Soft, 2));

    let third = run_check(&mut ctx, &http(), 2, NOON + 120);
    assert_eq!(status(&ctx, &http()), (critical, StateType::Hard, 1));
    assert_eq!(third.dispatches().len(), 1);
    let dispatch = &third.dispatches()[0];
    assert_eq!(dispatch.kind, NotificationKind::Problem);
    assert_eq!(dispatch.contact, "ops");
    assert_eq!(dispatch.notification_number, 1);

    match third {
        ResultOutcome::Applied { state_change, .. } => {
            let event = state_change.unwrap();
            assert!(event.hard_change);
            assert_eq!(event.attempt, 3);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    // Back on the normal interval once hard
    assert_eq!(ctx.scheduler().next_due(&http()), Some(NOON + 120 + 300));
}

#[test]
fn test_recovery_waits_for_recovery_delay() {
    let mut registry = base_registry();
    registry
        .add_host(Host::new("web01", "10.0.0.1").with_checkable(|c| {
            c.with_max_attempts(1)
                .with_recovery_delay(600)
                .with_contact("ops")
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();
    let host = CheckableId::host("web01");

    let down = ctx.handle_result(CheckResult::passive(host.clone(), 1, "DOWN"), NOON);
    assert_eq!(down.dispatches().len(), 1);
    assert_eq!(down.dispatches()[0].kind, NotificationKind::Problem);

    let up = ctx.handle_result(CheckResult::passive(host.clone(), 0, "UP"), NOON + 60);
    assert!(up.dispatches().is_empty());
    assert_eq!(
        status(&ctx, &host),
        (CheckableState::Host(HostState::Up), StateType::Hard, 1)
    );

    assert!(ctx.tick(NOON + 60 + 300).dispatches.is_empty());

    let recovered = ctx.tick(NOON + 60 + 600).dispatches;
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].kind, NotificationKind::Recovery);
    assert_eq!(recovered[0].notification_number, 2);

    assert!(ctx.tick(NOON + 60 + 900).dispatches.is_empty());
    let checkable = ctx.registry().checkable(&host).unwrap();
    assert!(checkable.notified_states.is_empty());
    assert_eq!(checkable.next_notification_id, 3);
}

#[test]
fn test_recovery_is_dropped_when_problem_returns() {
    let mut registry = base_registry();
    registry
        .add_host(Host::new("web01", "10.0.0.1").with_checkable(|c| {
            c.with_max_attempts(1)
                .with_recovery_delay(600)
                .with_contact("ops")
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();
    let host = CheckableId::host("web01");

    ctx.handle_result(CheckResult::passive(host.clone(), 1, "DOWN"), NOON);
    ctx.handle_result(CheckResult::passive(host.clone(), 0, "UP"), NOON + 60);
    // Down again before the delay elapsed
    let again = ctx.handle_result(CheckResult::passive(host.clone(), 1, "DOWN"), NOON + 120);
    assert_eq!(again.dispatches().len(), 1);
    assert_eq!(again.dispatches()[0].kind, NotificationKind::Problem);

    assert!(ctx.tick(NOON + 60 + 700).dispatches.is_empty());
}

#[test]
fn test_recovery_needs_a_notified_problem() {
    let mut registry = base_registry();
    registry
        .add_host(Host::new("web01", "10.0.0.1").with_checkable(|c| {
            c.with_max_attempts(3).with_contact("ops")
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();
    let host = CheckableId::host("web01");

    // Soft problem never notified, so the recovery is silent
    let soft = ctx.handle_result(CheckResult::passive(host.clone(), 1, "DOWN"), NOON);
    assert!(soft.dispatches().is_empty());
    let up = ctx.handle_result(CheckResult::passive(host.clone(), 0, "UP"), NOON + 10);
    assert!(up.dispatches().is_empty());
    assert_eq!(
        ctx.registry().checkable(&host).unwrap().current_notification_number,
        0
    );
}

#[test]
fn test_group_command_only_touches_group_services() {
    let mut registry = base_registry();
    for (host, address) in [("web01", "10.0.0.1"), ("web02", "10.0.0.2"), ("db01", "10.0.0.3")] {
        registry.add_host(Host::new(host, address)).unwrap();
        registry.add_service(Service::new(host, "ssh")).unwrap();
    }
    registry
        .add_hostgroup(HostGroup::new("web").with_member("web01").with_member("web02"))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();

    ctx.handle_command("[1317196300] DISABLE_HOSTGROUP_PASSIVE_SVC_CHECKS;web", NOON)
        .unwrap();
    let report = ctx
        .handle_command("[1317196300] ENABLE_HOSTGROUP_PASSIVE_SVC_CHECKS;web", NOON)
        .unwrap();
    assert_eq!(report.verb, "ENABLE_HOSTGROUP_PASSIVE_SVC_CHECKS");

    ctx.handle_command("[1317196300] DISABLE_HOSTGROUP_PASSIVE_SVC_CHECKS;web", NOON)
        .unwrap();
    let registry = ctx.registry();
    assert!(!registry.service("web01", "ssh").unwrap().checkable.accept_passive_checks);
    assert!(!registry.service("web02", "ssh").unwrap().checkable.accept_passive_checks);
    assert!(registry.service("db01", "ssh").unwrap().checkable.accept_passive_checks);
    assert!(registry.host("web01").unwrap().checkable.accept_passive_checks);

    let before = ctx.snapshot();
    assert!(matches!(
        ctx.handle_command("[1317196300] DISABLE_HOSTGROUP_PASSIVE_SVC_CHECKS;db", NOON),
        Err(CommandError::UnknownTarget { kind: "hostgroup", .. })
    ));
    assert_eq!(ctx.snapshot(), before);
}

#[test]
fn test_evaluation_is_pure_and_commit_is_idempotent() {
    let mut registry = base_registry();
    registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
    registry
        .add_service(Service::new("web01", "http").with_checkable(|c| {
            c.with_max_attempts(1).with_contact("ops")
        }))
        .unwrap();
    let silent = EngineConfig::builder()
        .max_jitter(0)
        .enable_notifications(false)
        .build();
    let mut ctx = EngineContext::new(silent, registry).unwrap();
    ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON);

    let mut registry = ctx.registry().clone();
    let engine = NotificationEngine::new(true);
    let checkable = registry.checkable(&http()).unwrap().clone();

    let first = engine.evaluate(&checkable, &registry, &NotificationTrigger::Problem, NOON + 5);
    let second = engine.evaluate(&checkable, &registry, &NotificationTrigger::Problem, NOON + 5);
    assert_eq!(first, second);
    let untouched = registry.checkable(&http()).unwrap();
    assert_eq!(untouched.next_notification_id, checkable.next_notification_id);
    assert_eq!(untouched.current_notification_number, 0);

    let plan = first.plan().unwrap().clone();
    assert_eq!(plan.contacts, vec!["ops".to_string()]);
    let target = registry.checkable_mut(&http()).unwrap();
    let dispatches = engine.commit(target, &plan, NOON + 5).unwrap();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(target.current_notification_number, 1);

    assert!(matches!(
        engine.commit(target, &plan, NOON + 5),
        Err(NotificationError::StalePlan { .. })
    ));
    assert_eq!(target.current_notification_number, 1);
}

#[test]
fn test_zero_interval_notifies_only_once() {
    let mut registry = base_registry();
    registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
    registry
        .add_service(Service::new("web01", "http").with_checkable(|c| {
            c.with_max_attempts(1)
                .with_notification_interval(0)
                .with_contact("ops")
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();

    let first = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON);
    assert_eq!(first.dispatches().len(), 1);
    for offset in [3_600, 86_400] {
        let repeat = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON + offset);
        assert!(repeat.dispatches().is_empty());
    }
}

#[test]
fn test_escalation_adds_contacts_from_second_notification() {
    let mut registry = base_registry();
    registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
    registry
        .add_service(Service::new("web01", "http").with_checkable(|c| {
            c.with_max_attempts(1)
                .with_notification_interval(600)
                .with_contact("ops")
                .with_escalation(Escalation::new(2, 0).with_contact("oncall"))
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();

    let first = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON);
    let contacts: Vec<&str> = first.dispatches().iter().map(|d| d.contact.as_str()).collect();
    assert_eq!(contacts, vec!["ops"]);

    let early = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON + 300);
    assert!(early.dispatches().is_empty());

    let second = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON + 600);
    let contacts: Vec<&str> = second.dispatches().iter().map(|d| d.contact.as_str()).collect();
    assert_eq!(contacts, vec!["ops", "oncall"]);
    assert!(second.dispatches().iter().all(|d| d.notification_number == 2));
}

#[test]
fn test_acknowledgement_silences_problem_until_recovery() {
    let mut registry = base_registry();
    registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
    registry
        .add_service(Service::new("web01", "http").with_checkable(|c| {
            c.with_max_attempts(1)
                .with_notification_interval(60)
                .with_contact("ops")
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();

    ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON);
    let report = ctx
        .handle_command(
            "[43210] ACKNOWLEDGE_SVC_PROBLEM;web01;http;2;1;0;alice;looking into it",
            NOON + 10,
        )
        .unwrap();
    assert_eq!(report.dispatches.len(), 1);
    assert_eq!(report.dispatches[0].kind, NotificationKind::Acknowledgement);
    assert_eq!(report.dispatches[0].author.as_deref(), Some("alice"));

    let silenced = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON + 3_600);
    assert!(silenced.dispatches().is_empty());

    let recovered = ctx.handle_result(CheckResult::passive(http(), 0, "OK"), NOON + 3_700);
    assert_eq!(recovered.dispatches().len(), 1);
    assert_eq!(recovered.dispatches()[0].kind, NotificationKind::Recovery);
    assert!(!ctx.registry().checkable(&http()).unwrap().is_acknowledged());
}

#[test]
fn test_downtime_suppresses_problem_notifications() {
    let mut registry = base_registry();
    registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
    registry
        .add_service(Service::new("web01", "http").with_checkable(|c| {
            c.with_max_attempts(1).with_contact("ops")
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();

    let start = NOON;
    let end = NOON + 3_600;
    ctx.handle_command(
        &format!(
            "[{start}] SCHEDULE_SVC_DOWNTIME;web01;http;{start};{end};1;0;3600;bob;patching"
        ),
        NOON,
    )
    .unwrap();
    ctx.tick(NOON);
    assert!(ctx.registry().checkable(&http()).unwrap().in_downtime);

    let during = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON + 60);
    assert!(during.dispatches().is_empty());

    let engine = NotificationEngine::new(true);
    let checkable = ctx.registry().checkable(&http()).unwrap();
    assert_eq!(
        engine.evaluate(checkable, ctx.registry(), &NotificationTrigger::Problem, NOON + 60),
        Decision::Suppressed(SuppressReason::InDowntime)
    );

    ctx.tick(end);
    assert!(!ctx.registry().checkable(&http()).unwrap().in_downtime);
    let after = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), end + 1);
    assert_eq!(after.dispatches().len(), 1);
}

#[test]
fn test_timed_out_checks_harden_into_a_problem_notification() {
    let mut registry = base_registry();
    registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
    registry
        .add_service(Service::new("web01", "http").with_checkable(|c| {
            c.with_check_command("check_http")
                .with_intervals(300, 60)
                .with_max_attempts(2)
                .with_contact("ops")
        }))
        .unwrap();
    let config = EngineConfig::builder()
        .max_jitter(0)
        .max_concurrent_checks(None)
        .default_check_timeout(10)
        .timeout_state(TimeoutState::Critical)
        .build();
    let mut ctx = EngineContext::new(config, registry).unwrap();

    // Nobody ever answers the requests
    let issued = |ctx: &mut EngineContext, now| {
        ctx.tick(now).requests.iter().any(|request| request.id == http())
    };
    assert!(issued(&mut ctx, NOON));
    let first = ctx.tick(NOON + 10);
    assert!(first.dispatches.is_empty());
    assert_eq!(
        status(&ctx, &http()),
        (CheckableState::Service(ServiceState::Critical), StateType::Soft, 1)
    );
    assert_eq!(ctx.scheduler().next_due(&http()), Some(NOON + 10 + 60));

    assert!(issued(&mut ctx, NOON + 70));
    let second = ctx.tick(NOON + 80);
    assert_eq!(
        status(&ctx, &http()),
        (CheckableState::Service(ServiceState::Critical), StateType::Hard, 1)
    );
    assert_eq!(second.dispatches.len(), 1);
    let dispatch = &second.dispatches[0];
    assert_eq!(dispatch.kind, NotificationKind::Problem);
    assert_eq!(dispatch.contact, "ops");
    assert_eq!(dispatch.notification_number, 1);
    assert_eq!(dispatch.output, "(Check timed out after 10 seconds)");
}

#[test]
fn test_failed_execution_reports_unknown_problem() {
    let mut registry = base_registry();
    registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
    registry
        .add_service(Service::new("web01", "http").with_checkable(|c| {
            c.with_check_command("check_http")
                .with_max_attempts(1)
                .with_contact("ops")
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();

    // A connector that could not execute the plugin answers with code 3 and its stderr
    let request = ctx
        .tick(NOON)
        .requests
        .into_iter()
        .find(|request| request.id == http())
        .unwrap();
    let outcome = ctx.handle_result(
        CheckResult::active(request.id, request.generation, 3, "execvp: No such file", 0),
        NOON + 1,
    );
    assert_eq!(
        status(&ctx, &http()),
        (CheckableState::Service(ServiceState::Unknown), StateType::Hard, 1)
    );
    assert_eq!(outcome.dispatches().len(), 1);
    assert_eq!(outcome.dispatches()[0].kind, NotificationKind::Problem);
    assert_eq!(outcome.dispatches()[0].output, "execvp: No such file");
}

#[test]
fn test_acknowledgement_notification_is_numbered() {
    let mut registry = base_registry();
    registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
    registry
        .add_service(Service::new("web01", "http").with_checkable(|c| {
            c.with_max_attempts(1).with_contact("ops")
        }))
        .unwrap();
    let mut ctx = EngineContext::new(config(), registry).unwrap();

    let problem = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), NOON);
    assert_eq!(problem.dispatches()[0].notification_number, 1);

    let ack = ctx
        .handle_command("[43210] ACKNOWLEDGE_SVC_PROBLEM;web01;http;2;1;0;alice;on it", NOON + 10)
        .unwrap();
    assert_eq!(ack.dispatches[0].notification_number, 2);
    let custom = ctx
        .handle_command("[43220] SEND_CUSTOM_SVC_NOTIFICATION;web01;http;4;alice;drill", NOON + 20)
        .unwrap();
    assert_eq!(custom.dispatches[0].notification_number, 3);

    let checkable = ctx.registry().checkable(&http()).unwrap();
    assert_eq!(checkable.current_notification_number, 3);
    assert_eq!(checkable.last_notification, Some(NOON + 20));

    let recovered = ctx.handle_result(CheckResult::passive(http(), 0, "OK"), NOON + 30);
    assert_eq!(recovered.dispatches()[0].kind, NotificationKind::Recovery);
    assert_eq!(recovered.dispatches()[0].notification_number, 4);
}
