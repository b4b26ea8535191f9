//! Engine context
//!
//! Owns the registry, the scheduler and the notification engine. Every
//! mutation (tick, result, command, reload) goes through one `&mut self`
//! method, so a result is classified, checked for flapping, notified and
//! committed in a single step.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    classify, AdmissionSnapshot, Decision, NotificationEngine, NotificationTrigger, ProcessState,
    Scheduler, StaleReason, StateMachine, SuppressReason,
};
use crate::broadcast::{EventBroadcaster, EventListener};
use crate::commands::{parse_line, CommandContext, CommandEffect, CommandError, CommandProcessor};
use crate::config::EngineConfig;
use crate::contracts::{
    CheckRequest, CheckResult, EngineEvent, EventPayload, NotificationDispatch, StateChangeEvent,
};
use crate::model::{Checkable, CheckableId, CheckableState, FlapTransition, StateType, Timestamp};
use crate::registry::Registry;
use crate::render::{MacroContext, MacroRenderer, TemplateRenderer};
use crate::telemetry::EngineMetrics;
use crate::Result;

/// Why a result was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownCheckable,
    PassiveDisabled,
    Stale(StaleReason),
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::UnknownCheckable => "unknown_checkable",
            DiscardReason::PassiveDisabled => "passive_disabled",
            DiscardReason::Stale(reason) => reason.as_str(),
        }
    }
}

/// What happened to one check result
#[derive(Debug, Clone, PartialEq)]
pub enum ResultOutcome {
    Applied {
        state_change: Option<StateChangeEvent>,
        dispatches: Vec<NotificationDispatch>,
    },
    Discarded(DiscardReason),
}

impl ResultOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ResultOutcome::Applied { .. })
    }

    pub fn dispatches(&self) -> &[NotificationDispatch] {
        match self {
            ResultOutcome::Applied { dispatches, .. } => dispatches,
            ResultOutcome::Discarded(_) => &[],
        }
    }

    fn into_dispatches(self) -> Vec<NotificationDispatch> {
        match self {
            ResultOutcome::Applied { dispatches, .. } => dispatches,
            ResultOutcome::Discarded(_) => Vec::new(),
        }
    }
}

/// Work produced by one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Check requests with rendered commands
    pub requests: Vec<CheckRequest>,
    /// Notifications committed while handling timeouts and delayed recoveries
    pub dispatches: Vec<NotificationDispatch>,
}

/// Summary of one processed command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandReport {
    pub verb: String,
    pub effects: usize,
    pub dispatches: Vec<NotificationDispatch>,
}

/// A committed dispatch with its rendered delivery command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationJob {
    pub dispatch: NotificationDispatch,
    pub command: String,
}

/// Read-only view of one checkable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckableStatus {
    pub id: CheckableId,
    pub display_name: String,
    pub state: CheckableState,
    pub state_type: StateType,
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_check: Option<Timestamp>,
    pub next_check: Option<Timestamp>,
    pub output: String,
    pub checks_enabled: bool,
    pub accept_passive_checks: bool,
    pub notifications_enabled: bool,
    pub acknowledged: bool,
    pub in_downtime: bool,
    pub is_flapping: bool,
    pub notification_number: u32,
}

impl From<&Checkable> for CheckableStatus {
    fn from(checkable: &Checkable) -> Self {
        Self {
            id: checkable.id.clone(),
            display_name: checkable.display_name.clone(),
            state: checkable.current_state,
            state_type: checkable.state_type,
            attempt: checkable.current_attempt,
            max_attempts: checkable.max_attempts,
            last_check: checkable.last_check,
            next_check: checkable.next_check,
            output: checkable.plugin_output.clone(),
            checks_enabled: checkable.checks_enabled,
            accept_passive_checks: checkable.accept_passive_checks,
            notifications_enabled: checkable.notifications_enabled,
            acknowledged: checkable.is_acknowledged(),
            in_downtime: checkable.in_downtime,
            is_flapping: checkable.is_flapping,
            notification_number: checkable.current_notification_number,
        }
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub hosts: usize,
    pub services: usize,
    pub checkables: Vec<CheckableStatus>,
    pub admission: AdmissionSnapshot,
    pub notifications_enabled: bool,
    pub process: ProcessState,
}

/// Process-scoped engine state
pub struct EngineContext {
    config: EngineConfig,
    registry: Registry,
    scheduler: Scheduler,
    state_machine: StateMachine,
    notifier: NotificationEngine,
    processor: CommandProcessor,
    process: ProcessState,
    broadcaster: EventBroadcaster,
    metrics: EngineMetrics,
    renderer: Arc<dyn TemplateRenderer>,
    /// Hard-OK checkables whose recovery waits for the recovery delay
    pending_recoveries: BTreeSet<CheckableId>,
    scheduled: bool,
}

impl EngineContext {
    /// Create a context over a validated registry with fresh metrics
    pub fn new(config: EngineConfig, registry: Registry) -> Result<Self> {
        let metrics = EngineMetrics::new()?;
        Self::with_metrics(config, registry, metrics)
    }

    /// Create a context reporting into existing metrics
    pub fn with_metrics(
        config: EngineConfig,
        registry: Registry,
        metrics: EngineMetrics,
    ) -> Result<Self> {
        config.validate()?;
        registry.validate()?;

        tracing::info!(
            hosts = registry.host_count(),
            services = registry.service_count(),
            "Engine context created"
        );

        Ok(Self {
            scheduler: Scheduler::new(config.scheduler_config()),
            state_machine: StateMachine::new(config.state_machine_options()),
            notifier: NotificationEngine::new(config.enable_notifications),
            processor: CommandProcessor::new(),
            process: ProcessState::from_config(&config),
            broadcaster: EventBroadcaster::new(),
            renderer: Arc::new(MacroRenderer),
            pending_recoveries: BTreeSet::new(),
            scheduled: false,
            config,
            registry,
            metrics,
        })
    }

    /// Replace the template renderer
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) {
        self.broadcaster.subscribe(listener);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn process(&self) -> &ProcessState {
        &self.process
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Issue due checks
    ///
    /// Timed-out checks are resolved first so their admission slots are
    /// free for this tick.
    pub fn tick(&mut self, now: Timestamp) -> TickOutcome {
        self.ensure_scheduled(now);
        let mut outcome = TickOutcome::default();

        for result in self.scheduler.expire(now) {
            outcome
                .dispatches
                .extend(self.handle_result(result, now).into_dispatches());
        }
        self.refresh_downtimes(now);

        let pending: Vec<CheckableId> = self.pending_recoveries.iter().cloned().collect();
        for id in pending {
            outcome.dispatches.extend(self.recover(&id, now));
        }

        let mut requests = self.scheduler.tick(&mut self.registry, now);
        for request in &mut requests {
            let command = self.renderer.render(
                &request.command,
                &MacroContext::new(&self.registry, now).with_checkable(&request.id),
            );
            request.command = command;
            self.metrics.record_check_issued(request.id.kind().as_str());
        }
        self.update_gauges();

        outcome.requests = requests;
        outcome
    }

    /// Apply one check result
    pub fn handle_result(&mut self, result: CheckResult, now: Timestamp) -> ResultOutcome {
        self.ensure_scheduled(now);
        let source = result.source.as_str();

        let generation = match self.registry.checkable(&result.id) {
            None => return self.discard(&result, DiscardReason::UnknownCheckable),
            Some(checkable) if result.is_passive() && !checkable.accept_passive_checks => {
                return self.discard(&result, DiscardReason::PassiveDisabled)
            }
            Some(checkable) => checkable.generation,
        };
        if let Err(reason) = self.scheduler.accept_result(&result, generation) {
            return self.discard(&result, DiscardReason::Stale(reason));
        }
        let Some(classified) = classify(&self.registry, &result) else {
            return self.discard(&result, DiscardReason::UnknownCheckable);
        };

        let id = result.id.clone();
        let Some(checkable) = self.registry.checkable_mut(&id) else {
            return self.discard(&result, DiscardReason::UnknownCheckable);
        };
        let state_change = self.state_machine.apply_result(checkable, &classified, now);

        let mut flapping = None;
        if self.process.flap_detection_enabled && checkable.flap_detection_enabled {
            checkable.flap_history.record(checkable.current_state);
            if let Some(transition) = checkable.flap_history.evaluate(
                checkable.is_flapping,
                self.process.low_flap_threshold,
                self.process.high_flap_threshold,
            ) {
                checkable.is_flapping = transition == FlapTransition::Started;
                flapping = Some((transition, checkable.flap_history.percent_state_change()));
            }
        }
        if !result.is_passive() {
            self.scheduler.reschedule_after_result(checkable, now);
        }
        let hard = checkable.is_hard();
        let ok = checkable.current_state.is_ok();
        let episode_notified = !checkable.notified_states.is_empty();

        self.metrics.record_result(source, "applied");
        if let Some(event) = &state_change {
            let state_type = match event.state_type {
                StateType::Hard => "hard",
                StateType::Soft => "soft",
            };
            self.metrics.record_state_change(state_type);
            tracing::info!(
                checkable = %id,
                state = %event.state,
                state_type = %event.state_type,
                attempt = event.attempt,
                "State change"
            );
            self.emit(EventPayload::StateChange(event.clone()));
        }

        let mut dispatches = Vec::new();
        if let Some((transition, percent_state_change)) = flapping {
            tracing::info!(checkable = %id, ?transition, percent_state_change, "Flapping transition");
            self.emit(EventPayload::Flapping {
                id: id.clone(),
                transition,
                percent_state_change,
            });
            dispatches.extend(
                self.notify(&id, &NotificationTrigger::Flapping(transition), now)
                    .unwrap_or_default(),
            );
        }

        if hard && !ok {
            dispatches.extend(
                self.notify(&id, &NotificationTrigger::Problem, now)
                    .unwrap_or_default(),
            );
        } else if hard && episode_notified {
            dispatches.extend(self.recover(&id, now));
        }
        self.update_gauges();

        ResultOutcome::Applied {
            state_change,
            dispatches,
        }
    }

    /// Parse and execute one external command line
    pub fn handle_command(
        &mut self,
        line: &str,
        now: Timestamp,
    ) -> std::result::Result<CommandReport, CommandError> {
        self.ensure_scheduled(now);
        let command = parse_line(line).map_err(|err| {
            self.metrics.record_command("malformed", false);
            tracing::warn!(error = %err, "Rejected command line");
            err
        })?;
        let verb_label = if self.processor.supports(&command.verb) {
            command.verb.as_str()
        } else {
            "unknown"
        };

        let mut ctx = CommandContext {
            registry: &mut self.registry,
            scheduler: &mut self.scheduler,
            notifier: &mut self.notifier,
            process: &mut self.process,
            now,
        };
        let effects = match self.processor.execute(&mut ctx, &command) {
            Ok(effects) => {
                self.metrics.record_command(verb_label, true);
                effects
            }
            Err(err) => {
                self.metrics.record_command(verb_label, false);
                tracing::warn!(verb = %command.verb, error = %err, "Command failed");
                return Err(err);
            }
        };

        let report_effects = effects.len();
        let mut dispatches = Vec::new();
        for effect in effects {
            match effect {
                CommandEffect::SubmitResult(result) => {
                    dispatches.extend(self.handle_result(result, now).into_dispatches());
                }
                CommandEffect::Notify { id, trigger } => {
                    dispatches.extend(self.notify(&id, &trigger, now).unwrap_or_default());
                }
                CommandEffect::Downtime { id, active } => {
                    self.emit(EventPayload::Downtime { id, active });
                }
            }
        }
        self.update_gauges();

        Ok(CommandReport {
            verb: command.verb,
            effects: report_effects,
            dispatches,
        })
    }

    /// Atomically replace the registry
    ///
    /// Entities present in both registries keep their runtime status.
    /// Generations continue from the old registry, so results of checks
    /// issued before the reload are discarded.
    pub fn reload(&mut self, mut registry: Registry, now: Timestamp) -> Result<()> {
        registry.validate()?;

        let mut kept = 0usize;
        for id in registry.checkable_ids() {
            if let (Some(previous), Some(checkable)) =
                (self.registry.checkable(&id), registry.checkable_mut(&id))
            {
                checkable.inherit_runtime(previous);
                kept += 1;
            }
        }
        registry.continue_generations_from(&self.registry);

        let removed = self
            .registry
            .checkable_ids()
            .iter()
            .filter(|id| !registry.contains(id))
            .count();
        let added = registry.checkable_ids().len() - kept;

        self.registry = registry;
        self.scheduler.rebuild(&mut self.registry, now);
        self.scheduled = true;
        let registry = &self.registry;
        self.pending_recoveries.retain(|id| registry.contains(id));
        self.update_gauges();

        tracing::info!(kept, added, removed, "Registry reloaded");
        Ok(())
    }

    /// Render the delivery command of each dispatch
    ///
    /// Dispatches to contacts without a notification command are skipped.
    pub fn notification_jobs(
        &self,
        dispatches: &[NotificationDispatch],
        now: Timestamp,
    ) -> Vec<NotificationJob> {
        dispatches
            .iter()
            .filter_map(|dispatch| {
                let contact = self.registry.contact(&dispatch.contact)?;
                let template = contact.notification_command.as_deref()?;
                let ctx = MacroContext::new(&self.registry, now)
                    .with_checkable(&dispatch.id)
                    .with_contact(contact)
                    .with_notification(dispatch);
                Some(NotificationJob {
                    dispatch: dispatch.clone(),
                    command: self.renderer.render(template, &ctx),
                })
            })
            .collect()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let checkables = self
            .registry
            .checkable_ids()
            .iter()
            .filter_map(|id| self.registry.checkable(id))
            .map(CheckableStatus::from)
            .collect();
        EngineSnapshot {
            hosts: self.registry.host_count(),
            services: self.registry.service_count(),
            checkables,
            admission: self.scheduler.admission(),
            notifications_enabled: self.notifier.is_enabled(),
            process: self.process.clone(),
        }
    }

    fn ensure_scheduled(&mut self, now: Timestamp) {
        if !self.scheduled {
            self.scheduler.populate(&mut self.registry, now);
            self.scheduled = true;
        }
    }

    fn discard(&self, result: &CheckResult, reason: DiscardReason) -> ResultOutcome {
        self.metrics
            .record_result(result.source.as_str(), reason.as_str());
        tracing::debug!(
            checkable = %result.id,
            generation = ?result.generation,
            reason = reason.as_str(),
            "Check result discarded"
        );
        ResultOutcome::Discarded(reason)
    }

    /// Evaluate and commit one trigger
    fn notify(
        &mut self,
        id: &CheckableId,
        trigger: &NotificationTrigger,
        now: Timestamp,
    ) -> std::result::Result<Vec<NotificationDispatch>, SuppressReason> {
        let Some(checkable) = self.registry.checkable(id) else {
            return Ok(Vec::new());
        };
        let plan = match self
            .notifier
            .evaluate(checkable, &self.registry, trigger, now)
        {
            Decision::Notify(plan) => plan,
            Decision::Suppressed(reason) => {
                self.metrics.record_suppressed(reason.as_str());
                return Err(reason);
            }
        };

        let Some(checkable) = self.registry.checkable_mut(id) else {
            return Ok(Vec::new());
        };
        let dispatches = match self.notifier.commit(checkable, &plan, now) {
            Ok(dispatches) => dispatches,
            Err(err) => {
                tracing::warn!(checkable = %id, error = %err, "Notification commit rejected");
                return Ok(Vec::new());
            }
        };

        self.metrics
            .record_notification(plan.kind.as_str(), dispatches.len());
        for dispatch in &dispatches {
            self.emit(EventPayload::Notification(dispatch.clone()));
        }
        Ok(dispatches)
    }

    /// Try the recovery notification of a hard-OK checkable
    fn recover(&mut self, id: &CheckableId, now: Timestamp) -> Vec<NotificationDispatch> {
        let still_ok = self
            .registry
            .checkable(id)
            .map(|checkable| checkable.is_hard() && checkable.current_state.is_ok())
            .unwrap_or(false);
        if !still_ok {
            self.pending_recoveries.remove(id);
            return Vec::new();
        }

        match self.notify(id, &NotificationTrigger::Recovery, now) {
            Ok(dispatches) => {
                self.pending_recoveries.remove(id);
                dispatches
            }
            Err(SuppressReason::RecoveryDelay) => {
                self.pending_recoveries.insert(id.clone());
                Vec::new()
            }
            Err(_) => {
                self.pending_recoveries.remove(id);
                Vec::new()
            }
        }
    }

    fn refresh_downtimes(&mut self, now: Timestamp) {
        let mut changed = Vec::new();
        for id in self.registry.checkable_ids() {
            if let Some(checkable) = self.registry.checkable_mut(&id) {
                if let Some(active) = checkable.refresh_downtime(now) {
                    changed.push((id, active));
                }
            }
        }
        for (id, active) in changed {
            tracing::info!(checkable = %id, active, "Downtime changed");
            self.emit(EventPayload::Downtime { id, active });
        }
    }

    fn emit(&self, payload: EventPayload) {
        let delivery = self.broadcaster.notify(&EngineEvent::new(payload));
        self.metrics.record_listener_failures(delivery.failed);
    }

    fn update_gauges(&self) {
        self.metrics
            .set_outstanding(self.scheduler.outstanding_count());
        self.metrics.set_scheduled(self.scheduler.len());
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("hosts", &self.registry.host_count())
            .field("services", &self.registry.service_count())
            .field("scheduled", &self.scheduler.len())
            .field("outstanding", &self.scheduler.outstanding_count())
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MockEventListener;
    use crate::contracts::NotificationKind;
    use crate::model::{Contact, Host, HostState, Service, ServiceState};

    fn config() -> EngineConfig {
        EngineConfig::builder()
            .max_jitter(0)
            .max_concurrent_checks(None)
            .build()
    }

    fn context() -> EngineContext {
        let mut registry = Registry::new();
        registry.add_contact(Contact::new("ops")).unwrap();
        registry
            .add_host(Host::new("web01", "10.0.0.1").with_checkable(|c| {
                c.with_check_command("check_ping -H $HOSTADDRESS$")
                    .with_contact("ops")
            }))
            .unwrap();
        registry
            .add_service(
                Service::new("web01", "http").with_checkable(|c| {
                    c.with_check_command("check_http $HOSTADDRESS$")
                        .with_max_attempts(3)
                        .with_contact("ops")
                }),
            )
            .unwrap();
        EngineContext::new(config(), registry).unwrap()
    }

    fn http() -> CheckableId {
        CheckableId::service("web01", "http")
    }

    #[test]
    fn test_tick_renders_commands() {
        let mut ctx = context();
        let outcome = ctx.tick(0);
        assert_eq!(outcome.requests.len(), 2);
        let request = outcome.requests.iter().find(|r| r.id == http()).unwrap();
        assert_eq!(request.command, "check_http 10.0.0.1");
        assert!(ctx.metrics().encode().unwrap().contains("watchkeeper_outstanding_checks 2"));
    }

    #[test]
    fn test_result_without_request_is_discarded() {
        let mut ctx = context();
        let result = CheckResult::active(http(), ctx.registry().checkable(&http()).unwrap().generation, 2, "CRIT", 5);
        assert_eq!(
            ctx.handle_result(result, 10),
            ResultOutcome::Discarded(DiscardReason::Stale(StaleReason::NotOutstanding))
        );
        assert!(!ctx.registry().checkable(&http()).unwrap().has_been_checked);
    }

    #[test]
    fn test_passive_results_respect_accept_flag() {
        let mut ctx = context();
        ctx.handle_command("[1] DISABLE_PASSIVE_SVC_CHECKS;web01;http", 1).unwrap();
        let outcome = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), 2);
        assert_eq!(outcome, ResultOutcome::Discarded(DiscardReason::PassiveDisabled));
    }

    #[test]
    fn test_hard_problem_notifies_once_per_interval() {
        let mut ctx = context();
        ctx.handle_command("[1] CHANGE_MAX_SVC_CHECK_ATTEMPTS;web01;http;1", 1).unwrap();
        let outcome = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), 10);
        assert_eq!(outcome.dispatches().len(), 1);
        assert_eq!(outcome.dispatches()[0].kind, NotificationKind::Problem);

        let outcome = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), 20);
        assert!(outcome.dispatches().is_empty());
        assert_eq!(ctx.registry().checkable(&http()).unwrap().current_notification_number, 1);
    }

    #[test]
    fn test_events_reach_listeners() {
        let mut ctx = context();
        let mut listener = MockEventListener::new();
        listener.expect_name().return_const("mock".to_string());
        listener.expect_on_event().times(1..).returning(|_| Ok(()));
        ctx.subscribe(Arc::new(listener));

        let outcome = ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), 10);
        match outcome {
            ResultOutcome::Applied { state_change, .. } => {
                let event = state_change.unwrap();
                assert_eq!(event.state, CheckableState::Service(ServiceState::Critical));
                assert_eq!(event.state_type, StateType::Soft);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_command_report_and_errors() {
        let mut ctx = context();
        let report = ctx
            .handle_command("[5] PROCESS_HOST_CHECK_RESULT;web01;1;down", 5)
            .unwrap();
        assert_eq!(report.verb, "PROCESS_HOST_CHECK_RESULT");
        assert_eq!(report.effects, 1);
        assert_eq!(
            ctx.registry().host("web01").unwrap().checkable.current_state,
            CheckableState::Host(HostState::Down)
        );

        assert!(ctx.handle_command("[5] NOPE", 5).is_err());
        let metrics = ctx.metrics().encode().unwrap();
        assert!(metrics.contains("verb=\"unknown\""));
    }

    #[test]
    fn test_reload_keeps_runtime_and_discards_old_results() {
        let mut ctx = context();
        let request = ctx.tick(0).requests.into_iter().find(|r| r.id == http()).unwrap();

        let mut registry = Registry::new();
        registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
        registry.add_service(Service::new("web01", "http")).unwrap();
        ctx.handle_result(CheckResult::passive(http(), 2, "CRIT"), 5);
        ctx.reload(registry, 10).unwrap();

        let checkable = ctx.registry().checkable(&http()).unwrap();
        assert_eq!(checkable.current_state, CheckableState::Service(ServiceState::Critical));
        assert_ne!(checkable.generation, request.generation);

        let late = CheckResult::active(http(), request.generation, 0, "OK", 5);
        assert!(!ctx.handle_result(late, 11).is_applied());
    }

    #[test]
    fn test_notification_jobs_render_contact_command() {
        let mut registry = Registry::new();
        let mut contact = Contact::new("ops").with_email("ops@example.com");
        contact.notification_command =
            Some("notify --to $CONTACTEMAIL$ '$NOTIFICATIONTYPE$ $HOSTNAME$ is $HOSTSTATE$'".to_string());
        registry.add_contact(contact).unwrap();
        registry
            .add_host(Host::new("db01", "10.0.0.2").with_checkable(|c| c.with_max_attempts(1).with_contact("ops")))
            .unwrap();
        let mut ctx = EngineContext::new(config(), registry).unwrap();

        let outcome = ctx.handle_result(CheckResult::passive(CheckableId::host("db01"), 1, "down"), 10);
        let jobs = ctx.notification_jobs(outcome.dispatches(), 10);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].command, "notify --to ops@example.com 'PROBLEM db01 is DOWN'");
    }
}
