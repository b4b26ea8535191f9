use proptest::prelude::*;
use std::collections::BTreeSet;
use watchkeeper_core::config::EngineConfig;
use watchkeeper_core::contracts::{CheckResult, NotificationKind};
use watchkeeper_core::engine::{ClassifiedResult, EngineContext, StateMachine, StateMachineOptions};
use watchkeeper_core::model::{
    Checkable, CheckableId, CheckableState, Contact, FlapHistory, Host, Service, ServiceState,
    StateType,
};
use watchkeeper_core::Registry;

fn service(max_attempts: u32) -> Checkable {
    Checkable::new(CheckableId::service("web01", "http")).with_max_attempts(max_attempts)
}

proptest! {
    #[test]
    fn hardens_exactly_at_max_attempts(
        max_attempts in 1u32..6,
        codes in prop::collection::vec(0i32..4, 1..40),
    ) {
        let machine = StateMachine::new(StateMachineOptions::default());
        let mut checkable = service(max_attempts);
        let mut consecutive_problems = 0u32;

        for (offset, code) in codes.into_iter().enumerate() {
            let state = CheckableState::Service(ServiceState::from_return_code(code));
            machine.apply_result(&mut checkable, &ClassifiedResult::new(state, "out", false), offset as i64);

            prop_assert_eq!(checkable.current_state, state);
            if state.is_ok() {
                consecutive_problems = 0;
                prop_assert_eq!(checkable.state_type, StateType::Hard);
                prop_assert_eq!(checkable.current_attempt, 1);
                continue;
            }

            consecutive_problems += 1;
            if consecutive_problems >= max_attempts {
                prop_assert_eq!(checkable.state_type, StateType::Hard);
                prop_assert_eq!(checkable.current_attempt, 1);
                prop_assert_eq!(checkable.last_hard_state, state);
            } else {
                prop_assert_eq!(checkable.state_type, StateType::Soft);
                prop_assert_eq!(checkable.current_attempt, consecutive_problems);
            }
            prop_assert!(checkable.current_attempt <= checkable.max_attempts);
        }
    }

    #[test]
    fn passive_problems_harden_when_configured(
        max_attempts in 2u32..6,
        code in 1i32..4,
    ) {
        let machine = StateMachine::new(StateMachineOptions { passive_results_always_hard: true });
        let mut checkable = service(max_attempts);
        let state = CheckableState::Service(ServiceState::from_return_code(code));

        let event = machine.apply_result(&mut checkable, &ClassifiedResult::new(state, "out", true), 0);
        prop_assert!(event.map(|e| e.hard_change).unwrap_or(false));
        prop_assert_eq!(checkable.state_type, StateType::Hard);
    }

    #[test]
    fn percent_state_change_is_bounded(codes in prop::collection::vec(0i32..4, 0..60)) {
        let mut history = FlapHistory::default();
        for code in codes {
            history.record(CheckableState::Service(ServiceState::from_return_code(code)));
            let percent = history.percent_state_change();
            prop_assert!((0.0..=100.0).contains(&percent));
        }
    }

    #[test]
    fn notification_ids_advance_once_per_commit(
        max_attempts in 1u32..4,
        interval in 0i64..900,
        steps in prop::collection::vec((0i32..4, 1i64..600), 1..40),
    ) {
        let mut registry = Registry::new();
        registry.add_contact(Contact::new("ops")).unwrap();
        registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
        registry
            .add_service(Service::new("web01", "http").with_checkable(|c| {
                c.with_max_attempts(max_attempts)
                    .with_notification_interval(interval)
                    .with_contact("ops")
            }))
            .unwrap();
        let config = EngineConfig::builder().max_jitter(0).enable_flap_detection(false).build();
        let mut ctx = EngineContext::new(config, registry).unwrap();
        let id = CheckableId::service("web01", "http");

        let mut now = 1_000;
        for (code, gap) in steps {
            now += gap;
            let before = ctx.registry().checkable(&id).unwrap().next_notification_id;
            let outcome = ctx.handle_result(CheckResult::passive(id.clone(), code, "out"), now);
            let checkable = ctx.registry().checkable(&id).unwrap();

            let commits: BTreeSet<u64> =
                outcome.dispatches().iter().map(|d| d.notification_id).collect();
            prop_assert_eq!(checkable.next_notification_id - before, commits.len() as u64);
            for dispatch in outcome.dispatches() {
                if matches!(dispatch.kind, NotificationKind::Problem | NotificationKind::Recovery) {
                    prop_assert_eq!(dispatch.notification_number, checkable.current_notification_number);
                }
            }
        }
    }
}
