//! Built-in command handlers

use std::str::FromStr;

use super::{CommandContext, CommandEffect, CommandError, CommandProcessor};
use crate::contracts::CheckResult;
use crate::engine::NotificationTrigger;
use crate::model::{Acknowledgement, Checkable, CheckableId, Downtime, Timestamp};

type Outcome = Result<Vec<CommandEffect>, CommandError>;

/// Which checkables a toggle command addresses
#[derive(Debug, Clone, Copy)]
enum Targets {
    Host,
    Service,
    HostServices,
    HostgroupHosts,
    HostgroupServices,
    ServicegroupHosts,
    ServicegroupServices,
}

type Setter = fn(&mut Checkable, bool);

fn set_active_checks(checkable: &mut Checkable, enabled: bool) {
    checkable.checks_enabled = enabled;
}

fn set_passive_checks(checkable: &mut Checkable, enabled: bool) {
    checkable.accept_passive_checks = enabled;
}

fn set_notifications(checkable: &mut Checkable, enabled: bool) {
    checkable.notifications_enabled = enabled;
}

fn set_flap_detection(checkable: &mut Checkable, enabled: bool) {
    checkable.flap_detection_enabled = enabled;
    if !enabled {
        checkable.is_flapping = false;
        checkable.flap_history.clear();
    }
}

pub(super) fn register_all(p: &mut CommandProcessor) {
    use Targets::*;

    let toggles: [(&'static str, &'static str, Targets, Setter); 24] = [
        ("ENABLE_HOST_CHECK", "DISABLE_HOST_CHECK", Host, set_active_checks),
        ("ENABLE_PASSIVE_HOST_CHECKS", "DISABLE_PASSIVE_HOST_CHECKS", Host, set_passive_checks),
        ("ENABLE_SVC_CHECK", "DISABLE_SVC_CHECK", Service, set_active_checks),
        ("ENABLE_PASSIVE_SVC_CHECKS", "DISABLE_PASSIVE_SVC_CHECKS", Service, set_passive_checks),
        ("ENABLE_HOST_SVC_CHECKS", "DISABLE_HOST_SVC_CHECKS", HostServices, set_active_checks),
        ("ENABLE_HOSTGROUP_HOST_CHECKS", "DISABLE_HOSTGROUP_HOST_CHECKS", HostgroupHosts, set_active_checks),
        ("ENABLE_HOSTGROUP_SVC_CHECKS", "DISABLE_HOSTGROUP_SVC_CHECKS", HostgroupServices, set_active_checks),
        (
            "ENABLE_HOSTGROUP_PASSIVE_HOST_CHECKS",
            "DISABLE_HOSTGROUP_PASSIVE_HOST_CHECKS",
            HostgroupHosts,
            set_passive_checks,
        ),
        (
            "ENABLE_HOSTGROUP_PASSIVE_SVC_CHECKS",
            "DISABLE_HOSTGROUP_PASSIVE_SVC_CHECKS",
            HostgroupServices,
            set_passive_checks,
        ),
        ("ENABLE_SERVICEGROUP_HOST_CHECKS", "DISABLE_SERVICEGROUP_HOST_CHECKS", ServicegroupHosts, set_active_checks),
        ("ENABLE_SERVICEGROUP_SVC_CHECKS", "DISABLE_SERVICEGROUP_SVC_CHECKS", ServicegroupServices, set_active_checks),
        (
            "ENABLE_SERVICEGROUP_PASSIVE_HOST_CHECKS",
            "DISABLE_SERVICEGROUP_PASSIVE_HOST_CHECKS",
            ServicegroupHosts,
            set_passive_checks,
        ),
        (
            "ENABLE_SERVICEGROUP_PASSIVE_SVC_CHECKS",
            "DISABLE_SERVICEGROUP_PASSIVE_SVC_CHECKS",
            ServicegroupServices,
            set_passive_checks,
        ),
        ("ENABLE_HOST_NOTIFICATIONS", "DISABLE_HOST_NOTIFICATIONS", Host, set_notifications),
        ("ENABLE_SVC_NOTIFICATIONS", "DISABLE_SVC_NOTIFICATIONS", Service, set_notifications),
        ("ENABLE_HOST_SVC_NOTIFICATIONS", "DISABLE_HOST_SVC_NOTIFICATIONS", HostServices, set_notifications),
        (
            "ENABLE_HOSTGROUP_HOST_NOTIFICATIONS",
            "DISABLE_HOSTGROUP_HOST_NOTIFICATIONS",
            HostgroupHosts,
            set_notifications,
        ),
        (
            "ENABLE_HOSTGROUP_SVC_NOTIFICATIONS",
            "DISABLE_HOSTGROUP_SVC_NOTIFICATIONS",
            HostgroupServices,
            set_notifications,
        ),
        (
            "ENABLE_SERVICEGROUP_HOST_NOTIFICATIONS",
            "DISABLE_SERVICEGROUP_HOST_NOTIFICATIONS",
            ServicegroupHosts,
            set_notifications,
        ),
        (
            "ENABLE_SERVICEGROUP_SVC_NOTIFICATIONS",
            "DISABLE_SERVICEGROUP_SVC_NOTIFICATIONS",
            ServicegroupServices,
            set_notifications,
        ),
        ("ENABLE_HOST_FLAP_DETECTION", "DISABLE_HOST_FLAP_DETECTION", Host, set_flap_detection),
        ("ENABLE_SVC_FLAP_DETECTION", "DISABLE_SVC_FLAP_DETECTION", Service, set_flap_detection),
        (
            "ENABLE_HOSTGROUP_FLAP_DETECTION",
            "DISABLE_HOSTGROUP_FLAP_DETECTION",
            HostgroupHosts,
            set_flap_detection,
        ),
        (
            "ENABLE_SERVICEGROUP_FLAP_DETECTION",
            "DISABLE_SERVICEGROUP_FLAP_DETECTION",
            ServicegroupServices,
            set_flap_detection,
        ),
    ];
    for (enable, disable, targets, setter) in toggles {
        let arity = match targets {
            Service => 2,
            _ => 1,
        };
        p.register(enable, arity, false, move |ctx, _, args| {
            toggle(ctx, targets, args, setter, true)
        });
        p.register(disable, arity, false, move |ctx, _, args| {
            toggle(ctx, targets, args, setter, false)
        });
    }

    p.register("ENABLE_NOTIFICATIONS", 0, false, |ctx, _, _| {
        ctx.notifier.set_enabled(true);
        Ok(Vec::new())
    });
    p.register("DISABLE_NOTIFICATIONS", 0, false, |ctx, _, _| {
        ctx.notifier.set_enabled(false);
        Ok(Vec::new())
    });
    p.register("ENABLE_FLAP_DETECTION", 0, false, |ctx, _, _| {
        ctx.process.flap_detection_enabled = true;
        Ok(Vec::new())
    });
    p.register("DISABLE_FLAP_DETECTION", 0, false, |ctx, _, _| {
        ctx.process.flap_detection_enabled = false;
        Ok(Vec::new())
    });

    p.register("ACKNOWLEDGE_HOST_PROBLEM", 6, true, |ctx, verb, args| {
        let id = host_id(ctx, args[0])?;
        acknowledge(ctx, verb, id, &args[1..])
    });
    p.register("ACKNOWLEDGE_SVC_PROBLEM", 7, true, |ctx, verb, args| {
        let id = service_id(ctx, args[0], args[1])?;
        acknowledge(ctx, verb, id, &args[2..])
    });
    p.register("REMOVE_HOST_ACKNOWLEDGEMENT", 1, false, |ctx, _, args| {
        let id = host_id(ctx, args[0])?;
        remove_acknowledgement(ctx, &id)
    });
    p.register("REMOVE_SVC_ACKNOWLEDGEMENT", 2, false, |ctx, _, args| {
        let id = service_id(ctx, args[0], args[1])?;
        remove_acknowledgement(ctx, &id)
    });

    p.register("PROCESS_HOST_CHECK_RESULT", 3, true, |ctx, verb, args| {
        let id = host_id(ctx, args[0])?;
        passive_result(verb, id, args[1], args[2])
    });
    p.register("PROCESS_SERVICE_CHECK_RESULT", 4, true, |ctx, verb, args| {
        let id = service_id(ctx, args[0], args[1])?;
        passive_result(verb, id, args[2], args[3])
    });

    p.register("SCHEDULE_HOST_CHECK", 2, false, |ctx, verb, args| {
        let id = host_id(ctx, args[0])?;
        schedule_check(ctx, verb, id, args[1], false)
    });
    p.register("SCHEDULE_FORCED_HOST_CHECK", 2, false, |ctx, verb, args| {
        let id = host_id(ctx, args[0])?;
        schedule_check(ctx, verb, id, args[1], true)
    });
    p.register("SCHEDULE_SVC_CHECK", 3, false, |ctx, verb, args| {
        let id = service_id(ctx, args[0], args[1])?;
        schedule_check(ctx, verb, id, args[2], false)
    });
    p.register("SCHEDULE_FORCED_SVC_CHECK", 3, false, |ctx, verb, args| {
        let id = service_id(ctx, args[0], args[1])?;
        schedule_check(ctx, verb, id, args[2], true)
    });

    p.register("SEND_CUSTOM_HOST_NOTIFICATION", 4, true, |ctx, verb, args| {
        let id = host_id(ctx, args[0])?;
        custom_notification(verb, id, &args[1..])
    });
    p.register("SEND_CUSTOM_SVC_NOTIFICATION", 5, true, |ctx, verb, args| {
        let id = service_id(ctx, args[0], args[1])?;
        custom_notification(verb, id, &args[2..])
    });

    p.register("SCHEDULE_HOST_DOWNTIME", 8, true, |ctx, verb, args| {
        let id = host_id(ctx, args[0])?;
        schedule_downtime(ctx, verb, id, &args[1..])
    });
    p.register("SCHEDULE_SVC_DOWNTIME", 9, true, |ctx, verb, args| {
        let id = service_id(ctx, args[0], args[1])?;
        schedule_downtime(ctx, verb, id, &args[2..])
    });
    p.register("DEL_HOST_DOWNTIME", 1, false, |ctx, verb, args| {
        delete_downtime(ctx, verb, args[0], false)
    });
    p.register("DEL_SVC_DOWNTIME", 1, false, |ctx, verb, args| {
        delete_downtime(ctx, verb, args[0], true)
    });

    p.register("CHANGE_MAX_HOST_CHECK_ATTEMPTS", 2, false, |ctx, verb, args| {
        let id = host_id(ctx, args[0])?;
        change_max_attempts(ctx, verb, id, args[1])
    });
    p.register("CHANGE_MAX_SVC_CHECK_ATTEMPTS", 3, false, |ctx, verb, args| {
        let id = service_id(ctx, args[0], args[1])?;
        change_max_attempts(ctx, verb, id, args[2])
    });
}

fn parse<T: FromStr>(verb: &str, field: &'static str, value: &str) -> Result<T, CommandError> {
    value
        .trim()
        .parse()
        .map_err(|_| CommandError::bad_value(verb, field, value))
}

fn host_id(ctx: &CommandContext<'_>, name: &str) -> Result<CheckableId, CommandError> {
    ctx.registry
        .host(name)
        .map(|host| host.checkable.id.clone())
        .ok_or_else(|| CommandError::unknown_target("host", name))
}

fn service_id(
    ctx: &CommandContext<'_>,
    host: &str,
    description: &str,
) -> Result<CheckableId, CommandError> {
    ctx.registry
        .service(host, description)
        .map(|service| service.checkable.id.clone())
        .ok_or_else(|| CommandError::unknown_target("service", format!("{};{}", host, description)))
}

/// Resolve every target before mutating anything
fn resolve(
    ctx: &CommandContext<'_>,
    targets: Targets,
    args: &[&str],
) -> Result<Vec<CheckableId>, CommandError> {
    let registry = &*ctx.registry;
    let services_of = |host: &str| -> Vec<CheckableId> {
        registry
            .services_of_host(host)
            .map(|service| service.checkable.id.clone())
            .collect()
    };

    let ids = match targets {
        Targets::Host => vec![host_id(ctx, args[0])?],
        Targets::Service => vec![service_id(ctx, args[0], args[1])?],
        Targets::HostServices => {
            host_id(ctx, args[0])?;
            services_of(args[0])
        }
        Targets::HostgroupHosts | Targets::HostgroupServices => {
            let group = registry
                .hostgroup(args[0])
                .ok_or_else(|| CommandError::unknown_target("hostgroup", args[0]))?;
            let hosts = group
                .members
                .iter()
                .filter(|member| registry.host(member).is_some());
            match targets {
                Targets::HostgroupHosts => hosts.map(|h| CheckableId::host(h.as_str())).collect(),
                _ => hosts.flat_map(|h| services_of(h.as_str())).collect(),
            }
        }
        Targets::ServicegroupHosts | Targets::ServicegroupServices => {
            let group = registry
                .servicegroup(args[0])
                .ok_or_else(|| CommandError::unknown_target("servicegroup", args[0]))?;
            let services = group
                .members
                .iter()
                .filter(|key| registry.service(&key.host, &key.description).is_some());
            match targets {
                Targets::ServicegroupServices => services
                    .map(|key| CheckableId::Service(key.clone()))
                    .collect(),
                _ => {
                    let mut hosts: Vec<CheckableId> = Vec::new();
                    for key in services {
                        let id = CheckableId::host(key.host.as_str());
                        if !hosts.contains(&id) {
                            hosts.push(id);
                        }
                    }
                    hosts
                }
            }
        }
    };
    Ok(ids)
}

fn toggle(
    ctx: &mut CommandContext<'_>,
    targets: Targets,
    args: &[&str],
    setter: Setter,
    enabled: bool,
) -> Outcome {
    let ids = resolve(ctx, targets, args)?;
    for id in &ids {
        if let Some(checkable) = ctx.registry.checkable_mut(id) {
            setter(checkable, enabled);
        }
    }
    tracing::debug!(targets = ids.len(), enabled, "Toggle applied");
    Ok(Vec::new())
}

fn acknowledge(
    ctx: &mut CommandContext<'_>,
    verb: &str,
    id: CheckableId,
    args: &[&str],
) -> Outcome {
    let sticky: u8 = parse(verb, "sticky", args[0])?;
    let notify: u8 = parse(verb, "notify", args[1])?;
    let _persistent: u8 = parse(verb, "persistent", args[2])?;
    let author = args[3].to_string();
    let comment = args[4].to_string();

    let now = ctx.now;
    let Some(checkable) = ctx.registry.checkable_mut(&id) else {
        return Err(CommandError::unknown_target("checkable", id.to_string()));
    };
    if checkable.current_state.is_ok() {
        tracing::debug!(checkable = %id, "Acknowledgement ignored: no problem");
        return Ok(Vec::new());
    }
    checkable.acknowledgement = Some(Acknowledgement {
        author: author.clone(),
        comment: comment.clone(),
        sticky: sticky == 2,
        entry_time: now,
    });

    let mut effects = Vec::new();
    if notify > 0 {
        effects.push(CommandEffect::Notify {
            id,
            trigger: NotificationTrigger::Acknowledgement { author, comment },
        });
    }
    Ok(effects)
}

fn remove_acknowledgement(ctx: &mut CommandContext<'_>, id: &CheckableId) -> Outcome {
    if let Some(checkable) = ctx.registry.checkable_mut(id) {
        checkable.acknowledgement = None;
    }
    Ok(Vec::new())
}

fn passive_result(verb: &str, id: CheckableId, code: &str, output: &str) -> Outcome {
    let return_code: i32 = parse(verb, "return_code", code)?;
    Ok(vec![CommandEffect::SubmitResult(CheckResult::passive(
        id,
        return_code,
        output,
    ))])
}

fn schedule_check(
    ctx: &mut CommandContext<'_>,
    verb: &str,
    id: CheckableId,
    at: &str,
    forced: bool,
) -> Outcome {
    let at: Timestamp = parse(verb, "check_time", at)?;
    if !forced {
        if let Some(due) = ctx.scheduler.next_due(&id) {
            if due <= at {
                tracing::debug!(checkable = %id, due, at, "Earlier check already scheduled");
                return Ok(Vec::new());
            }
        }
    }
    ctx.scheduler.reschedule(ctx.registry, &id, at, forced);
    Ok(Vec::new())
}

fn custom_notification(verb: &str, id: CheckableId, args: &[&str]) -> Outcome {
    let options: u32 = parse(verb, "options", args[0])?;
    Ok(vec![CommandEffect::Notify {
        id,
        trigger: NotificationTrigger::Custom {
            author: args[1].to_string(),
            comment: args[2].to_string(),
            forced: options & 2 != 0,
            increment: options & 4 != 0,
        },
    }])
}

fn schedule_downtime(
    ctx: &mut CommandContext<'_>,
    verb: &str,
    id: CheckableId,
    args: &[&str],
) -> Outcome {
    let start: Timestamp = parse(verb, "start_time", args[0])?;
    let end: Timestamp = parse(verb, "end_time", args[1])?;
    let fixed: u8 = parse(verb, "fixed", args[2])?;
    let _trigger_id: u64 = parse(verb, "trigger_id", args[3])?;
    let _duration: u64 = parse(verb, "duration", args[4])?;
    if fixed != 1 {
        return Err(CommandError::bad_value(verb, "fixed", args[2]));
    }
    if end <= start {
        return Err(CommandError::bad_value(verb, "end_time", args[1]));
    }

    let downtime_id = ctx.process.allocate_downtime_id();
    let now = ctx.now;
    let Some(checkable) = ctx.registry.checkable_mut(&id) else {
        return Err(CommandError::unknown_target("checkable", id.to_string()));
    };
    checkable.downtimes.push(Downtime {
        id: downtime_id,
        start,
        end,
        author: args[5].to_string(),
        comment: args[6].to_string(),
    });
    tracing::info!(checkable = %id, downtime_id, start, end, "Downtime scheduled");

    Ok(checkable
        .refresh_downtime(now)
        .map(|active| CommandEffect::Downtime { id, active })
        .into_iter()
        .collect())
}

fn delete_downtime(ctx: &mut CommandContext<'_>, verb: &str, arg: &str, services: bool) -> Outcome {
    let downtime_id: u64 = parse(verb, "downtime_id", arg)?;
    let now = ctx.now;
    for id in ctx.registry.checkable_ids() {
        if matches!(id, CheckableId::Service(_)) != services {
            continue;
        }
        let Some(checkable) = ctx.registry.checkable_mut(&id) else {
            continue;
        };
        let before = checkable.downtimes.len();
        checkable.downtimes.retain(|downtime| downtime.id != downtime_id);
        if checkable.downtimes.len() != before {
            return Ok(checkable
                .refresh_downtime(now)
                .map(|active| CommandEffect::Downtime { id, active })
                .into_iter()
                .collect());
        }
    }
    Err(CommandError::unknown_target("downtime", arg))
}

fn change_max_attempts(
    ctx: &mut CommandContext<'_>,
    verb: &str,
    id: CheckableId,
    value: &str,
) -> Outcome {
    let attempts: u32 = parse(verb, "max_check_attempts", value)?;
    if attempts == 0 {
        return Err(CommandError::bad_value(verb, "max_check_attempts", value));
    }
    if let Some(checkable) = ctx.registry.checkable_mut(&id) {
        checkable.max_attempts = attempts;
        // A soft state stays below the limit; the next problem result hardens it
        checkable.current_attempt = if checkable.is_hard() {
            checkable.current_attempt.min(attempts)
        } else {
            checkable.current_attempt.min(attempts - 1)
        };
    }
    Ok(Vec::new())
}
