//! Macro rendering for check commands and notification payloads
//!
//! `$NAME$` and `$NAME:argument$` are replaced from the registry and the
//! notification being delivered. Unknown macros and macros missing a
//! required argument render as an empty string; `$$` renders a literal `$`.

use crate::contracts::NotificationDispatch;
use crate::model::{
    Checkable, CheckableId, CheckableState, Contact, Host, HostState, ServiceState, Timestamp,
};
use crate::registry::Registry;

/// Values available to a template
#[derive(Debug, Clone, Copy)]
pub struct MacroContext<'a> {
    pub registry: &'a Registry,
    pub checkable: Option<&'a CheckableId>,
    pub contact: Option<&'a Contact>,
    pub notification: Option<&'a NotificationDispatch>,
    pub now: Timestamp,
}

impl<'a> MacroContext<'a> {
    pub fn new(registry: &'a Registry, now: Timestamp) -> Self {
        Self {
            registry,
            checkable: None,
            contact: None,
            notification: None,
            now,
        }
    }

    pub fn with_checkable(mut self, id: &'a CheckableId) -> Self {
        self.checkable = Some(id);
        self
    }

    pub fn with_contact(mut self, contact: &'a Contact) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_notification(mut self, notification: &'a NotificationDispatch) -> Self {
        self.notification = Some(notification);
        self
    }

    fn host(&self, argument: Option<&str>) -> Option<&'a Host> {
        let name = match argument {
            Some(name) => name,
            None => self.checkable?.host_name(),
        };
        self.registry.host(name)
    }

    fn service(&self) -> Option<&'a Checkable> {
        let id = self.checkable?;
        match id {
            CheckableId::Service(_) => self.registry.checkable(id),
            CheckableId::Host(_) => None,
        }
    }

    fn checkable(&self) -> Option<&'a Checkable> {
        self.registry.checkable(self.checkable?)
    }
}

/// Expands templates
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &MacroContext<'_>) -> String;
}

/// Standard `$MACRO$` expansion
#[derive(Debug, Clone, Copy, Default)]
pub struct MacroRenderer;

impl TemplateRenderer for MacroRenderer {
    fn render(&self, template: &str, context: &MacroContext<'_>) -> String {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find('$') {
            output.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('$') {
                Some(0) => {
                    output.push('$');
                    rest = &after[1..];
                }
                Some(end) => {
                    output.push_str(&expand(&after[..end], context));
                    rest = &after[end + 1..];
                }
                None => {
                    output.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        output.push_str(rest);
        output
    }
}

fn expand(token: &str, ctx: &MacroContext<'_>) -> String {
    let (name, argument) = match token.split_once(':') {
        Some((name, argument)) => (name, Some(argument)),
        None => (token, None),
    };

    let value = match name {
        "HOSTNAME" => ctx.host(argument).map(|h| h.name.clone()),
        "HOSTALIAS" => ctx.host(argument).map(|h| h.alias.clone()),
        "HOSTADDRESS" => ctx.host(argument).map(|h| h.address.clone()),
        "HOSTSTATE" => ctx.host(argument).map(|h| h.checkable.current_state.to_string()),
        "HOSTSTATETYPE" => ctx.host(argument).map(|h| h.checkable.state_type.to_string()),
        "HOSTATTEMPT" => ctx.host(argument).map(|h| h.checkable.current_attempt.to_string()),
        "HOSTOUTPUT" => ctx.host(argument).map(|h| h.checkable.plugin_output.clone()),
        "SERVICEDESC" => match ctx.checkable {
            Some(CheckableId::Service(key)) => Some(key.description.clone()),
            _ => None,
        },
        "SERVICESTATE" => ctx.service().map(|s| s.current_state.to_string()),
        "SERVICESTATETYPE" => ctx.service().map(|s| s.state_type.to_string()),
        "SERVICEATTEMPT" => ctx.service().map(|s| s.current_attempt.to_string()),
        "SERVICEOUTPUT" => ctx.service().map(|s| s.plugin_output.clone()),
        "OUTPUT" => ctx
            .notification
            .map(|n| n.output.clone())
            .or_else(|| ctx.checkable().map(|c| c.plugin_output.clone())),
        "NOTIFICATIONTYPE" => ctx.notification.map(|n| n.kind.to_string()),
        "NOTIFICATIONNUMBER" => ctx.notification.map(|n| n.notification_number.to_string()),
        "NOTIFICATIONAUTHOR" => ctx.notification.and_then(|n| n.author.clone()),
        "NOTIFICATIONCOMMENT" => ctx.notification.and_then(|n| n.comment.clone()),
        "CONTACTNAME" => ctx.contact.map(|c| c.name.clone()),
        "CONTACTALIAS" => ctx.contact.map(|c| c.alias.clone()),
        "CONTACTEMAIL" => ctx.contact.and_then(|c| c.email.clone()),
        "TIMET" => Some(ctx.now.to_string()),
        "TOTALHOSTSUP" => Some(count_hosts(ctx.registry, HostState::Up).to_string()),
        "TOTALHOSTSDOWN" => Some(count_hosts(ctx.registry, HostState::Down).to_string()),
        "TOTALHOSTSUNREACHABLE" => {
            Some(count_hosts(ctx.registry, HostState::Unreachable).to_string())
        }
        "TOTALSERVICESOK" => Some(count_services(ctx.registry, None, ServiceState::Ok)),
        "TOTALSERVICESWARNING" => Some(count_services(ctx.registry, None, ServiceState::Warning)),
        "TOTALSERVICESCRITICAL" => {
            Some(count_services(ctx.registry, None, ServiceState::Critical))
        }
        "TOTALSERVICESUNKNOWN" => Some(count_services(ctx.registry, None, ServiceState::Unknown)),
        "TOTALHOSTSERVICESOK" => argument.map(|h| count_services(ctx.registry, Some(h), ServiceState::Ok)),
        "TOTALHOSTSERVICESWARNING" => {
            argument.map(|h| count_services(ctx.registry, Some(h), ServiceState::Warning))
        }
        "TOTALHOSTSERVICESCRITICAL" => {
            argument.map(|h| count_services(ctx.registry, Some(h), ServiceState::Critical))
        }
        "TOTALHOSTSERVICESUNKNOWN" => {
            argument.map(|h| count_services(ctx.registry, Some(h), ServiceState::Unknown))
        }
        _ => {
            tracing::debug!(token, "Unknown macro");
            None
        }
    };
    value.unwrap_or_default()
}

fn count_hosts(registry: &Registry, state: HostState) -> usize {
    registry
        .hosts()
        .filter(|h| h.checkable.has_been_checked)
        .filter(|h| h.checkable.current_state == CheckableState::Host(state))
        .count()
}

fn count_services(registry: &Registry, host: Option<&str>, state: ServiceState) -> String {
    registry
        .services()
        .filter(|s| host.map_or(true, |host| s.host_name == host))
        .filter(|s| s.checkable.has_been_checked)
        .filter(|s| s.checkable.current_state == CheckableState::Service(state))
        .count()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::NotificationKind;
    use crate::model::Service;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .add_host(Host::new("test_host", "127.0.0.1"))
            .unwrap();
        registry
            .add_service(Service::new("test_host", "http"))
            .unwrap();
        registry
    }

    fn render(template: &str, ctx: &MacroContext<'_>) -> String {
        MacroRenderer.render(template, ctx)
    }

    #[test]
    fn test_totals() {
        let mut registry = registry();
        let ctx = MacroContext::new(&registry, 0);
        assert_eq!(render("$TOTALSERVICESOK$", &ctx), "0");
        assert_eq!(render("$TOTALHOSTSUP$", &ctx), "0");

        registry.host_mut("test_host").unwrap().checkable.has_been_checked = true;
        let ctx = MacroContext::new(&registry, 0);
        assert_eq!(render("$TOTALHOSTSUP$", &ctx), "1");
        assert_eq!(render("$TOTALHOSTSERVICESCRITICAL:test_host$", &ctx), "0");
    }

    #[test]
    fn test_missing_argument_renders_empty() {
        let registry = registry();
        let ctx = MacroContext::new(&registry, 0);
        assert_eq!(render("$TOTALHOSTSERVICESCRITICAL$", &ctx), "");
        assert_eq!(render("[$NOSUCHMACRO$]", &ctx), "[]");
    }

    #[test]
    fn test_timet() {
        let registry = registry();
        let ctx = MacroContext::new(&registry, 500_000_000);
        assert_eq!(render("$TIMET:test_host$", &ctx), "500000000");
        assert_eq!(render("$TIMET$", &ctx), "500000000");
    }

    #[test]
    fn test_check_command_macros() {
        let registry = registry();
        let id = CheckableId::service("test_host", "http");
        let ctx = MacroContext::new(&registry, 0).with_checkable(&id);
        assert_eq!(
            render("check_http -H $HOSTADDRESS$ -u /$SERVICEDESC$ $$5", &ctx),
            "check_http -H 127.0.0.1 -u /http $5"
        );
        assert_eq!(render("$HOSTSTATE$/$SERVICESTATE$", &ctx), "UP/OK");
        assert_eq!(render("unterminated $HOSTNAME", &ctx), "unterminated $HOSTNAME");
    }

    #[test]
    fn test_notification_macros() {
        let registry = registry();
        let id = CheckableId::host("test_host");
        let contact = Contact::new("alice").with_email("alice@example.com");
        let dispatch = NotificationDispatch {
            id: id.clone(),
            kind: NotificationKind::Problem,
            contact: "alice".to_string(),
            timestamp: 10,
            notification_number: 2,
            notification_id: 7,
            state: CheckableState::Host(HostState::Down),
            output: "CRITICAL - no route".to_string(),
            author: None,
            comment: None,
        };
        let ctx = MacroContext::new(&registry, 10)
            .with_checkable(&id)
            .with_contact(&contact)
            .with_notification(&dispatch);
        assert_eq!(
            render(
                "$NOTIFICATIONTYPE$ #$NOTIFICATIONNUMBER$ $HOSTNAME$ to $CONTACTNAME$ <$CONTACTEMAIL$>: $OUTPUT$",
                &ctx
            ),
            "PROBLEM #2 test_host to alice <alice@example.com>: CRITICAL - no route"
        );
        assert_eq!(render("$SERVICEDESC$$NOTIFICATIONAUTHOR$", &ctx), "");
    }
}
