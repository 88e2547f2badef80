//! Message entities.
//!
//! A [`Message`] is a mutable, reusable description of one bus message plus
//! the stream of events produced for it. Every operation returns right
//! away; outcomes, failures included, arrive as [`MessageEvent`]s.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use ndbus_core::constants::TIMEOUT_USE_DEFAULT;
use ndbus_core::{Bus, MessageType, Value, VariantPolicy};
use ndbus_protocol::{validate_bus_name, validate_interface, validate_member, validate_object_path};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{BusError, BusResult};
use crate::registry::{ListenerId, MatchRule};
use crate::router::Op;
use crate::transport::SignalHeader;

/// Configuration a [`Message`] is created from.
///
/// Templates are plain values: clone one and adjust it to describe a
/// related message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub bus: Bus,
    pub message_type: MessageType,
    pub destination: Option<String>,
    pub path: Option<String>,
    pub iface: Option<String>,
    pub member: Option<String>,
    /// Only used to restrict match rules to one sender.
    pub sender: Option<String>,
    /// Reply timeout in milliseconds, `-1` for the client default.
    pub timeout: i32,
    pub variant_policy: VariantPolicy,
    /// Overrides the configured address of `bus` when it first connects.
    pub address: Option<String>,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            bus: Bus::default(),
            message_type: MessageType::Invalid,
            destination: None,
            path: None,
            iface: None,
            member: None,
            sender: None,
            timeout: TIMEOUT_USE_DEFAULT,
            variant_policy: VariantPolicy::Default,
            address: None,
        }
    }
}

impl MessageTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A method call to `member` on `destination` at `path`.
    pub fn method_call(
        destination: impl Into<String>,
        path: impl Into<String>,
        iface: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self::new()
            .with_type(MessageType::MethodCall)
            .with_destination(destination)
            .with_path(path)
            .with_iface(iface)
            .with_member(member)
    }

    /// A signal `iface.member` emitted from `path`.
    pub fn signal(
        path: impl Into<String>,
        iface: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self::new()
            .with_type(MessageType::Signal)
            .with_path(path)
            .with_iface(iface)
            .with_member(member)
    }

    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_iface(mut self, iface: impl Into<String>) -> Self {
        self.iface = Some(iface.into());
        self
    }

    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_timeout(mut self, timeout_ms: i32) -> Self {
        self.timeout = timeout_ms;
        self
    }

    pub fn with_variant_policy(mut self, policy: VariantPolicy) -> Self {
        self.variant_policy = policy;
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Checks that the fields `send` needs are present and well formed.
    pub fn check_addressing(&self) -> BusResult<()> {
        match self.message_type {
            MessageType::Invalid => return Err(BusError::InvalidType),
            MessageType::Signal => {}
            MessageType::MethodCall | MessageType::MethodReturn | MessageType::Error => {
                if self.destination.is_none() {
                    return Err(BusError::missing_field("destination", self.message_type));
                }
            }
        }
        for (field, value) in [
            ("path", &self.path),
            ("interface", &self.iface),
            ("member", &self.member),
        ] {
            if value.is_none() {
                return Err(BusError::missing_field(field, self.message_type));
            }
        }
        self.check_names()
    }

    /// The match rule `add_match` and `remove_match` operate on.
    pub fn match_rule(&self) -> BusResult<MatchRule> {
        if self.message_type != MessageType::Signal {
            return Err(BusError::NotASignal {
                message_type: self.message_type.to_string(),
            });
        }
        let iface = self
            .iface
            .clone()
            .ok_or_else(|| BusError::missing_field("interface", self.message_type))?;
        let member = self
            .member
            .clone()
            .ok_or_else(|| BusError::missing_field("member", self.message_type))?;
        self.check_names()?;

        Ok(MatchRule {
            bus: self.bus,
            iface,
            member,
            path: self.path.clone(),
            sender: self.sender.clone(),
            destination: self.destination.clone(),
        })
    }

    fn check_names(&self) -> BusResult<()> {
        if let Some(path) = &self.path {
            validate_object_path(path)?;
        }
        if let Some(iface) = &self.iface {
            validate_interface(iface)?;
        }
        if let Some(member) = &self.member {
            validate_member(member)?;
        }
        for name in [&self.destination, &self.sender].into_iter().flatten() {
            validate_bus_name(name)?;
        }
        Ok(())
    }
}

/// Where a message is in its call cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    /// Nothing staged or cleared yet.
    Unconfigured,
    /// Arguments staged, or explicitly cleared to an empty payload.
    Staged,
    /// Handed to the core loop by `send`.
    Sent,
}

/// Header of a received signal, member first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalInfo {
    pub member: String,
    pub iface: String,
    pub path: String,
    pub sender: Option<String>,
    pub destination: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl SignalInfo {
    pub(crate) fn from_header(header: &SignalHeader) -> Self {
        Self {
            member: header.member.clone(),
            iface: header.iface.clone(),
            path: header.path.clone(),
            sender: header.sender.clone(),
            destination: header.destination.clone(),
            received_at: Utc::now(),
        }
    }
}

/// Something that happened to a message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageEvent {
    /// Reply to a method call, arguments in order.
    MethodResponse(Vec<Value>),
    /// A signal matching one of the message's rules.
    SignalReceipt { signal: SignalInfo, args: Vec<Value> },
    Error(BusError),
}

/// A snapshot of a message taken by `send`.
#[derive(Debug, Clone)]
pub(crate) struct Outgoing {
    pub template: MessageTemplate,
    pub signature: Option<String>,
    pub args: Vec<Value>,
}

/// A message entity bound to a client.
///
/// Dropping it unregisters its match rules and discards replies still
/// owed to it.
#[derive(Debug)]
pub struct Message {
    id: ListenerId,
    template: MessageTemplate,
    signature: Option<String>,
    args: Vec<Value>,
    state: MessageState,
    ops: mpsc::UnboundedSender<Op>,
    events: mpsc::UnboundedReceiver<MessageEvent>,
    /// Events that could not go through the core loop.
    local: VecDeque<MessageEvent>,
}

impl Message {
    pub(crate) fn attach(ops: mpsc::UnboundedSender<Op>, template: MessageTemplate) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let mut message = Self {
            id: ListenerId::next(),
            state: MessageState::Unconfigured,
            template,
            signature: None,
            args: Vec::new(),
            ops,
            events,
            local: VecDeque::new(),
        };
        message.post(Op::Attach {
            listener: message.id,
            events: events_tx,
        });
        message
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn template(&self) -> &MessageTemplate {
        &self.template
    }

    /// Direct access to every field; changes apply to later operations.
    pub fn template_mut(&mut self) -> &mut MessageTemplate {
        &mut self.template
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn set_bus(&mut self, bus: Bus) {
        self.template.bus = bus;
    }

    pub fn set_message_type(&mut self, message_type: MessageType) {
        self.template.message_type = message_type;
    }

    pub fn set_destination(&mut self, destination: impl Into<String>) {
        self.template.destination = Some(destination.into());
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.template.path = Some(path.into());
    }

    pub fn set_iface(&mut self, iface: impl Into<String>) {
        self.template.iface = Some(iface.into());
    }

    pub fn set_member(&mut self, member: impl Into<String>) {
        self.template.member = Some(member.into());
    }

    pub fn set_sender(&mut self, sender: impl Into<String>) {
        self.template.sender = Some(sender.into());
    }

    pub fn set_timeout(&mut self, timeout_ms: i32) {
        self.template.timeout = timeout_ms;
    }

    pub fn set_variant_policy(&mut self, policy: VariantPolicy) {
        self.template.variant_policy = policy;
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.template.address = Some(address.into());
    }

    /// Stages `values` under `signature`, replacing anything staged before.
    ///
    /// Returns false and changes nothing when `values` is empty. The
    /// signature is only checked at `send`.
    pub fn append_args<I>(&mut self, signature: &str, values: I) -> bool
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return false;
        }
        self.signature = Some(signature.to_string());
        self.args = values;
        self.state = MessageState::Staged;
        true
    }

    /// Drops the staged payload.
    pub fn clear_args(&mut self) {
        self.signature = None;
        self.args.clear();
        self.state = MessageState::Staged;
    }

    /// Sends the message: a broadcast for signals, a call awaiting a
    /// `MethodResponse` or `Error` event for every other type.
    pub fn send(&mut self) {
        if self.template.message_type != MessageType::Invalid {
            self.state = MessageState::Sent;
        }
        self.post(Op::Send {
            listener: self.id,
            outgoing: Outgoing {
                template: self.template.clone(),
                signature: self.signature.clone(),
                args: self.args.clone(),
            },
        });
    }

    /// Subscribes this message to signals matching its bus, interface,
    /// member and, when set, path, sender and destination.
    pub fn add_match(&mut self) {
        self.post(Op::AddMatch {
            listener: self.id,
            template: self.template.clone(),
        });
    }

    /// Removes the subscription [`add_match`](Self::add_match) made for
    /// the current field values.
    pub fn remove_match(&mut self) {
        self.post(Op::RemoveMatch {
            listener: self.id,
            template: self.template.clone(),
        });
    }

    /// Closes this message's bus once everything queued so far is handled.
    pub fn close_connection(&self) {
        if self.ops.send(Op::Close { bus: self.template.bus }).is_err() {
            tracing::debug!(bus = %self.template.bus, "Client gone, nothing to close");
        }
    }

    /// Waits for the next event. Returns `None` once the client is gone
    /// and every event has been read.
    pub async fn next_event(&mut self) -> Option<MessageEvent> {
        if let Some(event) = self.local.pop_front() {
            return Some(event);
        }
        self.events.recv().await
    }

    /// Returns the next event if one is ready.
    pub fn try_next_event(&mut self) -> Option<MessageEvent> {
        self.local
            .pop_front()
            .or_else(|| self.events.try_recv().ok())
    }

    fn post(&mut self, op: Op) {
        if self.ops.send(op).is_err() {
            self.local.push_back(MessageEvent::Error(BusError::Closed));
        }
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        // Fails only when the core loop is already gone.
        let _ = self.ops.send(Op::Detach { listener: self.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(template: MessageTemplate) -> (Message, mpsc::UnboundedReceiver<Op>) {
        let (ops, rx) = mpsc::unbounded_channel();
        (Message::attach(ops, template), rx)
    }

    #[test]
    fn template_defaults() {
        let template = MessageTemplate::default();
        assert_eq!(template.bus, Bus::System);
        assert_eq!(template.message_type, MessageType::Invalid);
        assert_eq!(template.timeout, -1);
        assert_eq!(template.variant_policy, VariantPolicy::Default);
    }

    #[test]
    fn append_and_clear_args() {
        let (mut message, _rx) = detached(MessageTemplate::signal("/a", "org.ndbus.T", "Sig"));
        assert!(message.append_args("si", [Value::from("x"), Value::from(3)]));
        assert_eq!(message.signature(), Some("si"));
        assert_eq!(message.args(), &[Value::from("x"), Value::Int(3)]);

        assert!(!message.append_args("s", Vec::<Value>::new()));
        assert_eq!(message.signature(), Some("si"));
        assert_eq!(message.args().len(), 2);

        assert!(message.append_args("s", ["replaced"]));
        assert_eq!(message.args(), &[Value::from("replaced")]);

        message.clear_args();
        assert_eq!(message.signature(), None);
        assert!(message.args().is_empty());
        message.clear_args();
        assert_eq!(message.signature(), None);
    }

    #[test]
    fn state_transitions() {
        let (mut message, _rx) = detached(MessageTemplate::new());
        assert_eq!(message.state(), MessageState::Unconfigured);

        message.send();
        assert_eq!(message.state(), MessageState::Unconfigured);

        message.set_message_type(MessageType::Signal);
        assert_eq!(message.state(), MessageState::Unconfigured);
        message.clear_args();
        assert_eq!(message.state(), MessageState::Staged);
        message.send();
        assert_eq!(message.state(), MessageState::Sent);
        message.append_args("b", [true]);
        assert_eq!(message.state(), MessageState::Staged);

        let (mut typed, _rx) = detached(MessageTemplate::signal("/a", "org.ndbus.T", "Sig"));
        assert_eq!(typed.state(), MessageState::Unconfigured);
        typed.append_args("s", ["x"]);
        assert_eq!(typed.state(), MessageState::Staged);
    }

    #[test]
    fn operations_are_queued_in_order() {
        let (mut message, mut rx) = detached(MessageTemplate::signal("/a", "org.ndbus.T", "Sig"));
        message.add_match();
        message.send();
        message.close_connection();
        let id = message.id();
        drop(message);

        let ops: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(ops[0], Op::Attach { listener, .. } if listener == id));
        assert!(matches!(ops[1], Op::AddMatch { .. }));
        assert!(matches!(ops[2], Op::Send { .. }));
        assert!(matches!(ops[3], Op::Close { bus: Bus::System }));
        assert!(matches!(ops[4], Op::Detach { listener } if listener == id));
        assert_eq!(ops.len(), 5);
    }

    #[test]
    fn closed_client_reports_locally() {
        let (ops, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut message = Message::attach(ops, MessageTemplate::new());
        message.send();
        assert_eq!(
            message.try_next_event(),
            Some(MessageEvent::Error(BusError::Closed))
        );
        assert_eq!(
            message.try_next_event(),
            Some(MessageEvent::Error(BusError::Closed))
        );
        assert_eq!(message.try_next_event(), None);
    }

    #[test]
    fn addressing_checks() {
        assert_eq!(
            MessageTemplate::new().check_addressing(),
            Err(BusError::InvalidType)
        );
        assert_eq!(
            MessageTemplate::new()
                .with_type(MessageType::MethodCall)
                .with_path("/")
                .with_member("Ping")
                .check_addressing(),
            Err(BusError::missing_field("destination", MessageType::MethodCall))
        );
        let mut no_iface = MessageTemplate::method_call("org.ndbus.Svc", "/", "org.ndbus.Svc", "Ping");
        no_iface.iface = None;
        assert_eq!(
            no_iface.check_addressing(),
            Err(BusError::missing_field("interface", MessageType::MethodCall))
        );
        assert_eq!(
            MessageTemplate::signal("/a", "org.ndbus.T", "Sig")
                .with_iface("bad")
                .check_addressing()
                .map_err(|e| e.to_string()),
            Err("invalid interface name: \"bad\"".to_string())
        );
        assert!(
            MessageTemplate::method_call("org.ndbus.Svc", "/", "org.ndbus.Svc", "Ping")
                .check_addressing()
                .is_ok()
        );
    }

    #[test]
    fn match_rule_from_template() {
        let rule = MessageTemplate::signal("/org/ndbus", "org.ndbus.T", "Sig")
            .with_bus(Bus::Session)
            .with_sender(":1.3")
            .match_rule()
            .unwrap();
        insta::assert_snapshot!(
            rule.to_string(),
            @"type='signal',interface='org.ndbus.T',member='Sig',path='/org/ndbus',sender=':1.3'"
        );

        let not_signal = MessageTemplate::method_call("org.ndbus.Svc", "/", "org.ndbus.Svc", "Ping");
        assert_eq!(
            not_signal.match_rule(),
            Err(BusError::NotASignal {
                message_type: "method_call".into()
            })
        );
    }
}
