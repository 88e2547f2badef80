//! The core loop.
//!
//! One task owns every connection, the subscription registry and the table
//! of pending method calls. Messages and transports only talk to it by
//! queueing [`Op`]s, which are handled strictly in order, so none of that
//! state needs a lock.

use std::collections::HashMap;
use std::time::Duration;

use ndbus_core::constants::{INTERFACE_LOCAL, SIGNAL_DISCONNECTED};
use ndbus_core::{Bus, MessageType, error_names};
use ndbus_protocol::{Arg, marshal_signature, unmarshal};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::connection::ConnectionTable;
use crate::error::{BusError, BusResult};
use crate::message::{MessageEvent, MessageTemplate, Outgoing, SignalInfo};
use crate::registry::{ListenerId, MatchRule, SubscriptionRegistry};
use crate::transport::{
    CallId, DispatchHandle, MethodCall, OutgoingSignal, SignalHeader, Transport,
};

/// Work items for the core loop.
#[derive(Debug)]
pub(crate) enum Op {
    Attach {
        listener: ListenerId,
        events: mpsc::UnboundedSender<MessageEvent>,
    },
    Detach {
        listener: ListenerId,
    },
    Send {
        listener: ListenerId,
        outgoing: Outgoing,
    },
    AddMatch {
        listener: ListenerId,
        template: MessageTemplate,
    },
    RemoveMatch {
        listener: ListenerId,
        template: MessageTemplate,
    },
    Close {
        bus: Bus,
    },
    Reply {
        call_id: CallId,
        result: Result<Vec<Arg>, BusError>,
    },
    Signal {
        bus: Bus,
        header: SignalHeader,
        args: Vec<Arg>,
    },
    Timeout {
        call_id: CallId,
    },
    Stats {
        reply: oneshot::Sender<CoreStats>,
    },
}

/// A point-in-time view of the core loop's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreStats {
    pub connected: Vec<Bus>,
    pub match_rules: Vec<MatchRule>,
    pub pending_calls: usize,
    pub listeners: usize,
}

#[derive(Debug)]
struct Listener {
    events: mpsc::UnboundedSender<MessageEvent>,
    in_flight: Option<CallId>,
}

#[derive(Debug)]
struct PendingCall {
    listener: ListenerId,
    bus: Bus,
    /// Cancels the timeout sleeper once the call settles.
    timer: AbortHandle,
}

pub(crate) struct Core {
    transport: Box<dyn Transport>,
    config: ClientConfig,
    connections: ConnectionTable,
    registry: SubscriptionRegistry,
    listeners: HashMap<ListenerId, Listener>,
    pending: HashMap<CallId, PendingCall>,
    next_call_id: CallId,
    ops: mpsc::WeakUnboundedSender<Op>,
}

impl Core {
    pub fn new(
        transport: Box<dyn Transport>,
        config: ClientConfig,
        ops: mpsc::WeakUnboundedSender<Op>,
    ) -> Self {
        Self {
            transport,
            config,
            connections: ConnectionTable::default(),
            registry: SubscriptionRegistry::new(),
            listeners: HashMap::new(),
            pending: HashMap::new(),
            next_call_id: 1,
            ops,
        }
    }

    /// Handles operations until every client handle and message is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Op>) {
        info!("Core loop started");
        while let Some(op) = rx.recv().await {
            self.handle(op);
        }
        self.connections.close_all(self.transport.as_mut());
        info!("Core loop stopped");
    }

    fn handle(&mut self, op: Op) {
        match op {
            Op::Attach { listener, events } => {
                trace!(%listener, "Listener attached");
                self.listeners.insert(
                    listener,
                    Listener {
                        events,
                        in_flight: None,
                    },
                );
            }
            Op::Detach { listener } => self.detach(listener),
            Op::Send { listener, outgoing } => {
                if let Err(e) = self.send(listener, outgoing) {
                    self.emit(listener, MessageEvent::Error(e));
                }
            }
            Op::AddMatch { listener, template } => {
                if let Err(e) = self.add_match(listener, &template) {
                    self.emit(listener, MessageEvent::Error(e));
                }
            }
            Op::RemoveMatch { listener, template } => {
                if let Err(e) = self.remove_match(listener, &template) {
                    self.emit(listener, MessageEvent::Error(e));
                }
            }
            Op::Close { bus } => self.drop_bus(bus, "Connection closed"),
            Op::Reply { call_id, result } => self.method_reply(call_id, result),
            Op::Signal { bus, header, args } => self.dispatch_signal(bus, header, args),
            Op::Timeout { call_id } => {
                if self.pending.contains_key(&call_id) {
                    debug!(call_id, "Method call timed out");
                    self.method_reply(
                        call_id,
                        Err(BusError::transport(
                            error_names::NO_REPLY,
                            "Did not receive a reply before the timeout expired",
                        )),
                    );
                }
            }
            Op::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn dispatch_handle(&self) -> DispatchHandle {
        DispatchHandle::new(self.ops.clone())
    }

    fn connect(&mut self, template: &MessageTemplate) -> BusResult<()> {
        let bus = template.bus;
        let address = template
            .address
            .as_deref()
            .or_else(|| self.config.address(bus))
            .map(str::to_string);
        let dispatch = self.dispatch_handle();
        self.connections
            .ensure(bus, address.as_deref(), self.transport.as_mut(), dispatch)
    }

    fn send(&mut self, listener: ListenerId, outgoing: Outgoing) -> BusResult<()> {
        let template = &outgoing.template;
        template.check_addressing()?;

        let expects_reply = template.message_type.expects_reply();
        if expects_reply
            && self
                .listeners
                .get(&listener)
                .is_some_and(|l| l.in_flight.is_some())
        {
            return Err(BusError::CallInFlight);
        }

        self.connect(template)?;

        let signature = outgoing.signature.clone().unwrap_or_default();
        let args = marshal_signature(&signature, &outgoing.args, template.variant_policy)?;
        let Outgoing { template, .. } = outgoing;

        if template.message_type == MessageType::Signal {
            debug!(bus = %template.bus, member = ?template.member, %signature, "Sending signal");
            return self.transport.send_signal(OutgoingSignal {
                bus: template.bus,
                path: template.path.unwrap_or_default(),
                iface: template.iface.unwrap_or_default(),
                member: template.member.unwrap_or_default(),
                destination: template.destination,
                signature,
                args,
            });
        }

        let call_id = self.next_call_id;
        self.next_call_id += 1;
        let timeout = self.config.reply_timeout(template.timeout);
        debug!(call_id, bus = %template.bus, member = ?template.member, %signature, "Invoking method");

        self.transport.invoke_method(MethodCall {
            call_id,
            bus: template.bus,
            message_type: template.message_type,
            destination: template.destination.unwrap_or_default(),
            path: template.path.unwrap_or_default(),
            iface: template.iface.unwrap_or_default(),
            member: template.member.unwrap_or_default(),
            signature,
            args,
            timeout,
        })?;

        let timer = self.arm_timeout(call_id, timeout);
        self.pending.insert(
            call_id,
            PendingCall {
                listener,
                bus: template.bus,
                timer,
            },
        );
        if let Some(entry) = self.listeners.get_mut(&listener) {
            entry.in_flight = Some(call_id);
        }
        Ok(())
    }

    fn arm_timeout(&self, call_id: CallId, timeout: Duration) -> AbortHandle {
        let ops = self.ops.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(ops) = ops.upgrade() {
                let _ = ops.send(Op::Timeout { call_id });
            }
        })
        .abort_handle()
    }

    fn add_match(&mut self, listener: ListenerId, template: &MessageTemplate) -> BusResult<()> {
        let rule = template.match_rule()?;
        self.connect(template)?;

        if self.registry.register(rule.clone(), listener) {
            debug!(%rule, "Subscribing");
            if let Err(e) = self.transport.add_match(rule.bus, &rule.match_string()) {
                self.registry.unregister(&rule, listener);
                return Err(e);
            }
        }
        Ok(())
    }

    fn remove_match(&mut self, listener: ListenerId, template: &MessageTemplate) -> BusResult<()> {
        let rule = template.match_rule()?;
        match self.registry.unregister(&rule, listener) {
            None => Err(BusError::MatchRuleNotFound {
                rule: rule.match_string(),
            }),
            Some(true) => self.unsubscribe(&rule),
            Some(false) => Ok(()),
        }
    }

    fn unsubscribe(&mut self, rule: &MatchRule) -> BusResult<()> {
        if !self.connections.is_connected(rule.bus) {
            return Ok(());
        }
        debug!(%rule, "Unsubscribing");
        self.transport.remove_match(rule.bus, &rule.match_string())
    }

    fn detach(&mut self, listener: ListenerId) {
        trace!(%listener, "Listener detached");
        self.listeners.remove(&listener);
        self.pending.retain(|_, call| {
            let keep = call.listener != listener;
            if !keep {
                call.timer.abort();
            }
            keep
        });
        for rule in self.registry.remove_listener(listener) {
            if let Err(e) = self.unsubscribe(&rule) {
                warn!(%rule, error = %e, "Failed to unsubscribe");
            }
        }
    }

    fn method_reply(&mut self, call_id: CallId, result: Result<Vec<Arg>, BusError>) {
        let Some(call) = self.pending.remove(&call_id) else {
            trace!(call_id, "Reply for a call nobody waits on");
            return;
        };
        call.timer.abort();
        if let Some(entry) = self.listeners.get_mut(&call.listener)
            && entry.in_flight == Some(call_id)
        {
            entry.in_flight = None;
        }

        let event = match result {
            Ok(args) => MessageEvent::MethodResponse(unmarshal(args)),
            Err(e) => MessageEvent::Error(e),
        };
        self.emit(call.listener, event);
    }

    fn dispatch_signal(&mut self, bus: Bus, header: SignalHeader, args: Vec<Arg>) {
        if header.iface == INTERFACE_LOCAL && header.member == SIGNAL_DISCONNECTED {
            warn!(%bus, "Bus disconnected");
            self.drop_bus(bus, "Connection got disconnected");
            return;
        }

        let listeners = self.registry.listeners_for(bus, &header);
        trace!(
            %bus,
            iface = %header.iface,
            member = %header.member,
            listeners = listeners.len(),
            "Signal received"
        );
        if listeners.is_empty() {
            return;
        }

        let signal = SignalInfo::from_header(&header);
        let args = unmarshal(args);
        for listener in listeners {
            self.emit(
                listener,
                MessageEvent::SignalReceipt {
                    signal: signal.clone(),
                    args: args.clone(),
                },
            );
        }
    }

    /// Closes `bus`, forgets its subscriptions and fails calls still
    /// waiting on it.
    fn drop_bus(&mut self, bus: Bus, reason: &str) {
        self.connections.close(bus, self.transport.as_mut());

        let dropped = self.registry.remove_bus(bus);
        if !dropped.is_empty() {
            debug!(%bus, rules = dropped.len(), "Dropped subscriptions");
        }

        let failed: Vec<CallId> = self
            .pending
            .iter()
            .filter(|(_, call)| call.bus == bus)
            .map(|(id, _)| *id)
            .collect();
        for call_id in failed {
            self.method_reply(call_id, Err(BusError::disconnected(reason)));
        }
    }

    /// Delivers one event. A listener that is gone is skipped.
    fn emit(&mut self, listener: ListenerId, event: MessageEvent) {
        let Some(entry) = self.listeners.get(&listener) else {
            debug!(%listener, "Dropping event for unknown listener");
            return;
        };
        if entry.events.send(event).is_err() {
            warn!(%listener, "Listener channel closed, dropping event");
        }
    }

    fn stats(&self) -> CoreStats {
        CoreStats {
            connected: self.connections.buses(),
            match_rules: self.registry.rules().cloned().collect(),
            pending_calls: self.pending.len(),
            listeners: self.listeners.len(),
        }
    }
}
