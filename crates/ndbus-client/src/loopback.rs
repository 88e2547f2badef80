//! An in-process bus.
//!
//! [`LoopbackTransport`] stands in for a bus daemon: signals sent on a bus
//! come back to that bus's subscriptions, and method calls are answered by
//! handlers registered up front. Every boundary call is recorded so the
//! traffic can be inspected afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ndbus_core::constants::{INTERFACE_LOCAL, PATH_LOCAL, SIGNAL_DISCONNECTED};
use ndbus_core::{Bus, error_names};
use ndbus_protocol::Arg;
use serde::Serialize;
use tracing::{debug, trace};

use crate::address::BusAddress;
use crate::error::{BusError, BusResult};
use crate::transport::{DispatchHandle, MethodCall, OutgoingSignal, SignalHeader, Transport};

/// Unique name the loopback uses as the sender of every signal.
pub const LOOPBACK_UNIQUE_NAME: &str = ":1.0";

/// What a method handler does with a call. `None` means never reply.
pub type MethodOutcome = Option<Result<Vec<Arg>, BusError>>;

type MethodHandler = Box<dyn FnMut(&MethodCall) -> MethodOutcome + Send>;

/// One call across the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum BoundaryCall {
    Init { bus: Bus, address: Option<String> },
    Deinit { bus: Bus },
    InvokeMethod { bus: Bus, member: String, signature: String },
    SendSignal { bus: Bus, member: String, signature: String },
    AddMatch { bus: Bus, rule: String },
    RemoveMatch { bus: Bus, rule: String },
}

struct Handler {
    destination: String,
    path: String,
    iface: String,
    member: String,
    handler: MethodHandler,
}

impl Handler {
    fn accepts(&self, call: &MethodCall) -> bool {
        self.destination == call.destination
            && self.path == call.path
            && self.member == call.member
            && self.iface == call.iface
    }
}

#[derive(Default)]
struct LoopbackState {
    connections: HashMap<Bus, DispatchHandle>,
    matches: HashMap<Bus, Vec<String>>,
    handlers: Vec<Handler>,
    calls: Vec<BoundaryCall>,
    method_calls: Vec<MethodCall>,
    signals: Vec<OutgoingSignal>,
    refuse_init: bool,
}

/// In-process [`Transport`]. Clones share the same bus.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers calls to `iface.member` on `destination` at `path`.
    pub fn on_method<F>(
        &self,
        destination: impl Into<String>,
        path: impl Into<String>,
        iface: impl Into<String>,
        member: impl Into<String>,
        handler: F,
    ) where
        F: FnMut(&MethodCall) -> MethodOutcome + Send + 'static,
    {
        self.state().handlers.push(Handler {
            destination: destination.into(),
            path: path.into(),
            iface: iface.into(),
            member: member.into(),
            handler: Box::new(handler),
        });
    }

    /// Makes the next `init` calls fail, as if no bus were reachable.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state().refuse_init = refuse;
    }

    /// Delivers a signal from another peer on `bus`, if anything on that
    /// bus subscribed to it.
    pub fn inject_signal(&self, bus: Bus, header: SignalHeader, args: Vec<Arg>) -> BusResult<()> {
        let state = self.state();
        let dispatch = state.dispatch(bus)?;
        let local = header.iface == INTERFACE_LOCAL;
        if local || state.subscribed(bus, &header) {
            dispatch.signal(bus, header, args)?;
        }
        Ok(())
    }

    /// Simulates the bus going away.
    pub fn disconnect(&self, bus: Bus) -> BusResult<()> {
        self.inject_signal(
            bus,
            SignalHeader::new(PATH_LOCAL, INTERFACE_LOCAL, SIGNAL_DISCONNECTED),
            Vec::new(),
        )
    }

    pub fn calls(&self) -> Vec<BoundaryCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn method_calls(&self) -> Vec<MethodCall> {
        self.state().method_calls.clone()
    }

    pub fn sent_signals(&self) -> Vec<OutgoingSignal> {
        self.state().signals.clone()
    }

    /// Match strings currently installed on `bus`.
    pub fn installed_matches(&self, bus: Bus) -> Vec<String> {
        self.state().matches.get(&bus).cloned().unwrap_or_default()
    }

    pub fn is_connected(&self, bus: Bus) -> bool {
        self.state().connections.contains_key(&bus)
    }
}

impl LoopbackState {
    fn dispatch(&self, bus: Bus) -> BusResult<&DispatchHandle> {
        self.connections
            .get(&bus)
            .ok_or_else(|| BusError::disconnected(format!("{bus} bus is not connected")))
    }

    fn subscribed(&self, bus: Bus, header: &SignalHeader) -> bool {
        self.matches
            .get(&bus)
            .is_some_and(|rules| rules.iter().any(|rule| rule_accepts(rule, header)))
    }
}

/// Evaluates an `AddMatch` string against a signal header.
fn rule_accepts(rule: &str, header: &SignalHeader) -> bool {
    rule.split(',').all(|pair| {
        let Some((key, value)) = pair.split_once('=') else {
            return false;
        };
        let value = value.trim_matches('\'');
        match key {
            "type" => value == "signal",
            "interface" => value == header.iface,
            "member" => value == header.member,
            "path" => value == header.path,
            "sender" => header.sender.as_deref() == Some(value),
            "destination" => header.destination.as_deref() == Some(value),
            _ => false,
        }
    })
}

impl Transport for LoopbackTransport {
    fn init(
        &mut self,
        bus: Bus,
        address: Option<&BusAddress>,
        dispatch: DispatchHandle,
    ) -> BusResult<()> {
        let mut state = self.state();
        state.calls.push(BoundaryCall::Init {
            bus,
            address: address.map(|a| a.to_string()),
        });
        if state.refuse_init {
            return Err(BusError::transport(
                error_names::NO_SERVER,
                format!("Failed to connect to the {bus} bus"),
            ));
        }
        debug!(%bus, "Loopback connected");
        state.connections.insert(bus, dispatch);
        Ok(())
    }

    fn deinit(&mut self, bus: Bus) {
        let mut state = self.state();
        state.calls.push(BoundaryCall::Deinit { bus });
        state.connections.remove(&bus);
        state.matches.remove(&bus);
    }

    fn invoke_method(&mut self, call: MethodCall) -> BusResult<()> {
        let mut state = self.state();
        state.calls.push(BoundaryCall::InvokeMethod {
            bus: call.bus,
            member: call.member.clone(),
            signature: call.signature.clone(),
        });
        state.method_calls.push(call.clone());
        let dispatch = state.dispatch(call.bus)?.clone();

        let outcome = match state.handlers.iter_mut().find(|h| h.accepts(&call)) {
            Some(handler) => (handler.handler)(&call),
            None => Some(Err(BusError::transport(
                error_names::SERVICE_UNKNOWN,
                format!(
                    "The name {} was not provided by any .service files",
                    call.destination
                ),
            ))),
        };

        match outcome {
            Some(result) => dispatch.method_reply(call.call_id, result),
            None => {
                trace!(call_id = call.call_id, "Loopback leaves call unanswered");
                Ok(())
            }
        }
    }

    fn send_signal(&mut self, signal: OutgoingSignal) -> BusResult<()> {
        let mut state = self.state();
        state.calls.push(BoundaryCall::SendSignal {
            bus: signal.bus,
            member: signal.member.clone(),
            signature: signal.signature.clone(),
        });
        state.signals.push(signal.clone());

        let mut header = SignalHeader::new(signal.path, signal.iface, signal.member)
            .with_sender(LOOPBACK_UNIQUE_NAME);
        header.destination = signal.destination;

        if state.subscribed(signal.bus, &header) {
            state.dispatch(signal.bus)?.signal(signal.bus, header, signal.args)?;
        }
        Ok(())
    }

    fn add_match(&mut self, bus: Bus, rule: &str) -> BusResult<()> {
        let mut state = self.state();
        state.calls.push(BoundaryCall::AddMatch {
            bus,
            rule: rule.to_string(),
        });
        state.dispatch(bus)?;
        state.matches.entry(bus).or_default().push(rule.to_string());
        Ok(())
    }

    fn remove_match(&mut self, bus: Bus, rule: &str) -> BusResult<()> {
        let mut state = self.state();
        state.calls.push(BoundaryCall::RemoveMatch {
            bus,
            rule: rule.to_string(),
        });
        let rules = state.matches.entry(bus).or_default();
        match rules.iter().position(|r| r == rule) {
            Some(pos) => {
                rules.remove(pos);
                Ok(())
            }
            None => Err(BusError::transport(
                error_names::MATCH_RULE_NOT_FOUND,
                format!("The given match rule wasn't found: {rule}"),
            )),
        }
    }
}
