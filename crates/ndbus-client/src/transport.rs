//! The boundary to the code that owns the actual bus connection.
//!
//! The core loop hands fully marshaled calls to a [`Transport`] and never
//! waits on it. Outcomes come back later through the [`DispatchHandle`]
//! passed to [`Transport::init`], which queues them behind whatever the
//! core loop is already working on.

use std::time::Duration;

use ndbus_core::{Bus, MessageType};
use ndbus_protocol::Arg;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::address::BusAddress;
use crate::error::{BusError, BusResult};
use crate::router::Op;

/// Correlates a method call with its reply.
pub type CallId = u64;

/// A method call ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub call_id: CallId,
    pub bus: Bus,
    /// `MethodCall`, `MethodReturn` or `Error`.
    pub message_type: MessageType,
    pub destination: String,
    pub path: String,
    pub iface: String,
    pub member: String,
    pub signature: String,
    pub args: Vec<Arg>,
    pub timeout: Duration,
}

/// A broadcast signal ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingSignal {
    pub bus: Bus,
    pub path: String,
    pub iface: String,
    pub member: String,
    pub destination: Option<String>,
    pub signature: String,
    pub args: Vec<Arg>,
}

/// Header fields of a received signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalHeader {
    pub path: String,
    pub iface: String,
    pub member: String,
    pub sender: Option<String>,
    pub destination: Option<String>,
}

impl SignalHeader {
    pub fn new(path: impl Into<String>, iface: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            iface: iface.into(),
            member: member.into(),
            sender: None,
            destination: None,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// A bus connection implementation.
///
/// Every method is called from the core loop and must not block. Errors
/// returned here are delivered to the message that triggered the call.
pub trait Transport: Send + 'static {
    /// Establishes (or reuses) the connection for `bus`. `address` is `None`
    /// when neither the message nor the client configuration names one.
    fn init(
        &mut self,
        bus: Bus,
        address: Option<&BusAddress>,
        dispatch: DispatchHandle,
    ) -> BusResult<()>;

    /// Tears down the connection for `bus`.
    fn deinit(&mut self, bus: Bus);

    /// Issues a method call. The reply, or an error, must be reported
    /// through [`DispatchHandle::method_reply`] with `call.call_id`.
    fn invoke_method(&mut self, call: MethodCall) -> BusResult<()>;

    /// Broadcasts a signal. No reply is expected.
    fn send_signal(&mut self, signal: OutgoingSignal) -> BusResult<()>;

    /// Subscribes to signals matching `rule`, given in `AddMatch` syntax.
    fn add_match(&mut self, bus: Bus, rule: &str) -> BusResult<()>;

    fn remove_match(&mut self, bus: Bus, rule: &str) -> BusResult<()>;
}

/// Handle for reporting transport outcomes to the core loop.
///
/// The handle does not keep the client alive: once every client handle and
/// message is gone, reports fail with [`BusError::Closed`].
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    ops: mpsc::WeakUnboundedSender<Op>,
}

impl DispatchHandle {
    pub(crate) fn new(ops: mpsc::WeakUnboundedSender<Op>) -> Self {
        Self { ops }
    }

    /// Reports the outcome of a method call.
    pub fn method_reply(&self, call_id: CallId, result: Result<Vec<Arg>, BusError>) -> BusResult<()> {
        self.post(Op::Reply { call_id, result })
    }

    /// Reports a signal received on `bus`.
    pub fn signal(&self, bus: Bus, header: SignalHeader, args: Vec<Arg>) -> BusResult<()> {
        self.post(Op::Signal { bus, header, args })
    }

    fn post(&self, op: Op) -> BusResult<()> {
        let ops = self.ops.upgrade().ok_or(BusError::Closed)?;
        ops.send(op).map_err(|_| BusError::Closed)
    }
}
