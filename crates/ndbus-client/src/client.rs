//! The client handle.

use ndbus_core::Bus;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{BusError, BusResult};
use crate::message::{Message, MessageTemplate};
use crate::router::{Core, CoreStats, Op};
use crate::transport::Transport;

/// Entry point: owns the core loop and creates messages bound to it.
///
/// The core loop runs on the current tokio runtime until the client and
/// every message created from it are dropped.
#[derive(Debug, Clone)]
pub struct Client {
    ops: mpsc::UnboundedSender<Op>,
}

impl Client {
    /// Starts a client with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(transport: impl Transport) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Starts a client with `config`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_config(transport: impl Transport, config: ClientConfig) -> Self {
        let (ops, rx) = mpsc::unbounded_channel();
        let core = Core::new(Box::new(transport), config, ops.downgrade());
        tokio::spawn(core.run(rx));
        Self { ops }
    }

    /// Creates a message entity from `template`.
    pub fn message(&self, template: MessageTemplate) -> Message {
        Message::attach(self.ops.clone(), template)
    }

    /// Closes `bus` once everything queued so far is handled.
    pub fn close_connection(&self, bus: Bus) {
        if self.ops.send(Op::Close { bus }).is_err() {
            debug!(%bus, "Core loop gone, nothing to close");
        }
    }

    /// Snapshot of the core loop's state, taken after everything queued
    /// before this call.
    pub async fn stats(&self) -> BusResult<CoreStats> {
        let (reply, rx) = oneshot::channel();
        self.ops
            .send(Op::Stats { reply })
            .map_err(|_| BusError::Closed)?;
        rx.await.map_err(|_| BusError::Closed)
    }
}
