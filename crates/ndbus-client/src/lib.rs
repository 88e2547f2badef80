//! Client side of the ndbus message model.
//!
//! A [`Client`] owns a single core task that holds every bus connection,
//! the match rule registry and the table of outstanding method calls.
//! [`Message`]s are created from a [`MessageTemplate`], queue operations on
//! that task and receive their outcomes as [`MessageEvent`]s.
//!
//! The bus itself sits behind the [`Transport`] trait. [`LoopbackTransport`]
//! is an in-process implementation that echoes signals and answers method
//! calls from registered handlers.
//!
//! # Example
//!
//! ```rust
//! use ndbus_client::{Client, LoopbackTransport, MessageEvent, MessageTemplate};
//! use ndbus_core::{Bus, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let client = Client::new(LoopbackTransport::new());
//! let template = MessageTemplate::signal("/org/example", "org.example.Demo", "Ping")
//!     .with_bus(Bus::Session);
//!
//! let mut listener = client.message(template.clone());
//! listener.add_match();
//!
//! let mut emitter = client.message(template);
//! emitter.append_args("s", ["hello"]);
//! emitter.send();
//!
//! match listener.next_event().await {
//!     Some(MessageEvent::SignalReceipt { args, .. }) => assert_eq!(args, vec![Value::from("hello")]),
//!     other => panic!("unexpected {other:?}"),
//! }
//! # }
//! ```

mod address;
mod client;
mod config;
mod connection;
mod error;
mod loopback;
mod message;
mod registry;
mod router;
mod transport;

pub use address::{AddressEntry, BusAddress};
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_REPLY_TIMEOUT, DEFAULT_SYSTEM_BUS_ADDRESS};
pub use error::{BusError, BusResult, ErrorObject};
pub use loopback::{BoundaryCall, LOOPBACK_UNIQUE_NAME, LoopbackTransport, MethodOutcome};
pub use message::{Message, MessageEvent, MessageState, MessageTemplate, SignalInfo};
pub use registry::{ListenerId, MatchRule, SubscriptionRegistry};
pub use router::CoreStats;
pub use transport::{CallId, DispatchHandle, MethodCall, OutgoingSignal, SignalHeader, Transport};
