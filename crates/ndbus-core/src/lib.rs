//! Core types shared by the ndbus crates: the constants table, the untyped
//! argument [`Value`] and tracing setup.

pub mod constants;
pub mod tracing;
pub mod value;

pub use constants::{Bus, MessageType, UnknownCode, VariantPolicy, error_names};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use value::Value;
