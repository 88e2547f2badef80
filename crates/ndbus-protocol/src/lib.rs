//! Type signatures and argument marshaling for ndbus.
//!
//! # Overview
//!
//! A message payload is described by a signature string such as `"sa{sv}"`.
//! [`parse_signature`] turns it into one [`TypeDescriptor`] per argument and
//! [`marshal`] pairs those descriptors with the caller's untyped
//! [`Value`](ndbus_core::Value)s, producing typed [`Arg`]s the transport can
//! write. [`Arg::into_value`] goes the other way for inbound payloads.
//!
//! # Example
//!
//! ```rust
//! use ndbus_core::{Value, VariantPolicy};
//! use ndbus_protocol::marshal_signature;
//!
//! let args = marshal_signature("si", &[Value::from("name"), Value::from(3)], VariantPolicy::Default).unwrap();
//! assert_eq!(args[1].signature(), "i");
//! ```

mod arg;
mod error;
mod marshal;
mod names;
mod signature;

pub use arg::{Arg, unmarshal};
pub use error::{MarshalError, MarshalResult, NameError, SignatureError};
pub use marshal::{infer_variant, marshal, marshal_signature};
pub use names::{
    MAX_NAME_LENGTH, NameKind, validate_bus_name, validate_interface, validate_member,
    validate_object_path,
};
pub use signature::{
    MAX_ARRAY_DEPTH, MAX_SIGNATURE_LENGTH, MAX_STRUCT_DEPTH, ScalarCode, TypeDescriptor,
    parse_signature, render_signature,
};
