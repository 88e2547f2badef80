//! Typed arguments, the output of the marshaler.

use std::collections::BTreeMap;

use ndbus_core::Value;
use serde::Serialize;

use crate::signature::{ScalarCode, TypeDescriptor};

/// A strongly typed argument, ready to be written to the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Arg {
    Byte(u8),
    Boolean(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    ObjectPath(String),
    Signature(String),
    /// `aT` for any `T` other than a dict entry. `element` is kept so that
    /// empty arrays still know their type.
    Array {
        element: TypeDescriptor,
        items: Vec<Arg>,
    },
    /// `a{KV}`.
    Dict {
        key: TypeDescriptor,
        value: TypeDescriptor,
        entries: Vec<(Arg, Arg)>,
    },
    Struct(Vec<Arg>),
    Variant(Box<Arg>),
}

impl Arg {
    /// The type this argument was encoded as.
    pub fn descriptor(&self) -> TypeDescriptor {
        match self {
            Self::Byte(_) => TypeDescriptor::Scalar(ScalarCode::Byte),
            Self::Boolean(_) => TypeDescriptor::Scalar(ScalarCode::Boolean),
            Self::Int16(_) => TypeDescriptor::Scalar(ScalarCode::Int16),
            Self::UInt16(_) => TypeDescriptor::Scalar(ScalarCode::UInt16),
            Self::Int32(_) => TypeDescriptor::Scalar(ScalarCode::Int32),
            Self::UInt32(_) => TypeDescriptor::Scalar(ScalarCode::UInt32),
            Self::Int64(_) => TypeDescriptor::Scalar(ScalarCode::Int64),
            Self::UInt64(_) => TypeDescriptor::Scalar(ScalarCode::UInt64),
            Self::Double(_) => TypeDescriptor::Scalar(ScalarCode::Double),
            Self::String(_) => TypeDescriptor::Scalar(ScalarCode::String),
            Self::ObjectPath(_) => TypeDescriptor::Scalar(ScalarCode::ObjectPath),
            Self::Signature(_) => TypeDescriptor::Scalar(ScalarCode::Signature),
            Self::Array { element, .. } => TypeDescriptor::array(element.clone()),
            Self::Dict { key, value, .. } => TypeDescriptor::dict(key.clone(), value.clone()),
            Self::Struct(fields) => TypeDescriptor::Struct(fields.iter().map(Self::descriptor).collect()),
            Self::Variant(_) => TypeDescriptor::Variant,
        }
    }

    pub fn signature(&self) -> String {
        self.descriptor().signature()
    }

    /// For a variant, the signature of the value it carries.
    pub fn variant_signature(&self) -> Option<String> {
        match self {
            Self::Variant(inner) => Some(inner.signature()),
            _ => None,
        }
    }

    /// Converts back into an untyped value.
    ///
    /// Variants are unwrapped, structs become arrays and dict keys are
    /// rendered as text.
    pub fn into_value(self) -> Value {
        match self {
            Self::Byte(b) => Value::from(b),
            Self::Boolean(b) => Value::Bool(b),
            Self::Int16(i) => Value::from(i),
            Self::UInt16(u) => Value::from(u),
            Self::Int32(i) => Value::from(i),
            Self::UInt32(u) => Value::from(u),
            Self::Int64(i) => Value::Int(i),
            Self::UInt64(u) => Value::from(u),
            Self::Double(d) => Value::Double(d),
            Self::String(s) | Self::ObjectPath(s) | Self::Signature(s) => Value::String(s),
            Self::Array { items, .. } => Value::Array(items.into_iter().map(Self::into_value).collect()),
            Self::Dict { entries, .. } => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| {
                        let key = key.into_value().to_text().unwrap_or_default();
                        (key, value.into_value())
                    })
                    .collect::<BTreeMap<_, _>>(),
            ),
            Self::Struct(fields) => Value::Array(fields.into_iter().map(Self::into_value).collect()),
            Self::Variant(inner) => inner.into_value(),
        }
    }
}

/// Converts a whole argument list back into values.
pub fn unmarshal(args: Vec<Arg>) -> Vec<Value> {
    args.into_iter().map(Arg::into_value).collect()
}
