//! Protocol error types.

use thiserror::Error;

use crate::names::NameKind;

/// Result type for marshaling operations.
pub type MarshalResult<T> = Result<T, MarshalError>;

/// A malformed type-signature string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// A character that is not a known type code.
    #[error("unknown type code {code:?} at offset {offset}")]
    UnknownCode { code: char, offset: usize },

    /// `{` not directly following `a`.
    #[error("dict entry outside of an array at offset {offset}")]
    DictEntryOutsideArray { offset: usize },

    /// An opening bracket without its closing bracket, or the reverse.
    #[error("unbalanced {bracket:?} at offset {offset}")]
    Unbalanced { bracket: char, offset: usize },

    /// A dict entry that does not hold exactly a key and a value.
    #[error("dict entry at offset {offset} must contain exactly two types, found {found}")]
    DictEntryArity { offset: usize, found: usize },

    /// A dict entry key that is a container or a variant.
    #[error("dict entry key at offset {offset} must be a basic type, found {found:?}")]
    DictKeyNotBasic { offset: usize, found: String },

    /// `a` at the end of the signature or of a container.
    #[error("array at offset {offset} has no element type")]
    MissingArrayElement { offset: usize },

    /// `()`.
    #[error("empty struct at offset {offset}")]
    EmptyStruct { offset: usize },

    #[error("signature is {len} bytes long (max: {max})")]
    TooLong { len: usize, max: usize },

    #[error("{container} nesting deeper than {max} levels at offset {offset}")]
    TooDeep {
        container: &'static str,
        offset: usize,
        max: usize,
    },
}

/// A D-Bus name (path, interface, member, bus name) that breaks the naming rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {name:?}")]
pub struct NameError {
    pub kind: NameKind,
    pub name: String,
}

/// Errors produced while pairing argument values with a signature.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    #[error("invalid signature: {0}")]
    Signature(#[from] SignatureError),

    /// Argument count differs from signature arity.
    #[error("signature expects {expected} argument(s), got {actual}")]
    ArgumentMismatch { expected: usize, actual: usize },

    /// Value shape incompatible with its type descriptor.
    #[error("type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A value whose wire type cannot be inferred for a variant position.
    #[error("cannot encode {kind} at {path} as a variant")]
    UnsupportedValue { path: String, kind: String },

    /// A string value that must be an object path or a signature but is not.
    #[error("invalid value at {path}: {reason}")]
    InvalidValue { path: String, reason: String },
}

impl MarshalError {
    pub fn type_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn unsupported(path: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::UnsupportedValue {
            path: path.into(),
            kind: kind.into(),
        }
    }

    pub fn invalid_value(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidValue {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
