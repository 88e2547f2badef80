//! Client error types.

use ndbus_core::error_names;
use ndbus_protocol::{MarshalError, NameError, SignatureError};
use serde::Serialize;
use thiserror::Error;

/// Result type for client operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors delivered as `Error` events on a message.
///
/// Entity operations never return these directly; they surface through the
/// entity's event channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    /// Malformed signature string.
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),

    /// Argument count differs from the signature's arity.
    #[error("Signature expects {expected} argument(s), got {actual}")]
    ArgumentMismatch { expected: usize, actual: usize },

    /// A value that does not fit its type.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// `send` on a message whose type is still `Invalid`.
    #[error("Message type is invalid")]
    InvalidType,

    /// A match operation on a message that is not a signal.
    #[error("Match rules require a signal message, got {message_type}")]
    NotASignal { message_type: String },

    /// Failure reported by the transport or the bus, passed through as is.
    #[error("{name}: {message}")]
    Transport { name: String, message: String },

    /// A mandatory addressing field is unset.
    #[error("Missing {field} for {message_type}")]
    MissingField {
        field: &'static str,
        message_type: String,
    },

    #[error("{0}")]
    InvalidName(#[from] NameError),

    /// `remove_match` for a rule this message never registered.
    #[error("Match rule not registered: {rule}")]
    MatchRuleNotFound { rule: String },

    /// A method call was sent while the previous one is still outstanding.
    #[error("A method call is already in flight on this message")]
    CallInFlight,

    /// The client's core task is gone.
    #[error("Client is closed")]
    Closed,
}

impl BusError {
    pub fn transport(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn missing_field(field: &'static str, message_type: impl ToString) -> Self {
        Self::MissingField {
            field,
            message_type: message_type.to_string(),
        }
    }

    /// The connection went away before a reply arrived.
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::transport(error_names::DISCONNECTED, message)
    }

    /// The D-Bus error name for this error.
    pub fn name(&self) -> &str {
        match self {
            Self::Signature(_) => error_names::INVALID_SIGNATURE,
            Self::ArgumentMismatch { .. } | Self::TypeMismatch(_) | Self::MissingField { .. } => {
                error_names::INVALID_ARGS
            }
            Self::InvalidType | Self::NotASignal { .. } | Self::CallInFlight => {
                error_names::FAILED
            }
            Self::Transport { name, .. } => name.as_str(),
            Self::InvalidName(_) => error_names::INVALID_ARGS,
            Self::MatchRuleNotFound { .. } => error_names::MATCH_RULE_NOT_FOUND,
            Self::Closed => error_names::DISCONNECTED,
        }
    }

    /// The `{name, message}` pair as carried by error events.
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            name: self.name().to_string(),
            message: match self {
                Self::Transport { message, .. } => message.clone(),
                other => other.to_string(),
            },
        }
    }
}

impl From<MarshalError> for BusError {
    fn from(err: MarshalError) -> Self {
        match err {
            MarshalError::Signature(e) => Self::Signature(e),
            MarshalError::ArgumentMismatch { expected, actual } => {
                Self::ArgumentMismatch { expected, actual }
            }
            other @ (MarshalError::TypeMismatch { .. }
            | MarshalError::UnsupportedValue { .. }
            | MarshalError::InvalidValue { .. }) => Self::TypeMismatch(other.to_string()),
        }
    }
}

/// Serializable `{name, message}` form of a [`BusError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorObject {
    pub name: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_errors_map_to_bus_errors() {
        let err = BusError::from(MarshalError::ArgumentMismatch {
            expected: 1,
            actual: 0,
        });
        assert_eq!(
            err,
            BusError::ArgumentMismatch {
                expected: 1,
                actual: 0
            }
        );

        let err = BusError::from(MarshalError::unsupported("arg0", "null"));
        assert_eq!(
            err,
            BusError::TypeMismatch("cannot encode null at arg0 as a variant".into())
        );
        assert_eq!(err.name(), error_names::INVALID_ARGS);
    }

    #[test]
    fn transport_errors_pass_through() {
        let err = BusError::transport(error_names::SERVICE_UNKNOWN, "no such name");
        assert_eq!(err.name(), error_names::SERVICE_UNKNOWN);
        assert_eq!(
            err.to_error_object(),
            ErrorObject {
                name: error_names::SERVICE_UNKNOWN.into(),
                message: "no such name".into(),
            }
        );
    }

    #[test]
    fn error_object_json() {
        let err = BusError::missing_field("destination", "method_call");
        insta::assert_snapshot!(
            serde_json::to_string(&err.to_error_object()).unwrap(),
            @r#"{"name":"org.freedesktop.DBus.Error.InvalidArgs","message":"Missing destination for method_call"}"#
        );
    }

    #[test]
    fn disconnected_name() {
        assert_eq!(
            BusError::disconnected("bus closed").name(),
            "org.freedesktop.DBus.Error.Disconnected"
        );
        assert_eq!(BusError::Closed.name(), error_names::DISCONNECTED);
    }
}
