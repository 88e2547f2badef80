//! Bus identifiers, message types, variant policies and well-known names.
//!
//! Numeric codes match the ones libdbus uses, so they can be handed to a
//! native transport unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A numeric code that does not correspond to any known constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown {kind} code: {code}")]
pub struct UnknownCode {
    /// Which constant family was being decoded.
    pub kind: &'static str,
    /// The offending code.
    pub code: i32,
}

/// Which bus instance a message targets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Bus {
    /// The per-login-session bus.
    Session,
    /// The system-wide bus.
    #[default]
    System,
    /// The bus that started this process.
    Starter,
}

impl Bus {
    /// All bus identifiers.
    pub const ALL: [Bus; 3] = [Bus::Session, Bus::System, Bus::Starter];

    /// Returns the libdbus `DBusBusType` code.
    pub fn code(self) -> i32 {
        match self {
            Self::Session => 0,
            Self::System => 1,
            Self::Starter => 2,
        }
    }

    /// Returns the environment variable that names this bus's address.
    pub fn address_env_var(self) -> &'static str {
        match self {
            Self::Session => "DBUS_SESSION_BUS_ADDRESS",
            Self::System => "DBUS_SYSTEM_BUS_ADDRESS",
            Self::Starter => "DBUS_STARTER_ADDRESS",
        }
    }

    /// Decodes a libdbus `DBusBusType` code.
    pub fn from_code(code: i32) -> Result<Self, UnknownCode> {
        match code {
            0 => Ok(Self::Session),
            1 => Ok(Self::System),
            2 => Ok(Self::Starter),
            _ => Err(UnknownCode { kind: "bus", code }),
        }
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Session => "session",
            Self::System => "system",
            Self::Starter => "starter",
        })
    }
}

/// Message type, which decides the call semantics of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Not a valid message; sending it is an error.
    #[default]
    Invalid,
    /// A method call expecting a reply.
    MethodCall,
    /// A method reply.
    MethodReturn,
    /// An error reply.
    Error,
    /// A broadcast signal.
    Signal,
}

impl MessageType {
    /// Returns the libdbus `DBUS_MESSAGE_TYPE_*` code.
    pub fn code(self) -> i32 {
        match self {
            Self::Invalid => 0,
            Self::MethodCall => 1,
            Self::MethodReturn => 2,
            Self::Error => 3,
            Self::Signal => 4,
        }
    }

    /// Returns true for every type that issues a method invocation on send.
    pub fn expects_reply(self) -> bool {
        matches!(self, Self::MethodCall | Self::MethodReturn | Self::Error)
    }

    /// Decodes a `DBUS_MESSAGE_TYPE_*` code.
    pub fn from_code(code: i32) -> Result<Self, UnknownCode> {
        match code {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::MethodCall),
            2 => Ok(Self::MethodReturn),
            3 => Ok(Self::Error),
            4 => Ok(Self::Signal),
            _ => Err(UnknownCode {
                kind: "message type",
                code,
            }),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invalid => "invalid",
            Self::MethodCall => "method_call",
            Self::MethodReturn => "method_return",
            Self::Error => "error",
            Self::Signal => "signal",
        })
    }
}

/// How values in variant positions are encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantPolicy {
    /// Containers inside a variant keep per-member types (`av`, `a{sv}`).
    #[default]
    Default,
    /// Containers inside a variant share one member type; mixed members
    /// are coerced to strings.
    Simple,
}

impl VariantPolicy {
    /// Returns the numeric policy code.
    pub fn code(self) -> i32 {
        match self {
            Self::Default => 0,
            Self::Simple => 1,
        }
    }

    /// Decodes a numeric policy code.
    pub fn from_code(code: i32) -> Result<Self, UnknownCode> {
        match code {
            0 => Ok(Self::Default),
            1 => Ok(Self::Simple),
            _ => Err(UnknownCode {
                kind: "variant policy",
                code,
            }),
        }
    }
}

/// The bus daemon's well-known name.
pub const SERVICE_DBUS: &str = "org.freedesktop.DBus";
/// The bus daemon's object path.
pub const PATH_DBUS: &str = "/org/freedesktop/DBus";
/// Path used for connection-local messages.
pub const PATH_LOCAL: &str = "/org/freedesktop/DBus/Local";
/// The bus daemon's interface.
pub const INTERFACE_DBUS: &str = "org.freedesktop.DBus";
/// Interface of connection-local messages such as `Disconnected`.
pub const INTERFACE_LOCAL: &str = "org.freedesktop.DBus.Local";
pub const INTERFACE_INTROSPECTABLE: &str = "org.freedesktop.DBus.Introspectable";
pub const INTERFACE_PROPERTIES: &str = "org.freedesktop.DBus.Properties";
pub const INTERFACE_PEER: &str = "org.freedesktop.DBus.Peer";

/// Member of the local signal emitted when a connection drops.
pub const SIGNAL_DISCONNECTED: &str = "Disconnected";

/// Default reply timeout marker: let the transport decide.
pub const TIMEOUT_USE_DEFAULT: i32 = -1;

/// Standard `org.freedesktop.DBus.Error.*` names.
pub mod error_names {
    pub const FAILED: &str = "org.freedesktop.DBus.Error.Failed";
    pub const NO_MEMORY: &str = "org.freedesktop.DBus.Error.NoMemory";
    pub const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
    pub const NAME_HAS_NO_OWNER: &str = "org.freedesktop.DBus.Error.NameHasNoOwner";
    pub const NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";
    pub const IO_ERROR: &str = "org.freedesktop.DBus.Error.IOError";
    pub const BAD_ADDRESS: &str = "org.freedesktop.DBus.Error.BadAddress";
    pub const NOT_SUPPORTED: &str = "org.freedesktop.DBus.Error.NotSupported";
    pub const LIMITS_EXCEEDED: &str = "org.freedesktop.DBus.Error.LimitsExceeded";
    pub const ACCESS_DENIED: &str = "org.freedesktop.DBus.Error.AccessDenied";
    pub const AUTH_FAILED: &str = "org.freedesktop.DBus.Error.AuthFailed";
    pub const NO_SERVER: &str = "org.freedesktop.DBus.Error.NoServer";
    pub const TIMEOUT: &str = "org.freedesktop.DBus.Error.Timeout";
    pub const NO_NETWORK: &str = "org.freedesktop.DBus.Error.NoNetwork";
    pub const ADDRESS_IN_USE: &str = "org.freedesktop.DBus.Error.AddressInUse";
    pub const DISCONNECTED: &str = "org.freedesktop.DBus.Error.Disconnected";
    pub const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
    pub const FILE_NOT_FOUND: &str = "org.freedesktop.DBus.Error.FileNotFound";
    pub const FILE_EXISTS: &str = "org.freedesktop.DBus.Error.FileExists";
    pub const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const TIMED_OUT: &str = "org.freedesktop.DBus.Error.TimedOut";
    pub const MATCH_RULE_NOT_FOUND: &str = "org.freedesktop.DBus.Error.MatchRuleNotFound";
    pub const MATCH_RULE_INVALID: &str = "org.freedesktop.DBus.Error.MatchRuleInvalid";
    pub const SPAWN_EXEC_FAILED: &str = "org.freedesktop.DBus.Error.Spawn.ExecFailed";
    pub const SPAWN_FORK_FAILED: &str = "org.freedesktop.DBus.Error.Spawn.ForkFailed";
    pub const SPAWN_CHILD_EXITED: &str = "org.freedesktop.DBus.Error.Spawn.ChildExited";
    pub const SPAWN_CHILD_SIGNALED: &str = "org.freedesktop.DBus.Error.Spawn.ChildSignaled";
    pub const SPAWN_FAILED: &str = "org.freedesktop.DBus.Error.Spawn.Failed";
    pub const SPAWN_SETUP_FAILED: &str = "org.freedesktop.DBus.Error.Spawn.FailedToSetup";
    pub const SPAWN_CONFIG_INVALID: &str = "org.freedesktop.DBus.Error.Spawn.ConfigInvalid";
    pub const SPAWN_SERVICE_INVALID: &str = "org.freedesktop.DBus.Error.Spawn.ServiceNotValid";
    pub const SPAWN_SERVICE_NOT_FOUND: &str = "org.freedesktop.DBus.Error.Spawn.ServiceNotFound";
    pub const SPAWN_PERMISSIONS_INVALID: &str =
        "org.freedesktop.DBus.Error.Spawn.PermissionsInvalid";
    pub const SPAWN_FILE_INVALID: &str = "org.freedesktop.DBus.Error.Spawn.FileInvalid";
    pub const SPAWN_NO_MEMORY: &str = "org.freedesktop.DBus.Error.Spawn.NoMemory";
    pub const UNIX_PROCESS_ID_UNKNOWN: &str = "org.freedesktop.DBus.Error.UnixProcessIdUnknown";
    pub const INVALID_SIGNATURE: &str = "org.freedesktop.DBus.Error.InvalidSignature";
    pub const INVALID_FILE_CONTENT: &str = "org.freedesktop.DBus.Error.InvalidFileContent";
    pub const SELINUX_SECURITY_CONTEXT_UNKNOWN: &str =
        "org.freedesktop.DBus.Error.SELinuxSecurityContextUnknown";
    pub const ADT_AUDIT_DATA_UNKNOWN: &str = "org.freedesktop.DBus.Error.AdtAuditDataUnknown";
    pub const OBJECT_PATH_IN_USE: &str = "org.freedesktop.DBus.Error.ObjectPathInUse";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_codes_roundtrip() {
        for bus in Bus::ALL {
            assert_eq!(Bus::from_code(bus.code()), Ok(bus));
        }
        assert_eq!(
            Bus::from_code(7),
            Err(UnknownCode {
                kind: "bus",
                code: 7
            })
        );
    }

    #[test]
    fn message_type_defaults_to_invalid() {
        assert_eq!(MessageType::default(), MessageType::Invalid);
        assert_eq!(MessageType::Signal.code(), 4);
        assert_eq!(MessageType::from_code(2), Ok(MessageType::MethodReturn));
        assert!(MessageType::from_code(5).is_err());
    }

    #[test]
    fn only_method_types_expect_reply() {
        assert!(MessageType::MethodCall.expects_reply());
        assert!(MessageType::MethodReturn.expects_reply());
        assert!(!MessageType::Signal.expects_reply());
        assert!(!MessageType::Invalid.expects_reply());
    }

    #[test]
    fn bus_serializes_snake_case() {
        let json = serde_json::to_string(&Bus::Session).unwrap();
        assert_eq!(json, "\"session\"");
        let policy: VariantPolicy = serde_json::from_str("\"simple\"").unwrap();
        assert_eq!(policy, VariantPolicy::Simple);
    }

    #[test]
    fn unknown_code_message() {
        let err = VariantPolicy::from_code(3).unwrap_err();
        assert_eq!(err.to_string(), "unknown variant policy code: 3");
    }
}
