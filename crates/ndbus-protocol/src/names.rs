//! Validation of D-Bus object paths, interface, member and bus names.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::NameError;

/// Longest name the bus accepts, for every kind except object paths.
pub const MAX_NAME_LENGTH: usize = 255;

static OBJECT_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/|(/[A-Za-z0-9_]+)+)$").expect("Invalid object path regex"));

static INTERFACE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$")
        .expect("Invalid interface regex")
});

static MEMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid member regex"));

static UNIQUE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)+$").expect("Invalid unique name regex")
});

static WELL_KNOWN_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_-][A-Za-z0-9_-]*(\.[A-Za-z_-][A-Za-z0-9_-]*)+$")
        .expect("Invalid bus name regex")
});

/// The kind of name being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    ObjectPath,
    Interface,
    Member,
    BusName,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ObjectPath => "object path",
            Self::Interface => "interface name",
            Self::Member => "member name",
            Self::BusName => "bus name",
        })
    }
}

impl NameKind {
    /// Checks `name` against the rules for this kind.
    pub fn validate(self, name: &str) -> Result<(), NameError> {
        let valid = match self {
            Self::ObjectPath => OBJECT_PATH_REGEX.is_match(name),
            Self::Interface => name.len() <= MAX_NAME_LENGTH && INTERFACE_REGEX.is_match(name),
            Self::Member => name.len() <= MAX_NAME_LENGTH && MEMBER_REGEX.is_match(name),
            Self::BusName => {
                name.len() <= MAX_NAME_LENGTH
                    && (UNIQUE_NAME_REGEX.is_match(name) || WELL_KNOWN_NAME_REGEX.is_match(name))
            }
        };
        if valid {
            Ok(())
        } else {
            Err(NameError {
                kind: self,
                name: name.to_string(),
            })
        }
    }
}

pub fn validate_object_path(path: &str) -> Result<(), NameError> {
    NameKind::ObjectPath.validate(path)
}

pub fn validate_interface(iface: &str) -> Result<(), NameError> {
    NameKind::Interface.validate(iface)
}

pub fn validate_member(member: &str) -> Result<(), NameError> {
    NameKind::Member.validate(member)
}

/// Accepts both unique (`:1.42`) and well-known (`org.example.App`) names.
pub fn validate_bus_name(name: &str) -> Result<(), NameError> {
    NameKind::BusName.validate(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths() {
        assert!(validate_object_path("/").is_ok());
        assert!(validate_object_path("/org/freedesktop/DBus").is_ok());
        assert!(validate_object_path("/org/ndbus/signal_test2").is_ok());
        assert!(validate_object_path("").is_err());
        assert!(validate_object_path("org/freedesktop").is_err());
        assert!(validate_object_path("/org/").is_err());
        assert!(validate_object_path("/org//x").is_err());
        assert!(validate_object_path("/org/a-b").is_err());
    }

    #[test]
    fn interfaces_need_two_elements() {
        assert!(validate_interface("org.freedesktop.DBus").is_ok());
        assert!(validate_interface("org").is_err());
        assert!(validate_interface("org.1abc").is_err());
        assert!(validate_interface(&format!("a.{}", "b".repeat(300))).is_err());
    }

    #[test]
    fn members() {
        assert!(validate_member("GetNameOwner").is_ok());
        assert!(validate_member("_private").is_ok());
        assert!(validate_member("Get.Name").is_err());
        assert!(validate_member("9lives").is_err());
    }

    #[test]
    fn bus_names() {
        assert!(validate_bus_name("org.freedesktop.DBus").is_ok());
        assert!(validate_bus_name(":1.42").is_ok());
        assert!(validate_bus_name("com.example-app.Service").is_ok());
        assert!(validate_bus_name("nodots").is_err());
        assert!(validate_bus_name(":1").is_err());
    }

    #[test]
    fn error_message_names_kind() {
        let err = validate_member("no-dash").unwrap_err();
        assert_eq!(err.to_string(), "invalid member name: \"no-dash\"");
    }
}
