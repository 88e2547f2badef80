//! Bus address strings.
//!
//! An address is a `;` separated list of transports, each
//! `transport:key=value,key=value` with percent-encoded values, e.g.
//! `unix:path=/run/user/1000/bus;tcp:host=localhost,port=12345`.

use std::collections::BTreeMap;
use std::fmt;

use ndbus_core::error_names;

use crate::error::{BusError, BusResult};

/// One transport entry of a bus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub transport: String,
    pub params: BTreeMap<String, String>,
}

impl AddressEntry {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// A parsed bus address, tried entry by entry by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusAddress {
    raw: String,
    entries: Vec<AddressEntry>,
}

impl BusAddress {
    /// Parses and percent-decodes an address string.
    pub fn parse(raw: &str) -> BusResult<Self> {
        let mut entries = Vec::new();
        for part in raw.split(';').filter(|p| !p.is_empty()) {
            let (transport, rest) = part
                .split_once(':')
                .ok_or_else(|| bad_address(raw, "missing transport name"))?;
            if transport.is_empty() {
                return Err(bad_address(raw, "empty transport name"));
            }

            let mut params = BTreeMap::new();
            for pair in rest.split(',').filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| bad_address(raw, format!("expected key=value, got {pair:?}")))?;
                let value = urlencoding::decode(value)
                    .map_err(|e| bad_address(raw, format!("bad escape in {key}: {e}")))?;
                if params.insert(key.to_string(), value.into_owned()).is_some() {
                    return Err(bad_address(raw, format!("duplicate key {key:?}")));
                }
            }

            entries.push(AddressEntry {
                transport: transport.to_string(),
                params,
            });
        }

        if entries.is_empty() {
            return Err(bad_address(raw, "no transports"));
        }

        Ok(Self {
            raw: raw.to_string(),
            entries,
        })
    }

    pub fn entries(&self) -> &[AddressEntry] {
        &self.entries
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn bad_address(raw: &str, reason: impl fmt::Display) -> BusError {
    BusError::transport(error_names::BAD_ADDRESS, format!("{raw:?}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_entries() {
        let address =
            BusAddress::parse("unix:path=/run/user/1000/bus;tcp:host=localhost,port=12345").unwrap();
        assert_eq!(address.entries().len(), 2);
        assert_eq!(address.entries()[0].transport, "unix");
        assert_eq!(address.entries()[0].get("path"), Some("/run/user/1000/bus"));
        assert_eq!(address.entries()[1].get("port"), Some("12345"));
        assert_eq!(
            address.to_string(),
            "unix:path=/run/user/1000/bus;tcp:host=localhost,port=12345"
        );
    }

    #[test]
    fn percent_decodes_values() {
        let address = BusAddress::parse("unix:path=/tmp/my%20bus%3bsock").unwrap();
        assert_eq!(address.entries()[0].get("path"), Some("/tmp/my bus;sock"));
    }

    #[test]
    fn rejects_malformed() {
        assert!(BusAddress::parse("").is_err());
        assert!(BusAddress::parse("path=/x").is_err());
        assert!(BusAddress::parse(":path=/x").is_err());
        assert!(BusAddress::parse("unix:path").is_err());
        assert!(BusAddress::parse("unix:path=/a,path=/b").is_err());

        let err = BusAddress::parse("unix:path").unwrap_err();
        assert_eq!(err.name(), error_names::BAD_ADDRESS);
        insta::assert_snapshot!(err.to_string(), @r#"org.freedesktop.DBus.Error.BadAddress: "unix:path": expected key=value, got "path""#);
    }
}
