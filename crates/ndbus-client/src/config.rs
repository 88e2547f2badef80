//! Client configuration.

use std::collections::HashMap;
use std::time::Duration;

use ndbus_core::Bus;

/// Address of the system bus when `DBUS_SYSTEM_BUS_ADDRESS` is unset.
pub const DEFAULT_SYSTEM_BUS_ADDRESS: &str = "unix:path=/var/run/dbus/system_bus_socket";

/// Reply timeout used when a message keeps the transport default.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(25_000);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-bus address overrides. Buses without an entry use the
    /// transport's own discovery.
    pub addresses: HashMap<Bus, String>,

    /// Timeout applied to method calls whose timeout is `-1`.
    pub default_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addresses: HashMap::from([(Bus::System, DEFAULT_SYSTEM_BUS_ADDRESS.to_string())]),
            default_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Reads bus addresses from the standard `DBUS_*_ADDRESS` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        for bus in Bus::ALL {
            if let Some(address) = lookup(bus.address_env_var()).filter(|a| !a.is_empty()) {
                config.addresses.insert(bus, address);
            }
        }
        config
    }

    /// Builder: set the address of one bus.
    pub fn with_address(mut self, bus: Bus, address: impl Into<String>) -> Self {
        self.addresses.insert(bus, address.into());
        self
    }

    /// Builder: set the default reply timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The configured address of `bus`, if any.
    pub fn address(&self, bus: Bus) -> Option<&str> {
        self.addresses.get(&bus).map(String::as_str)
    }

    /// Resolves a message timeout in milliseconds, `-1` meaning the default.
    pub fn reply_timeout(&self, timeout_ms: i32) -> Duration {
        u64::try_from(timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }
}
