//! Per-bus connection lifecycle.
//!
//! Buses connect lazily the first time a message uses them and stay up
//! until closed or until the bus reports the local `Disconnected` signal.

use std::collections::BTreeMap;

use ndbus_core::Bus;
use tracing::{debug, info};

use crate::address::BusAddress;
use crate::error::BusResult;
use crate::transport::{DispatchHandle, Transport};

/// Live connections, owned by the core loop.
#[derive(Debug, Default)]
pub(crate) struct ConnectionTable {
    connected: BTreeMap<Bus, Option<BusAddress>>,
}

impl ConnectionTable {
    /// Connects `bus` unless it already is.
    pub fn ensure(
        &mut self,
        bus: Bus,
        address: Option<&str>,
        transport: &mut dyn Transport,
        dispatch: DispatchHandle,
    ) -> BusResult<()> {
        if self.connected.contains_key(&bus) {
            return Ok(());
        }

        let address = address.map(BusAddress::parse).transpose()?;
        debug!(%bus, address = ?address.as_ref().map(BusAddress::as_str), "Connecting");
        transport.init(bus, address.as_ref(), dispatch)?;
        info!(%bus, "Bus connected");
        self.connected.insert(bus, address);
        Ok(())
    }

    /// Tears `bus` down. Returns false if it was not connected.
    pub fn close(&mut self, bus: Bus, transport: &mut dyn Transport) -> bool {
        if self.connected.remove(&bus).is_none() {
            return false;
        }
        transport.deinit(bus);
        info!(%bus, "Bus connection closed");
        true
    }

    /// Tears down every connection.
    pub fn close_all(&mut self, transport: &mut dyn Transport) {
        let buses: Vec<_> = self.connected.keys().copied().collect();
        for bus in buses {
            self.close(bus, transport);
        }
    }

    pub fn is_connected(&self, bus: Bus) -> bool {
        self.connected.contains_key(&bus)
    }

    pub fn buses(&self) -> Vec<Bus> {
        self.connected.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use ndbus_core::error_names;
    use tokio::sync::mpsc;

    use super::*;
    use crate::loopback::{BoundaryCall, LoopbackTransport};

    fn dispatch() -> (DispatchHandle, mpsc::UnboundedSender<crate::router::Op>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        (DispatchHandle::new(tx.downgrade()), tx)
    }

    #[test]
    fn connects_once_and_closes() {
        let mut loopback = LoopbackTransport::new();
        let mut table = ConnectionTable::default();
        let (handle, _keep) = dispatch();

        table
            .ensure(Bus::Session, Some("unix:path=/tmp/bus"), &mut loopback, handle.clone())
            .unwrap();
        table.ensure(Bus::Session, None, &mut loopback, handle).unwrap();
        assert_eq!(table.buses(), vec![Bus::Session]);

        assert!(table.close(Bus::Session, &mut loopback));
        assert!(!table.close(Bus::Session, &mut loopback));
        assert_eq!(
            loopback.calls(),
            vec![
                BoundaryCall::Init {
                    bus: Bus::Session,
                    address: Some("unix:path=/tmp/bus".into())
                },
                BoundaryCall::Deinit { bus: Bus::Session },
            ]
        );
    }

    #[test]
    fn bad_address_never_reaches_transport() {
        let mut loopback = LoopbackTransport::new();
        let mut table = ConnectionTable::default();
        let (handle, _keep) = dispatch();

        let err = table
            .ensure(Bus::System, Some("no-colon"), &mut loopback, handle)
            .unwrap_err();
        assert_eq!(err.name(), error_names::BAD_ADDRESS);
        assert!(loopback.calls().is_empty());
        assert!(!table.is_connected(Bus::System));
    }

    #[test]
    fn close_all_tears_everything_down() {
        let mut loopback = LoopbackTransport::new();
        let mut table = ConnectionTable::default();
        let (handle, _keep) = dispatch();
        for bus in Bus::ALL {
            table.ensure(bus, None, &mut loopback, handle.clone()).unwrap();
        }
        table.close_all(&mut loopback);
        assert!(table.buses().is_empty());
        assert!(Bus::ALL.iter().all(|bus| !loopback.is_connected(*bus)));
    }
}
