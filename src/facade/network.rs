//! Wi-Fi, cellular and Bluetooth radios.
//!
//! Connectivity changes are pushed and cached per source like any other
//! facade. The scan and telephony queries are host round-trips answered on
//! the calling thread; they work whether or not the facade is started.

use super::{Facade, FacadeKind, Listeners};
use crate::error::{BridgeError, Result};
use crate::platform::{NetworkHost, NetworkSink, UpdateSink};
use crate::reading::{CacheKey, ReadingCache, Stamped};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkSource {
    Wifi,
    Cellular,
}

impl NetworkSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "wifi" | "wi-fi" => Some(Self::Wifi),
            "cellular" | "cell" | "mobile" => Some(Self::Cellular),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CacheKey for NetworkSource {
    fn all() -> &'static [Self] {
        &[Self::Wifi, Self::Cellular]
    }
}

/// Wi-Fi connection state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WifiInfo {
    pub enabled: bool,
    pub connected: bool,
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    /// Received signal strength in dBm.
    pub rssi_dbm: i32,
    /// Link speed in Mbps.
    pub link_speed_mbps: u32,
    /// Channel frequency in MHz.
    pub frequency_mhz: u32,
}

/// Cellular connection state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellularInfo {
    /// MCC+MNC, e.g. `310260`.
    pub network_operator: Option<String>,
    pub network_operator_name: Option<String>,
    /// e.g. `lte`, `edge`, `unknown`.
    pub network_type: String,
    pub roaming: bool,
    /// Signal strength in dBm.
    pub signal_dbm: i32,
}

/// One access point seen by a Wi-Fi scan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WifiScanResult {
    pub ssid: String,
    pub bssid: String,
    pub frequency_mhz: u32,
    /// Received signal strength in dBm.
    pub level_dbm: i32,
    /// Security features as the host reports them, e.g. `[WPA2-PSK-CCMP][ESS]`.
    pub capabilities: String,
}

/// A neighbouring cell observed by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighborCell {
    pub cid: i32,
    /// Host-reported signal level (ASU).
    pub rssi: i32,
}

/// Serving cell and neighbours.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellInfo {
    /// Location area code of the serving cell.
    pub lac: Option<i32>,
    pub cid: Option<i32>,
    pub neighbors: Vec<NeighborCell>,
}

/// Subscriber identity module state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimInfo {
    /// MCC+MNC of the SIM provider.
    pub operator: Option<String>,
    pub operator_name: Option<String>,
    /// ISO country code, lower case.
    pub country_code: Option<String>,
    /// e.g. `ready`, `absent`, `pin_required`.
    pub state: String,
}

/// Telephony state of the handset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhoneInfo {
    /// `idle`, `ringing` or `offhook`; empty without a SIM.
    pub call_state: String,
    pub incoming_number: Option<String>,
    /// e.g. `gsm`, `cdma`, `none`.
    pub phone_type: String,
    pub network_type: String,
}

/// Local Bluetooth adapter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BluetoothInfo {
    pub enabled: bool,
    /// Host scan mode constant (connectable/discoverable flags).
    pub scan_mode: i32,
    pub local_name: Option<String>,
}

/// A device found by Bluetooth discovery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BluetoothDevice {
    pub address: String,
    pub name: Option<String>,
    pub rssi_dbm: Option<i32>,
}

/// A reading from either network source.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkReading {
    Wifi(WifiInfo),
    Cellular(CellularInfo),
}

/// Facade over connectivity broadcasts.
pub struct NetworkFacade {
    host: Arc<dyn NetworkHost>,
    cache: Arc<ReadingCache<NetworkSource, NetworkReading>>,
    listeners: Listeners,
}

impl NetworkFacade {
    pub fn new(host: Arc<dyn NetworkHost>) -> Self {
        Self {
            host,
            cache: Arc::new(ReadingCache::new()),
            listeners: Listeners::default(),
        }
    }

    pub fn poll(&self, source: NetworkSource) -> Option<Arc<Stamped<NetworkReading>>> {
        self.cache.poll(source)
    }

    pub fn on_update(&self, source: NetworkSource, reading: NetworkReading) {
        self.cache.on_update(source, reading);
    }

    /// Runs a Wi-Fi scan and returns the access points found.
    pub fn wifi_scan(&self) -> Result<Vec<WifiScanResult>> {
        let found = self.host.wifi_scan()?;
        tracing::debug!(count = found.len(), "wifi scan finished");
        Ok(found)
    }

    pub fn cell_info(&self) -> Result<CellInfo> {
        self.host.cell_info()
    }

    pub fn sim_info(&self) -> Result<SimInfo> {
        self.host.sim_info()
    }

    pub fn phone_info(&self) -> Result<PhoneInfo> {
        self.host.phone_info()
    }

    pub fn bluetooth_info(&self) -> Result<BluetoothInfo> {
        self.host.bluetooth_info()
    }

    /// Runs Bluetooth discovery. Fails with `InvalidState` while the adapter
    /// is off.
    pub fn bluetooth_scan(&self) -> Result<Vec<BluetoothDevice>> {
        if !self.host.bluetooth_info()?.enabled {
            return Err(BridgeError::InvalidState("bluetooth is off".to_owned()));
        }
        let found = self.host.bluetooth_scan()?;
        tracing::debug!(count = found.len(), "bluetooth discovery finished");
        Ok(found)
    }
}

impl Facade for NetworkFacade {
    fn kind(&self) -> FacadeKind {
        FacadeKind::Network
    }

    fn start(&self) -> Result<()> {
        let started = self.listeners.start_with(|| {
            let mut ids = Vec::new();
            for source in NetworkSource::all() {
                let sink = Arc::clone(&self.cache) as NetworkSink;
                match self.host.subscribe(*source, sink) {
                    Ok(id) => ids.push(id),
                    Err(e) => {
                        for id in ids {
                            self.host.unsubscribe(id);
                        }
                        return Err(e);
                    }
                }
            }
            Ok(ids)
        })?;
        if started {
            tracing::info!("network facade started");
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if self.listeners.stop_with(|ids| {
            for id in ids {
                self.host.unsubscribe(id);
            }
        }) {
            tracing::info!("network facade stopped");
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.listeners.is_active()
    }
}
