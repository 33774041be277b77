//! Battery status.

use super::{Facade, FacadeKind, Listeners};
use crate::error::Result;
use crate::platform::{BatteryHost, BatterySink, UpdateSink};
use crate::reading::{CacheKey, ReadingCache, Stamped};
use std::sync::Arc;

/// The battery has a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatterySource {
    Battery,
}

impl CacheKey for BatterySource {
    fn all() -> &'static [Self] {
        &[Self::Battery]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChargeState {
    #[default]
    Unknown,
    Charging,
    Discharging,
    NotCharging,
    Full,
}

impl ChargeState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Charging => "charging",
            Self::Discharging => "discharging",
            Self::NotCharging => "not_charging",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerSource {
    #[default]
    Unplugged,
    Ac,
    Usb,
    Wireless,
}

impl PowerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unplugged => "unplugged",
            Self::Ac => "ac",
            Self::Usb => "usb",
            Self::Wireless => "wireless",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryHealth {
    #[default]
    Unknown,
    Good,
    Overheat,
    Dead,
    OverVoltage,
    Cold,
    Failure,
}

impl BatteryHealth {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Good => "good",
            Self::Overheat => "overheat",
            Self::Dead => "dead",
            Self::OverVoltage => "over_voltage",
            Self::Cold => "cold",
            Self::Failure => "failure",
        }
    }
}

/// Battery state snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatteryStatus {
    /// Charge level, 0–100.
    pub level_pct: u8,
    pub charge: ChargeState,
    pub plugged: PowerSource,
    pub health: BatteryHealth,
    /// Tenths of a degree Celsius.
    pub temperature_dc: i32,
    /// Millivolts.
    pub voltage_mv: u32,
    pub present: bool,
    /// Cell chemistry, e.g. `Li-ion`.
    pub technology: String,
}

/// Facade over battery broadcasts.
pub struct BatteryFacade {
    host: Arc<dyn BatteryHost>,
    cache: Arc<ReadingCache<BatterySource, BatteryStatus>>,
    listeners: Listeners,
}

impl BatteryFacade {
    pub fn new(host: Arc<dyn BatteryHost>) -> Self {
        Self {
            host,
            cache: Arc::new(ReadingCache::new()),
            listeners: Listeners::default(),
        }
    }

    pub fn poll(&self) -> Option<Arc<Stamped<BatteryStatus>>> {
        self.cache.poll(BatterySource::Battery)
    }

    pub fn on_update(&self, source: BatterySource, status: BatteryStatus) {
        self.cache.on_update(source, status);
    }
}

impl Facade for BatteryFacade {
    fn kind(&self) -> FacadeKind {
        FacadeKind::Battery
    }

    fn start(&self) -> Result<()> {
        let sink = Arc::clone(&self.cache) as BatterySink;
        if self
            .listeners
            .start_with(|| Ok(vec![self.host.subscribe(sink)?]))?
        {
            tracing::info!("battery facade started");
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if self.listeners.stop_with(|ids| {
            for id in ids {
                self.host.unsubscribe(id);
            }
        }) {
            tracing::info!("battery facade stopped");
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.listeners.is_active()
    }
}
