//! Facade registry.
//!
//! One [`FacadeRegistry`] is built at startup and shared by `Arc`. It hands
//! out exactly one instance per facade kind, constructing each lazily on
//! first access. Construction binds the host subsystem through the
//! [`HostProvider`]; if that fails the error goes to the caller and the slot
//! stays empty, so a later call tries again.

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::facade::battery::BatteryFacade;
use crate::facade::data::{DataChannelFacade, NotificationFilter};
use crate::facade::device::DeviceInfo;
use crate::facade::location::{LocationFacade, LocationSource};
use crate::facade::network::NetworkFacade;
use crate::facade::sensor::{SensorFacade, SensorKind};
use crate::facade::speech::SpeechFacade;
use crate::facade::{Facade, FacadeKind};
use crate::platform::HostProvider;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Lazily built, exactly-once facade slot.
struct Slot<T> {
    cell: OnceLock<Arc<T>>,
    init: Mutex<()>,
}

impl<T> Slot<T> {
    const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    fn get(&self) -> Option<Arc<T>> {
        self.cell.get().cloned()
    }

    fn get_or_try_init<F>(&self, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(existing) = self.cell.get() {
            return Ok(Arc::clone(existing));
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = self.cell.get() {
            return Ok(Arc::clone(existing));
        }
        let built = Arc::new(build()?);
        let _ = self.cell.set(Arc::clone(&built));
        Ok(built)
    }
}

/// A constructed facade of any kind.
#[derive(Clone)]
pub enum FacadeHandle {
    Sensor(Arc<SensorFacade>),
    Location(Arc<LocationFacade>),
    Battery(Arc<BatteryFacade>),
    Network(Arc<NetworkFacade>),
    Speech(Arc<SpeechFacade>),
    DataChannel(Arc<DataChannelFacade>),
}

impl FacadeHandle {
    #[must_use]
    pub fn kind(&self) -> FacadeKind {
        self.as_facade().kind()
    }

    /// The lifecycle surface shared by every facade.
    #[must_use]
    pub fn as_facade(&self) -> &dyn Facade {
        match self {
            Self::Sensor(f) => f.as_ref(),
            Self::Location(f) => f.as_ref(),
            Self::Battery(f) => f.as_ref(),
            Self::Network(f) => f.as_ref(),
            Self::Speech(f) => f.as_ref(),
            Self::DataChannel(f) => f.as_ref(),
        }
    }
}

/// Process-wide access point for facades.
pub struct FacadeRegistry {
    provider: Arc<dyn HostProvider>,
    sensors_enabled: Vec<SensorKind>,
    location_sources: Vec<LocationSource>,
    speech_max_chars: usize,
    data_filter: NotificationFilter,
    sensor: Slot<SensorFacade>,
    location: Slot<LocationFacade>,
    battery: Slot<BatteryFacade>,
    network: Slot<NetworkFacade>,
    speech: Slot<SpeechFacade>,
    data: Slot<DataChannelFacade>,
    device: Slot<DeviceInfo>,
}

impl FacadeRegistry {
    /// Registry with default facade settings.
    pub fn new(provider: Arc<dyn HostProvider>) -> Self {
        Self::with_config(provider, &BridgeConfig::default())
    }

    pub fn with_config(provider: Arc<dyn HostProvider>, config: &BridgeConfig) -> Self {
        Self {
            provider,
            sensors_enabled: config.sensors.enabled.clone(),
            location_sources: config.location.sources(),
            speech_max_chars: config.speech.max_message_chars,
            data_filter: config.data_channel.filter(),
            sensor: Slot::new(),
            location: Slot::new(),
            battery: Slot::new(),
            network: Slot::new(),
            speech: Slot::new(),
            data: Slot::new(),
            device: Slot::new(),
        }
    }

    /// The facade for `kind`, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::HostSubsystemUnavailable`] if the host
    /// subsystem could not be bound.
    pub fn get(&self, kind: FacadeKind) -> Result<FacadeHandle> {
        Ok(match kind {
            FacadeKind::Sensor => FacadeHandle::Sensor(self.sensor()?),
            FacadeKind::Location => FacadeHandle::Location(self.location()?),
            FacadeKind::Battery => FacadeHandle::Battery(self.battery()?),
            FacadeKind::Network => FacadeHandle::Network(self.network()?),
            FacadeKind::Speech => FacadeHandle::Speech(self.speech()?),
            FacadeKind::DataChannel => FacadeHandle::DataChannel(self.data_channel()?),
        })
    }

    pub fn sensor(&self) -> Result<Arc<SensorFacade>> {
        self.sensor.get_or_try_init(|| {
            let host = self.provider.sensors()?;
            tracing::debug!("sensor facade constructed");
            Ok(SensorFacade::new(host, self.sensors_enabled.clone()))
        })
    }

    pub fn location(&self) -> Result<Arc<LocationFacade>> {
        self.location.get_or_try_init(|| {
            let host = self.provider.location()?;
            tracing::debug!("location facade constructed");
            Ok(LocationFacade::new(host, self.location_sources.clone()))
        })
    }

    pub fn battery(&self) -> Result<Arc<BatteryFacade>> {
        self.battery.get_or_try_init(|| {
            let host = self.provider.battery()?;
            tracing::debug!("battery facade constructed");
            Ok(BatteryFacade::new(host))
        })
    }

    pub fn network(&self) -> Result<Arc<NetworkFacade>> {
        self.network.get_or_try_init(|| {
            let host = self.provider.network()?;
            tracing::debug!("network facade constructed");
            Ok(NetworkFacade::new(host))
        })
    }

    pub fn speech(&self) -> Result<Arc<SpeechFacade>> {
        self.speech.get_or_try_init(|| {
            let host = self.provider.speech()?;
            tracing::debug!("speech facade constructed");
            Ok(SpeechFacade::new(host, self.speech_max_chars))
        })
    }

    pub fn data_channel(&self) -> Result<Arc<DataChannelFacade>> {
        self.data.get_or_try_init(|| {
            let host = self.provider.broadcasts()?;
            tracing::debug!("data channel facade constructed");
            Ok(DataChannelFacade::new(host, self.data_filter.clone()))
        })
    }

    /// Device settings queries. Not a facade kind; never listed by
    /// [`constructed`](Self::constructed).
    pub fn device(&self) -> Result<Arc<DeviceInfo>> {
        self.device.get_or_try_init(|| {
            let host = self.provider.device()?;
            tracing::debug!("device info constructed");
            Ok(DeviceInfo::new(host))
        })
    }

    /// Facades constructed so far. Never constructs.
    #[must_use]
    pub fn constructed(&self) -> Vec<FacadeHandle> {
        let mut out = Vec::new();
        if let Some(f) = self.sensor.get() {
            out.push(FacadeHandle::Sensor(f));
        }
        if let Some(f) = self.location.get() {
            out.push(FacadeHandle::Location(f));
        }
        if let Some(f) = self.battery.get() {
            out.push(FacadeHandle::Battery(f));
        }
        if let Some(f) = self.network.get() {
            out.push(FacadeHandle::Network(f));
        }
        if let Some(f) = self.speech.get() {
            out.push(FacadeHandle::Speech(f));
        }
        if let Some(f) = self.data.get() {
            out.push(FacadeHandle::DataChannel(f));
        }
        out
    }

    /// Stops every started facade. Used at shutdown; errors are logged.
    pub fn stop_all(&self) {
        for handle in self.constructed() {
            let facade = handle.as_facade();
            let single_kinds = match &handle {
                FacadeHandle::Sensor(sensors) => !sensors.active_sensors().is_empty(),
                _ => false,
            };
            if !facade.is_started() && !single_kinds {
                continue;
            }
            if let Err(e) = facade.stop() {
                tracing::warn!(facade = %facade.kind(), error = %e, "facade stop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::platform::sim::SimHost;

    #[test]
    fn same_instance_on_every_access() {
        let host = Arc::new(SimHost::new());
        let registry = FacadeRegistry::new(host.clone());
        let a = registry.battery().unwrap();
        let b = registry.battery().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(host.bindings(FacadeKind::Battery), 1);
    }

    #[test]
    fn failed_construction_is_retried() {
        let host = Arc::new(SimHost::new());
        host.set_unavailable(FacadeKind::Network, true);
        let registry = FacadeRegistry::new(host.clone());

        let err = registry.get(FacadeKind::Network).err().unwrap();
        assert_eq!(err.kind_label(), "host_subsystem_unavailable");
        assert!(registry.constructed().is_empty());

        host.set_unavailable(FacadeKind::Network, false);
        let handle = registry.get(FacadeKind::Network).unwrap();
        assert_eq!(handle.kind(), FacadeKind::Network);
        assert_eq!(host.bindings(FacadeKind::Network), 1);
    }

    #[test]
    fn constructed_does_not_construct() {
        let host = Arc::new(SimHost::new());
        let registry = FacadeRegistry::new(host.clone());
        assert!(registry.constructed().is_empty());
        registry.speech().unwrap();
        let kinds: Vec<_> = registry.constructed().iter().map(FacadeHandle::kind).collect();
        assert_eq!(kinds, vec![FacadeKind::Speech]);
    }

    #[test]
    fn stop_all_skips_unstarted_data_channel() {
        let host = Arc::new(SimHost::new());
        let registry = FacadeRegistry::new(host.clone());
        registry.data_channel().unwrap();
        registry.battery().unwrap().start().unwrap();
        assert_eq!(host.active_subscriptions(), 1);

        registry.stop_all();
        assert_eq!(host.active_subscriptions(), 0);
    }

    #[test]
    fn stop_all_releases_single_sensor_registrations() {
        let host = Arc::new(SimHost::new());
        let registry = FacadeRegistry::new(host.clone());
        let sensors = registry.sensor().unwrap();
        sensors.start_sensor(SensorKind::Light).unwrap();
        assert!(!sensors.is_started());
        assert_eq!(host.active_subscriptions(), 1);

        registry.stop_all();
        assert_eq!(host.active_subscriptions(), 0);
    }
}
