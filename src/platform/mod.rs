//! Host platform abstractions.
//!
//! Each host subsystem the bridge wraps is a trait. A [`HostProvider`] binds
//! the handles; facades only ever talk to the host through these traits, so
//! the real device glue and the in-memory [`sim::SimHost`] are
//! interchangeable.
//!
//! Push notifications arrive on host-owned delivery threads through
//! [`UpdateSink`] / [`NotificationSink`]. Implementations must not hold their
//! own locks while invoking a sink.

use crate::error::Result;
use crate::facade::battery::{BatterySource, BatteryStatus};
use crate::facade::data::NotificationFilter;
use crate::facade::location::{Address, LocationFix, LocationSource};
use crate::facade::device::{DisplayInfo, ModeSettings, VolumeInfo};
use crate::facade::network::{
    BluetoothDevice, BluetoothInfo, CellInfo, NetworkReading, NetworkSource, PhoneInfo, SimInfo,
    WifiScanResult,
};
use crate::facade::sensor::{SensorInfo, SensorKind, SensorReading};
use crate::facade::speech::{SpeechSource, SpeechStatus};
use std::sync::Arc;

pub mod sim;

/// Opaque handle for one host listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback surface invoked by a host delivery thread with a new reading.
pub trait UpdateSink<S, R>: Send + Sync {
    fn on_update(&self, source: S, reading: R);
}

/// Callback surface for inbound structured notifications (URIs).
pub trait NotificationSink: Send + Sync {
    fn on_notification(&self, uri: &str);
}

pub type SensorSink = Arc<dyn UpdateSink<SensorKind, SensorReading>>;
pub type LocationSink = Arc<dyn UpdateSink<LocationSource, LocationFix>>;
pub type BatterySink = Arc<dyn UpdateSink<BatterySource, BatteryStatus>>;
pub type NetworkSink = Arc<dyn UpdateSink<NetworkSource, NetworkReading>>;
pub type SpeechSink = Arc<dyn UpdateSink<SpeechSource, SpeechStatus>>;

/// Motion and environment sensors.
pub trait SensorHost: Send + Sync {
    /// Descriptions of every sensor the device exposes.
    fn sensor_list(&self) -> Vec<SensorInfo>;

    /// Returns `true` if the device has a default sensor of this kind.
    fn is_available(&self, kind: SensorKind) -> bool;

    fn subscribe(&self, kind: SensorKind, sink: SensorSink) -> Result<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Satellite, network and fused location providers.
pub trait LocationHost: Send + Sync {
    fn subscribe(&self, source: LocationSource, sink: LocationSink) -> Result<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId);

    /// The provider's own last-known fix. This is a host round-trip.
    fn last_known(&self, source: LocationSource) -> Result<Option<LocationFix>>;

    /// Reverse geocoding; may be unsupported, in which case it returns an
    /// empty list.
    fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
        max_results: usize,
    ) -> Result<Vec<Address>>;
}

/// Battery state change broadcasts.
pub trait BatteryHost: Send + Sync {
    fn subscribe(&self, sink: BatterySink) -> Result<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Wi-Fi, cellular and Bluetooth radios.
pub trait NetworkHost: Send + Sync {
    fn subscribe(&self, source: NetworkSource, sink: NetworkSink) -> Result<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId);

    /// Blocks until the scan completes.
    fn wifi_scan(&self) -> Result<Vec<WifiScanResult>>;

    fn cell_info(&self) -> Result<CellInfo>;

    fn sim_info(&self) -> Result<SimInfo>;

    fn phone_info(&self) -> Result<PhoneInfo>;

    fn bluetooth_info(&self) -> Result<BluetoothInfo>;

    /// Blocks until discovery completes.
    fn bluetooth_scan(&self) -> Result<Vec<BluetoothDevice>>;
}

/// Device settings.
pub trait DeviceHost: Send + Sync {
    fn mode_settings(&self) -> Result<ModeSettings>;

    fn display(&self) -> Result<DisplayInfo>;

    fn volume(&self) -> Result<VolumeInfo>;
}

/// Text-to-speech engine.
///
/// `open` returns immediately; the engine reports readiness later through
/// the sink with [`SpeechStatus::ready`] set. The engine serializes queued
/// utterances itself.
pub trait SpeechHost: Send + Sync {
    fn open(&self, sink: SpeechSink) -> Result<()>;

    fn speak(&self, text: &str, utterance_id: &str) -> Result<()>;

    fn is_speaking(&self) -> bool;

    /// Whether any app is playing media audio. Independent of the engine.
    fn is_media_playing(&self) -> bool;

    fn shutdown(&self);
}

/// Inbound structured notifications (URI broadcasts from other apps).
pub trait BroadcastHost: Send + Sync {
    fn subscribe(
        &self,
        filter: &NotificationFilter,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<SubscriptionId>;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Identifier of one visible transient notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeId(pub u64);

/// UI-owned transient notice primitive.
///
/// Only ever driven from the UI-owning thread.
pub trait NoticeSurface: Send {
    fn show(&mut self, text: &str) -> NoticeId;

    fn cancel(&mut self, id: NoticeId);

    /// Blocking yes/no question to the user.
    fn ask(&mut self, text: &str) -> bool;
}

/// Binds host subsystem handles.
///
/// Each call binds a fresh handle; the registry calls each accessor at most
/// once per facade kind. A subsystem that cannot be obtained returns
/// [`crate::BridgeError::HostSubsystemUnavailable`].
pub trait HostProvider: Send + Sync {
    fn sensors(&self) -> Result<Arc<dyn SensorHost>>;

    fn location(&self) -> Result<Arc<dyn LocationHost>>;

    fn battery(&self) -> Result<Arc<dyn BatteryHost>>;

    fn network(&self) -> Result<Arc<dyn NetworkHost>>;

    fn speech(&self) -> Result<Arc<dyn SpeechHost>>;

    fn broadcasts(&self) -> Result<Arc<dyn BroadcastHost>>;

    fn device(&self) -> Result<Arc<dyn DeviceHost>>;

    /// The surface the UI thread draws notices on, if a UI is attached.
    fn notice_surface(&self) -> Option<Box<dyn NoticeSurface>> {
        None
    }
}
