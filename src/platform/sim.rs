//! In-memory simulated device.
//!
//! [`SimHost`] implements every host trait against plain in-process state.
//! Readings and notifications are pushed by the caller from any thread and
//! delivered synchronously to the registered sinks on that thread, which is
//! how a host delivery thread behaves from the facade's point of view.

use super::{
    BatteryHost, BatterySink, BroadcastHost, DeviceHost, HostProvider, LocationHost, LocationSink,
    NetworkHost, NetworkSink, NoticeId, NoticeSurface, NotificationSink, SensorHost, SensorSink,
    SpeechHost, SpeechSink, SubscriptionId,
};
use crate::error::{BridgeError, Result};
use crate::facade::FacadeKind;
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
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sensors a typical handset exposes.
const DEFAULT_SENSORS: [SensorKind; 8] = [
    SensorKind::Accelerometer,
    SensorKind::Gravity,
    SensorKind::Gyroscope,
    SensorKind::Light,
    SensorKind::LinearAcceleration,
    SensorKind::MagneticField,
    SensorKind::Proximity,
    SensorKind::RotationVector,
];

#[derive(Default)]
struct Subscriptions {
    sensors: HashMap<SubscriptionId, (SensorKind, SensorSink)>,
    location: HashMap<SubscriptionId, (LocationSource, LocationSink)>,
    battery: HashMap<SubscriptionId, BatterySink>,
    network: HashMap<SubscriptionId, (NetworkSource, NetworkSink)>,
    broadcasts: HashMap<SubscriptionId, (NotificationFilter, Arc<dyn NotificationSink>)>,
}

impl Subscriptions {
    fn len(&self) -> usize {
        self.sensors.len()
            + self.location.len()
            + self.battery.len()
            + self.network.len()
            + self.broadcasts.len()
    }

    fn remove(&mut self, id: SubscriptionId) {
        self.sensors.remove(&id);
        self.location.remove(&id);
        self.battery.remove(&id);
        self.network.remove(&id);
        self.broadcasts.remove(&id);
    }
}

/// Answers to the one-shot radio and settings queries.
struct QueryState {
    wifi_scan: Vec<WifiScanResult>,
    cell: CellInfo,
    sim: SimInfo,
    phone: PhoneInfo,
    bluetooth: BluetoothInfo,
    bluetooth_devices: Vec<BluetoothDevice>,
    mode: ModeSettings,
    display: DisplayInfo,
    volume: VolumeInfo,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            wifi_scan: Vec::new(),
            cell: CellInfo::default(),
            sim: SimInfo {
                state: "absent".to_owned(),
                ..SimInfo::default()
            },
            phone: PhoneInfo {
                phone_type: "gsm".to_owned(),
                network_type: "unknown".to_owned(),
                ..PhoneInfo::default()
            },
            bluetooth: BluetoothInfo {
                enabled: true,
                scan_mode: 21,
                local_name: Some("capbridge-sim".to_owned()),
            },
            bluetooth_devices: Vec::new(),
            mode: ModeSettings::default(),
            display: DisplayInfo {
                screen_on: true,
                brightness: 128,
                timeout_s: 60,
                width_px: 1080,
                height_px: 1920,
                density_dpi: 420,
            },
            volume: VolumeInfo {
                media: 7,
                media_max: 15,
                ringer: 5,
                ringer_max: 7,
            },
        }
    }
}

/// Device state shared by every subsystem handle the host binds.
struct SimDevice {
    next_id: AtomicU64,
    sensors: Vec<SensorKind>,
    subs: Mutex<Subscriptions>,
    last_known: Mutex<HashMap<LocationSource, LocationFix>>,
    addresses: Mutex<Vec<Address>>,
    speech_sink: Mutex<Option<SpeechSink>>,
    spoken: Mutex<Vec<(String, String)>>,
    speaking: AtomicBool,
    media_playing: AtomicBool,
    speech_shutdowns: AtomicUsize,
    queries: Mutex<QueryState>,
}

impl SimDevice {
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl SensorHost for SimDevice {
    fn sensor_list(&self) -> Vec<SensorInfo> {
        self.sensors
            .iter()
            .map(|kind| SensorInfo {
                kind: Some(*kind),
                name: format!("Simulated {kind}"),
                vendor: "capbridge".to_owned(),
                version: 1,
                max_range: 100.0,
                resolution: 0.01,
                power_ma: 0.5,
                min_delay_us: 10_000,
                max_delay_us: 200_000,
                is_wakeup: false,
            })
            .collect()
    }

    fn is_available(&self, kind: SensorKind) -> bool {
        self.sensors.contains(&kind)
    }

    fn subscribe(&self, kind: SensorKind, sink: SensorSink) -> Result<SubscriptionId> {
        if !self.is_available(kind) {
            return Err(BridgeError::InvalidArgument(format!(
                "no {kind} sensor on this device"
            )));
        }
        let id = self.next_id();
        lock(&self.subs).sensors.insert(id, (kind, sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.subs).remove(id);
    }
}

impl LocationHost for SimDevice {
    fn subscribe(&self, source: LocationSource, sink: LocationSink) -> Result<SubscriptionId> {
        let id = self.next_id();
        lock(&self.subs).location.insert(id, (source, sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.subs).remove(id);
    }

    fn last_known(&self, source: LocationSource) -> Result<Option<LocationFix>> {
        Ok(lock(&self.last_known).get(&source).cloned())
    }

    fn reverse_geocode(
        &self,
        _latitude: f64,
        _longitude: f64,
        max_results: usize,
    ) -> Result<Vec<Address>> {
        Ok(lock(&self.addresses)
            .iter()
            .take(max_results)
            .cloned()
            .collect())
    }
}

impl BatteryHost for SimDevice {
    fn subscribe(&self, sink: BatterySink) -> Result<SubscriptionId> {
        let id = self.next_id();
        lock(&self.subs).battery.insert(id, sink);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.subs).remove(id);
    }
}

impl NetworkHost for SimDevice {
    fn subscribe(&self, source: NetworkSource, sink: NetworkSink) -> Result<SubscriptionId> {
        let id = self.next_id();
        lock(&self.subs).network.insert(id, (source, sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.subs).remove(id);
    }

    fn wifi_scan(&self) -> Result<Vec<WifiScanResult>> {
        Ok(lock(&self.queries).wifi_scan.clone())
    }

    fn cell_info(&self) -> Result<CellInfo> {
        Ok(lock(&self.queries).cell.clone())
    }

    fn sim_info(&self) -> Result<SimInfo> {
        Ok(lock(&self.queries).sim.clone())
    }

    fn phone_info(&self) -> Result<PhoneInfo> {
        Ok(lock(&self.queries).phone.clone())
    }

    fn bluetooth_info(&self) -> Result<BluetoothInfo> {
        Ok(lock(&self.queries).bluetooth.clone())
    }

    fn bluetooth_scan(&self) -> Result<Vec<BluetoothDevice>> {
        Ok(lock(&self.queries).bluetooth_devices.clone())
    }
}

impl DeviceHost for SimDevice {
    fn mode_settings(&self) -> Result<ModeSettings> {
        Ok(lock(&self.queries).mode)
    }

    fn display(&self) -> Result<DisplayInfo> {
        Ok(lock(&self.queries).display)
    }

    fn volume(&self) -> Result<VolumeInfo> {
        Ok(lock(&self.queries).volume)
    }
}

impl SpeechHost for SimDevice {
    fn open(&self, sink: SpeechSink) -> Result<()> {
        *lock(&self.speech_sink) = Some(sink);
        Ok(())
    }

    fn speak(&self, text: &str, utterance_id: &str) -> Result<()> {
        if lock(&self.speech_sink).is_none() {
            return Err(BridgeError::InvalidState("speech engine not open".to_owned()));
        }
        lock(&self.spoken).push((utterance_id.to_owned(), text.to_owned()));
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    fn is_media_playing(&self) -> bool {
        self.media_playing.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        lock(&self.speech_sink).take();
        self.speaking.store(false, Ordering::Release);
        self.speech_shutdowns.fetch_add(1, Ordering::Relaxed);
    }
}

impl BroadcastHost for SimDevice {
    fn subscribe(
        &self,
        filter: &NotificationFilter,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<SubscriptionId> {
        let id = self.next_id();
        lock(&self.subs)
            .broadcasts
            .insert(id, (filter.clone(), sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.subs).remove(id);
    }
}

/// Something that happened on the simulated notice surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeEvent {
    Shown {
        id: NoticeId,
        text: String,
        thread: ThreadId,
    },
    Cancelled {
        id: NoticeId,
        thread: ThreadId,
    },
    Asked {
        text: String,
        thread: ThreadId,
    },
}

/// Notice surface that records every call.
pub struct SimNoticeSurface {
    next_id: u64,
    events: Arc<Mutex<Vec<NoticeEvent>>>,
    answer: Arc<AtomicBool>,
}

impl NoticeSurface for SimNoticeSurface {
    fn show(&mut self, text: &str) -> NoticeId {
        self.next_id += 1;
        let id = NoticeId(self.next_id);
        lock(&self.events).push(NoticeEvent::Shown {
            id,
            text: text.to_owned(),
            thread: thread::current().id(),
        });
        id
    }

    fn cancel(&mut self, id: NoticeId) {
        lock(&self.events).push(NoticeEvent::Cancelled {
            id,
            thread: thread::current().id(),
        });
    }

    fn ask(&mut self, text: &str) -> bool {
        lock(&self.events).push(NoticeEvent::Asked {
            text: text.to_owned(),
            thread: thread::current().id(),
        });
        self.answer.load(Ordering::Acquire)
    }
}

/// Simulated host provider.
pub struct SimHost {
    device: Arc<SimDevice>,
    bindings: Mutex<HashMap<FacadeKind, usize>>,
    unavailable: Mutex<HashSet<FacadeKind>>,
    ui_attached: AtomicBool,
    notices: Arc<Mutex<Vec<NoticeEvent>>>,
    prompt_answer: Arc<AtomicBool>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::with_sensors(DEFAULT_SENSORS.to_vec())
    }
}

impl SimHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A device exposing exactly `sensors`.
    #[must_use]
    pub fn with_sensors(sensors: Vec<SensorKind>) -> Self {
        Self {
            device: Arc::new(SimDevice {
                next_id: AtomicU64::new(0),
                sensors,
                subs: Mutex::new(Subscriptions::default()),
                last_known: Mutex::new(HashMap::new()),
                addresses: Mutex::new(Vec::new()),
                speech_sink: Mutex::new(None),
                spoken: Mutex::new(Vec::new()),
                speaking: AtomicBool::new(false),
                media_playing: AtomicBool::new(false),
                speech_shutdowns: AtomicUsize::new(0),
                queries: Mutex::new(QueryState::default()),
            }),
            bindings: Mutex::new(HashMap::new()),
            unavailable: Mutex::new(HashSet::new()),
            ui_attached: AtomicBool::new(true),
            notices: Arc::new(Mutex::new(Vec::new())),
            prompt_answer: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Makes binding the subsystem behind `kind` fail (or succeed again).
    pub fn set_unavailable(&self, kind: FacadeKind, unavailable: bool) {
        let mut set = lock(&self.unavailable);
        if unavailable {
            set.insert(kind);
        } else {
            set.remove(&kind);
        }
    }

    /// How many times the subsystem behind `kind` was successfully bound.
    pub fn bindings(&self, kind: FacadeKind) -> usize {
        lock(&self.bindings).get(&kind).copied().unwrap_or(0)
    }

    /// Whether [`HostProvider::notice_surface`] hands out a surface.
    pub fn set_ui_attached(&self, attached: bool) {
        self.ui_attached.store(attached, Ordering::Release);
    }

    /// Answer the simulated user gives to yes/no prompts.
    pub fn set_prompt_answer(&self, answer: bool) {
        self.prompt_answer.store(answer, Ordering::Release);
    }

    pub fn notices(&self) -> Vec<NoticeEvent> {
        lock(&self.notices).clone()
    }

    /// Live listener registrations across every subsystem.
    pub fn active_subscriptions(&self) -> usize {
        lock(&self.device.subs).len()
    }

    /// Delivers `reading` to every listener registered for `kind`.
    ///
    /// Returns the number of sinks reached.
    pub fn push_sensor(&self, kind: SensorKind, reading: SensorReading) -> usize {
        let sinks: Vec<SensorSink> = lock(&self.device.subs)
            .sensors
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        for sink in &sinks {
            sink.on_update(kind, reading.clone());
        }
        sinks.len()
    }

    pub fn push_location(&self, source: LocationSource, fix: LocationFix) -> usize {
        lock(&self.device.last_known).insert(source, fix.clone());
        let sinks: Vec<LocationSink> = lock(&self.device.subs)
            .location
            .values()
            .filter(|(s, _)| *s == source)
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        for sink in &sinks {
            sink.on_update(source, fix.clone());
        }
        sinks.len()
    }

    pub fn push_battery(&self, status: BatteryStatus) -> usize {
        let sinks: Vec<BatterySink> = lock(&self.device.subs)
            .battery
            .values()
            .cloned()
            .collect();
        for sink in &sinks {
            sink.on_update(BatterySource::Battery, status.clone());
        }
        sinks.len()
    }

    pub fn push_network(&self, source: NetworkSource, reading: NetworkReading) -> usize {
        let sinks: Vec<NetworkSink> = lock(&self.device.subs)
            .network
            .values()
            .filter(|(s, _)| *s == source)
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        for sink in &sinks {
            sink.on_update(source, reading.clone());
        }
        sinks.len()
    }

    /// Broadcasts `uri` to every notification listener. Filtering is left to
    /// the listener.
    pub fn deliver_notification(&self, uri: &str) -> usize {
        let sinks: Vec<Arc<dyn NotificationSink>> = lock(&self.device.subs)
            .broadcasts
            .values()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        for sink in &sinks {
            sink.on_notification(uri);
        }
        sinks.len()
    }

    /// Sets the provider's last-known fix without notifying listeners.
    pub fn set_last_known(&self, source: LocationSource, fix: LocationFix) {
        lock(&self.device.last_known).insert(source, fix);
    }

    pub fn set_addresses(&self, addresses: Vec<Address>) {
        *lock(&self.device.addresses) = addresses;
    }

    /// Finishes asynchronous engine initialization. Returns `false` if the
    /// engine was never opened.
    pub fn complete_speech_init(&self) -> bool {
        self.report_speech(SpeechStatus {
            ready: true,
            speaking: false,
            last_utterance: None,
        })
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.device.speaking.store(speaking, Ordering::Release);
        let last_utterance = lock(&self.device.spoken).last().map(|(id, _)| id.clone());
        self.report_speech(SpeechStatus {
            ready: true,
            speaking,
            last_utterance,
        });
    }

    fn report_speech(&self, status: SpeechStatus) -> bool {
        let sink = lock(&self.device.speech_sink).clone();
        match sink {
            Some(sink) => {
                sink.on_update(SpeechSource::Engine, status);
                true
            }
            None => false,
        }
    }

    /// Texts handed to the speech engine, in call order.
    pub fn spoken(&self) -> Vec<String> {
        lock(&self.device.spoken)
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Utterance ids handed to the speech engine, in call order.
    pub fn utterance_ids(&self) -> Vec<String> {
        lock(&self.device.spoken)
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn set_media_playing(&self, playing: bool) {
        self.device.media_playing.store(playing, Ordering::Release);
    }

    pub fn set_wifi_scan(&self, found: Vec<WifiScanResult>) {
        lock(&self.device.queries).wifi_scan = found;
    }

    pub fn set_cell_info(&self, cell: CellInfo) {
        lock(&self.device.queries).cell = cell;
    }

    pub fn set_sim_info(&self, sim: SimInfo) {
        lock(&self.device.queries).sim = sim;
    }

    pub fn set_phone_info(&self, phone: PhoneInfo) {
        lock(&self.device.queries).phone = phone;
    }

    /// Adapter state and the devices discovery will find.
    pub fn set_bluetooth(&self, info: BluetoothInfo, devices: Vec<BluetoothDevice>) {
        let mut queries = lock(&self.device.queries);
        queries.bluetooth = info;
        queries.bluetooth_devices = devices;
    }

    pub fn set_mode_settings(&self, mode: ModeSettings) {
        lock(&self.device.queries).mode = mode;
    }

    pub fn set_display(&self, display: DisplayInfo) {
        lock(&self.device.queries).display = display;
    }

    pub fn set_volume(&self, volume: VolumeInfo) {
        lock(&self.device.queries).volume = volume;
    }

    pub fn speech_shutdowns(&self) -> usize {
        self.device.speech_shutdowns.load(Ordering::Relaxed)
    }

    fn bind(&self, kind: FacadeKind) -> Result<Arc<SimDevice>> {
        if lock(&self.unavailable).contains(&kind) {
            return Err(BridgeError::unavailable(kind.as_str()));
        }
        *lock(&self.bindings).entry(kind).or_insert(0) += 1;
        Ok(Arc::clone(&self.device))
    }
}

impl HostProvider for SimHost {
    fn sensors(&self) -> Result<Arc<dyn SensorHost>> {
        Ok(self.bind(FacadeKind::Sensor)?)
    }

    fn location(&self) -> Result<Arc<dyn LocationHost>> {
        Ok(self.bind(FacadeKind::Location)?)
    }

    fn battery(&self) -> Result<Arc<dyn BatteryHost>> {
        Ok(self.bind(FacadeKind::Battery)?)
    }

    fn network(&self) -> Result<Arc<dyn NetworkHost>> {
        Ok(self.bind(FacadeKind::Network)?)
    }

    fn speech(&self) -> Result<Arc<dyn SpeechHost>> {
        Ok(self.bind(FacadeKind::Speech)?)
    }

    fn broadcasts(&self) -> Result<Arc<dyn BroadcastHost>> {
        Ok(self.bind(FacadeKind::DataChannel)?)
    }

    fn device(&self) -> Result<Arc<dyn DeviceHost>> {
        Ok(Arc::clone(&self.device) as Arc<dyn DeviceHost>)
    }

    fn notice_surface(&self) -> Option<Box<dyn NoticeSurface>> {
        if !self.ui_attached.load(Ordering::Acquire) {
            return None;
        }
        Some(Box::new(SimNoticeSurface {
            next_id: 0,
            events: Arc::clone(&self.notices),
            answer: Arc::clone(&self.prompt_answer),
        }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::reading::ReadingCache;

    #[test]
    fn unavailable_subsystem_fails_to_bind() {
        let host = SimHost::new();
        host.set_unavailable(FacadeKind::Location, true);
        let err = host.location().err().unwrap();
        assert_eq!(err.kind_label(), "host_subsystem_unavailable");
        assert_eq!(host.bindings(FacadeKind::Location), 0);

        host.set_unavailable(FacadeKind::Location, false);
        assert!(host.location().is_ok());
        assert_eq!(host.bindings(FacadeKind::Location), 1);
    }

    #[test]
    fn push_reaches_only_matching_listeners() {
        let host = SimHost::new();
        let sensors = host.sensors().unwrap();
        let cache: Arc<ReadingCache<SensorKind, SensorReading>> = Arc::new(ReadingCache::new());
        sensors
            .subscribe(SensorKind::Light, Arc::clone(&cache) as SensorSink)
            .unwrap();

        let reading = SensorReading {
            timestamp_ns: 1,
            accuracy: 3,
            values: vec![250.0],
        };
        assert_eq!(host.push_sensor(SensorKind::Gyroscope, reading.clone()), 0);
        assert_eq!(host.push_sensor(SensorKind::Light, reading.clone()), 1);
        assert_eq!(cache.poll(SensorKind::Light).unwrap().reading, reading);
    }

    #[test]
    fn missing_sensor_cannot_be_subscribed() {
        let host = SimHost::with_sensors(vec![SensorKind::Light]);
        let sensors = host.sensors().unwrap();
        let cache: Arc<ReadingCache<SensorKind, SensorReading>> = Arc::new(ReadingCache::new());
        assert!(
            sensors
                .subscribe(SensorKind::HeartRate, cache as SensorSink)
                .is_err()
        );
        assert_eq!(host.active_subscriptions(), 0);
    }

    #[test]
    fn detached_ui_has_no_surface() {
        let host = SimHost::new();
        host.set_ui_attached(false);
        assert!(host.notice_surface().is_none());
    }
}
