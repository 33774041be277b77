//! Motion and environment sensors.
//!
//! Each sensor kind has its own cache slot. Registration is per kind, so a
//! script can start only the sensors it needs; [`SensorFacade::start`]
//! starts every configured kind the device actually has.

use super::{Facade, FacadeKind};
use crate::error::Result;
use crate::platform::{SensorHost, SensorSink, SubscriptionId, UpdateSink};
use crate::reading::{CacheKey, ReadingCache, Stamped};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Sensor kinds with their stable wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    AmbientTemperature,
    GameRotationVector,
    GeomagneticRotationVector,
    Gravity,
    Gyroscope,
    GyroscopeUncalibrated,
    HeartRate,
    Light,
    LinearAcceleration,
    MagneticField,
    MagneticFieldUncalibrated,
    Pressure,
    Proximity,
    RelativeHumidity,
    RotationVector,
    StepCounter,
}

const ALL_SENSORS: [SensorKind; 17] = [
    SensorKind::Accelerometer,
    SensorKind::AmbientTemperature,
    SensorKind::GameRotationVector,
    SensorKind::GeomagneticRotationVector,
    SensorKind::Gravity,
    SensorKind::Gyroscope,
    SensorKind::GyroscopeUncalibrated,
    SensorKind::HeartRate,
    SensorKind::Light,
    SensorKind::LinearAcceleration,
    SensorKind::MagneticField,
    SensorKind::MagneticFieldUncalibrated,
    SensorKind::Pressure,
    SensorKind::Proximity,
    SensorKind::RelativeHumidity,
    SensorKind::RotationVector,
    SensorKind::StepCounter,
];

impl SensorKind {
    /// Stable numeric code used across the call surface (1–17).
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Accelerometer => 1,
            Self::AmbientTemperature => 2,
            Self::GameRotationVector => 3,
            Self::GeomagneticRotationVector => 4,
            Self::Gravity => 5,
            Self::Gyroscope => 6,
            Self::GyroscopeUncalibrated => 7,
            Self::HeartRate => 8,
            Self::Light => 9,
            Self::LinearAcceleration => 10,
            Self::MagneticField => 11,
            Self::MagneticFieldUncalibrated => 12,
            Self::Pressure => 13,
            Self::Proximity => 14,
            Self::RelativeHumidity => 15,
            Self::RotationVector => 16,
            Self::StepCounter => 17,
        }
    }

    /// Inverse of [`SensorKind::code`].
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        ALL_SENSORS.iter().copied().find(|k| i64::from(k.code()) == code)
    }

    /// Parse either a numeric code or a snake_case name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(code) = raw.parse::<i64>() {
            return Self::from_code(code);
        }
        ALL_SENSORS
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(raw))
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accelerometer => "accelerometer",
            Self::AmbientTemperature => "ambient_temperature",
            Self::GameRotationVector => "game_rotation_vector",
            Self::GeomagneticRotationVector => "geomagnetic_rotation_vector",
            Self::Gravity => "gravity",
            Self::Gyroscope => "gyroscope",
            Self::GyroscopeUncalibrated => "gyroscope_uncalibrated",
            Self::HeartRate => "heart_rate",
            Self::Light => "light",
            Self::LinearAcceleration => "linear_acceleration",
            Self::MagneticField => "magnetic_field",
            Self::MagneticFieldUncalibrated => "magnetic_field_uncalibrated",
            Self::Pressure => "pressure",
            Self::Proximity => "proximity",
            Self::RelativeHumidity => "relative_humidity",
            Self::RotationVector => "rotation_vector",
            Self::StepCounter => "step_counter",
        }
    }

    /// Unit of each entry in [`SensorReading::values`].
    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            Self::Accelerometer | Self::Gravity | Self::LinearAcceleration => "m/s^2",
            Self::AmbientTemperature => "degC",
            Self::GameRotationVector | Self::GeomagneticRotationVector | Self::RotationVector => {
                "unitless"
            }
            Self::Gyroscope | Self::GyroscopeUncalibrated => "rad/s",
            Self::HeartRate => "bpm",
            Self::Light => "lx",
            Self::MagneticField | Self::MagneticFieldUncalibrated => "uT",
            Self::Pressure => "hPa",
            Self::Proximity => "cm",
            Self::RelativeHumidity => "%",
            Self::StepCounter => "steps",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CacheKey for SensorKind {
    fn all() -> &'static [Self] {
        &ALL_SENSORS
    }
}

/// One sample from a sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Host sample timestamp in nanoseconds.
    pub timestamp_ns: i64,
    /// Host accuracy flag (0 = unreliable … 3 = high).
    pub accuracy: i32,
    /// Axis values; see [`SensorKind::unit`].
    pub values: Vec<f64>,
}

/// Static description of a device sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
    pub kind: Option<SensorKind>,
    pub name: String,
    pub vendor: String,
    pub version: i32,
    pub max_range: f64,
    pub resolution: f64,
    /// Power draw in mA.
    pub power_ma: f64,
    /// Minimum delay between events in microseconds (0 = on change).
    pub min_delay_us: i32,
    pub max_delay_us: i32,
    pub is_wakeup: bool,
}

/// Facade over the host sensor subsystem.
pub struct SensorFacade {
    host: Arc<dyn SensorHost>,
    cache: Arc<ReadingCache<SensorKind, SensorReading>>,
    enabled: Vec<SensorKind>,
    state: Mutex<Registrations>,
}

/// Per-kind host registrations, plus whether the facade as a whole is started.
///
/// Kinds registered one at a time do not mark the facade started.
#[derive(Default)]
struct Registrations {
    started: bool,
    active: HashMap<SensorKind, SubscriptionId>,
}

impl SensorFacade {
    /// Wraps `host`; `enabled` lists the kinds [`start`](Facade::start) registers.
    pub fn new(host: Arc<dyn SensorHost>, enabled: Vec<SensorKind>) -> Self {
        Self {
            host,
            cache: Arc::new(ReadingCache::new()),
            enabled,
            state: Mutex::new(Registrations::default()),
        }
    }

    /// Descriptions of all sensors on the device (host query).
    pub fn sensor_list(&self) -> Vec<SensorInfo> {
        self.host.sensor_list()
    }

    /// Registers one sensor kind. Idempotent.
    pub fn start_sensor(&self, kind: SensorKind) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.active.contains_key(&kind) {
            return Ok(());
        }
        let id = self.host.subscribe(kind, self.sink())?;
        state.active.insert(kind, id);
        tracing::info!(sensor = %kind, "sensor listener registered");
        Ok(())
    }

    /// Unregisters one sensor kind. No-op if it was not registered.
    pub fn stop_sensor(&self, kind: SensorKind) {
        let removed = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .remove(&kind);
        if let Some(id) = removed {
            self.host.unsubscribe(id);
            tracing::info!(sensor = %kind, "sensor listener unregistered");
        }
    }

    /// Kinds currently registered with the host.
    pub fn active_sensors(&self) -> Vec<SensorKind> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut kinds: Vec<_> = state.active.keys().copied().collect();
        kinds.sort_by_key(|k| k.code());
        kinds
    }

    /// Last cached reading for `kind`.
    pub fn poll(&self, kind: SensorKind) -> Option<Arc<Stamped<SensorReading>>> {
        self.cache.poll(kind)
    }

    /// Host delivery entry point.
    pub fn on_update(&self, kind: SensorKind, reading: SensorReading) {
        self.cache.on_update(kind, reading);
    }

    fn sink(&self) -> SensorSink {
        Arc::clone(&self.cache) as SensorSink
    }
}

impl Facade for SensorFacade {
    fn kind(&self) -> FacadeKind {
        FacadeKind::Sensor
    }

    fn start(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.started {
            return Ok(());
        }
        // Kinds already registered through `start_sensor` are kept; only the
        // ones added here are rolled back on failure.
        let mut added = Vec::new();
        for kind in &self.enabled {
            if state.active.contains_key(kind) {
                continue;
            }
            if !self.host.is_available(*kind) {
                tracing::debug!(sensor = %kind, "sensor not present on device; skipping");
                continue;
            }
            match self.host.subscribe(*kind, self.sink()) {
                Ok(id) => {
                    state.active.insert(*kind, id);
                    added.push(*kind);
                }
                Err(e) => {
                    for kind in added {
                        if let Some(id) = state.active.remove(&kind) {
                            self.host.unsubscribe(id);
                        }
                    }
                    return Err(e);
                }
            }
        }
        state.started = true;
        tracing::info!(count = state.active.len(), "sensor facade started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let Registrations {
            started: was_started,
            active,
        } = std::mem::take(&mut *self.state.lock().unwrap_or_else(PoisonError::into_inner));
        for id in active.into_values() {
            self.host.unsubscribe(id);
        }
        if was_started {
            tracing::info!("sensor facade stopped");
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started
    }
}
