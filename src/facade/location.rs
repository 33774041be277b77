//! Location providers.
//!
//! Satellite, network and fused fixes are cached in separate slots. Polling
//! always names the source; there is no "best guess" default because the
//! sources differ in accuracy and freshness and the caller must choose.

use super::{Facade, FacadeKind, Listeners};
use crate::error::{BridgeError, Result};
use crate::platform::{LocationHost, LocationSink, UpdateSink};
use crate::reading::{CacheKey, ReadingCache, Stamped};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Origin of a location fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    /// Fine, satellite-derived.
    Gps,
    /// Coarse, derived from cell towers and Wi-Fi.
    Network,
    /// Platform fusion of all providers.
    Fused,
}

impl LocationSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::Network => "network",
            Self::Fused => "fused",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gps" | "fine" | "satellite" => Some(Self::Gps),
            "network" | "coarse" => Some(Self::Network),
            "fused" => Some(Self::Fused),
            _ => None,
        }
    }
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CacheKey for LocationSource {
    fn all() -> &'static [Self] {
        &[Self::Gps, Self::Network, Self::Fused]
    }
}

/// One location fix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocationFix {
    /// Provider sample time, milliseconds since the Unix epoch.
    pub time_sample_ms: i64,
    /// Degrees, WGS84.
    pub latitude: f64,
    /// Degrees, WGS84.
    pub longitude: f64,
    /// Metres above the WGS84 ellipsoid.
    pub altitude_m: f64,
    /// Horizontal accuracy radius in metres (68% confidence).
    pub accuracy_m: f32,
    /// Degrees east of true north.
    pub bearing_deg: f32,
    /// Metres per second over ground.
    pub speed_mps: f32,
    /// Provider specific extras (e.g. `satellites`).
    pub extras: BTreeMap<String, String>,
}

/// Reverse geocoding result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Address {
    pub admin_area: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub feature_name: Option<String>,
    pub locality: Option<String>,
    pub postal_code: Option<String>,
    pub sub_locality: Option<String>,
    pub thoroughfare: Option<String>,
    pub sub_thoroughfare: Option<String>,
    pub lines: Vec<String>,
}

/// Facade over the host location subsystem.
pub struct LocationFacade {
    host: Arc<dyn LocationHost>,
    cache: Arc<ReadingCache<LocationSource, LocationFix>>,
    sources: Vec<LocationSource>,
    listeners: Listeners,
}

impl LocationFacade {
    /// Wraps `host`; `sources` lists the providers [`start`](Facade::start)
    /// registers with.
    pub fn new(host: Arc<dyn LocationHost>, sources: Vec<LocationSource>) -> Self {
        Self {
            host,
            cache: Arc::new(ReadingCache::new()),
            sources,
            listeners: Listeners::default(),
        }
    }

    /// Last cached fix from `source`.
    pub fn poll(&self, source: LocationSource) -> Option<Arc<Stamped<LocationFix>>> {
        self.cache.poll(source)
    }

    /// Host delivery entry point.
    pub fn on_update(&self, source: LocationSource, fix: LocationFix) {
        tracing::debug!(source = %source, "location update");
        self.cache.on_update(source, fix);
    }

    /// The provider's own last-known fix (host round-trip, not the cache).
    pub fn last_known(&self, source: LocationSource) -> Result<Option<LocationFix>> {
        self.host.last_known(source)
    }

    /// Up to `max_results` addresses near the coordinates.
    pub fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
        max_results: usize,
    ) -> Result<Vec<Address>> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(BridgeError::InvalidArgument(format!(
                "coordinates out of range: {latitude}, {longitude}"
            )));
        }
        if max_results == 0 {
            return Ok(Vec::new());
        }
        self.host.reverse_geocode(latitude, longitude, max_results)
    }
}

impl Facade for LocationFacade {
    fn kind(&self) -> FacadeKind {
        FacadeKind::Location
    }

    fn start(&self) -> Result<()> {
        let started = self.listeners.start_with(|| {
            let mut ids = Vec::with_capacity(self.sources.len());
            for source in &self.sources {
                let sink = Arc::clone(&self.cache) as LocationSink;
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
            tracing::info!(sources = ?self.sources, "location facade started");
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let stopped = self.listeners.stop_with(|ids| {
            for id in ids {
                self.host.unsubscribe(id);
            }
        });
        if stopped {
            tracing::info!("location facade stopped");
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.listeners.is_active()
    }
}
