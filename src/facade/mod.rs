//! Capability facades.
//!
//! A facade owns exactly one host subsystem handle, keeps the last-known
//! reading per source, and exposes a small query/command API. Facades are
//! created once by the [`crate::registry::FacadeRegistry`] and outlive any
//! single interpreter run.
//!
//! Lifecycle rules shared by every facade except the data channel:
//!
//! - `start()` is idempotent; a second call does not register twice.
//! - `stop()` is idempotent and a no-op when never started.
//! - `stop()` never clears cached readings. A delivery already in flight may
//!   still land after `stop()` returns.

use crate::error::Result;
use crate::platform::SubscriptionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};

pub mod battery;
pub mod data;
pub mod device;
pub mod location;
pub mod network;
pub mod sensor;
pub mod speech;

/// The six capability kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacadeKind {
    Sensor,
    Location,
    Battery,
    Network,
    Speech,
    DataChannel,
}

impl FacadeKind {
    pub const ALL: [Self; 6] = [
        Self::Sensor,
        Self::Location,
        Self::Battery,
        Self::Network,
        Self::Speech,
        Self::DataChannel,
    ];

    /// Wire name, also used as the subsystem name in errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Location => "location",
            Self::Battery => "battery",
            Self::Network => "network",
            Self::Speech => "speech",
            Self::DataChannel => "data_channel",
        }
    }

    /// Parse a facade kind from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sensor" | "sensors" => Some(Self::Sensor),
            "location" => Some(Self::Location),
            "battery" => Some(Self::Battery),
            "network" => Some(Self::Network),
            "speech" | "media" => Some(Self::Speech),
            "data_channel" | "data" => Some(Self::DataChannel),
            _ => None,
        }
    }
}

impl fmt::Display for FacadeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start/stop surface common to all facades.
pub trait Facade: Send + Sync {
    fn kind(&self) -> FacadeKind;

    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn is_started(&self) -> bool;
}

/// Registration bookkeeping for a facade's host listeners.
///
/// `None` means stopped; `Some(ids)` means started with those registrations.
/// The lock only serializes start/stop against each other, polls never take it.
#[derive(Debug, Default)]
pub(crate) struct Listeners {
    active: Mutex<Option<Vec<SubscriptionId>>>,
}

impl Listeners {
    /// Runs `register` unless already started.
    ///
    /// Returns `Ok(false)` when already started. If `register` fails, nothing
    /// is recorded and the facade stays stopped.
    pub(crate) fn start_with<F>(&self, register: F) -> Result<bool>
    where
        F: FnOnce() -> Result<Vec<SubscriptionId>>,
    {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return Ok(false);
        }
        *active = Some(register()?);
        Ok(true)
    }

    /// Runs `unregister` with the recorded ids, unless already stopped.
    ///
    /// Returns `false` when there was nothing to stop.
    pub(crate) fn stop_with<F>(&self, unregister: F) -> bool
    where
        F: FnOnce(Vec<SubscriptionId>),
    {
        let taken = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(ids) => {
                unregister(ids);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
