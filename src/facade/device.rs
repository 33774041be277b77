//! Device settings queries: ringer and airplane mode, display, volume.
//!
//! There is nothing to subscribe to here, so [`DeviceInfo`] has no
//! start/stop lifecycle and is not one of the six facade kinds. Every call
//! is a host round-trip.

use crate::error::Result;
use crate::platform::DeviceHost;
use std::sync::Arc;

/// Ringer and airplane mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeSettings {
    pub airplane_mode: bool,
    pub ringer_silent: bool,
    pub ringer_vibrate: bool,
    pub notification_vibrate: bool,
}

/// Screen state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayInfo {
    pub screen_on: bool,
    /// 0..=255.
    pub brightness: u8,
    /// Screen-off timeout in seconds.
    pub timeout_s: u32,
    pub width_px: u32,
    pub height_px: u32,
    pub density_dpi: u32,
}

/// Media and ringer stream volumes with their maxima.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeInfo {
    pub media: u32,
    pub media_max: u32,
    pub ringer: u32,
    pub ringer_max: u32,
}

pub struct DeviceInfo {
    host: Arc<dyn DeviceHost>,
}

impl DeviceInfo {
    pub fn new(host: Arc<dyn DeviceHost>) -> Self {
        Self { host }
    }

    pub fn mode_settings(&self) -> Result<ModeSettings> {
        self.host.mode_settings()
    }

    pub fn display(&self) -> Result<DisplayInfo> {
        self.host.display()
    }

    /// Current volumes. A level above its maximum is clamped.
    pub fn volume(&self) -> Result<VolumeInfo> {
        let mut volume = self.host.volume()?;
        if volume.media > volume.media_max || volume.ringer > volume.ringer_max {
            tracing::warn!(?volume, "host reported volume above its maximum; clamping");
            volume.media = volume.media.min(volume.media_max);
            volume.ringer = volume.ringer.min(volume.ringer_max);
        }
        Ok(volume)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::platform::HostProvider;
    use crate::platform::sim::SimHost;

    #[test]
    fn volume_is_clamped_to_maximum() {
        let host = SimHost::new();
        host.set_volume(VolumeInfo {
            media: 20,
            media_max: 15,
            ringer: 3,
            ringer_max: 7,
        });
        let device = DeviceInfo::new(host.device().unwrap());
        let volume = device.volume().unwrap();
        assert_eq!(volume.media, 15);
        assert_eq!(volume.ringer, 3);
    }

    #[test]
    fn settings_come_from_host() {
        let host = SimHost::new();
        host.set_mode_settings(ModeSettings {
            airplane_mode: true,
            ..ModeSettings::default()
        });
        let device = DeviceInfo::new(host.device().unwrap());
        assert!(device.mode_settings().unwrap().airplane_mode);
        assert!(device.display().unwrap().screen_on);
    }
}
