//! Versioned call/reply envelopes for the foreign call surface.
//!
//! Arguments are a flat JSON object whose values are primitives (string,
//! number, bool or null). A reply value is a primitive, a flat text record
//! (see [`super::flat`]) or null for "no data yet".

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};

/// Contract version for call/reply envelopes.
pub const CALL_VERSION: u32 = 1;

/// Every entry point the interpreter may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallName {
    #[serde(rename = "bridge.ping")]
    BridgePing,
    #[serde(rename = "bridge.version")]
    BridgeVersion,
    #[serde(rename = "bridge.shutdown")]
    BridgeShutdown,
    #[serde(rename = "facade.start")]
    FacadeStart,
    #[serde(rename = "facade.stop")]
    FacadeStop,
    #[serde(rename = "facade.status")]
    FacadeStatus,
    #[serde(rename = "sensor.list")]
    SensorList,
    #[serde(rename = "sensor.start")]
    SensorStart,
    #[serde(rename = "sensor.stop")]
    SensorStop,
    #[serde(rename = "sensor.poll")]
    SensorPoll,
    #[serde(rename = "location.poll")]
    LocationPoll,
    #[serde(rename = "location.last_known")]
    LocationLastKnown,
    #[serde(rename = "location.geocode")]
    LocationGeocode,
    #[serde(rename = "battery.poll")]
    BatteryPoll,
    #[serde(rename = "network.poll")]
    NetworkPoll,
    #[serde(rename = "network.wifi_scan")]
    NetworkWifiScan,
    #[serde(rename = "network.cell_info")]
    NetworkCellInfo,
    #[serde(rename = "network.sim_info")]
    NetworkSimInfo,
    #[serde(rename = "network.phone_info")]
    NetworkPhoneInfo,
    #[serde(rename = "network.bluetooth_info")]
    NetworkBluetoothInfo,
    #[serde(rename = "network.bluetooth_scan")]
    NetworkBluetoothScan,
    #[serde(rename = "device.mode_settings")]
    DeviceModeSettings,
    #[serde(rename = "device.display")]
    DeviceDisplay,
    #[serde(rename = "device.volume")]
    DeviceVolume,
    #[serde(rename = "speech.speak")]
    SpeechSpeak,
    #[serde(rename = "speech.is_speaking")]
    SpeechIsSpeaking,
    #[serde(rename = "speech.is_media_playing")]
    SpeechIsMediaPlaying,
    #[serde(rename = "data.most_recent")]
    DataMostRecent,
    #[serde(rename = "data.all")]
    DataAll,
    #[serde(rename = "output.log")]
    OutputLog,
    #[serde(rename = "output.notice")]
    OutputNotice,
    #[serde(rename = "output.prompt")]
    OutputPrompt,
}

impl CallName {
    pub const ALL: [Self; 32] = [
        Self::BridgePing,
        Self::BridgeVersion,
        Self::BridgeShutdown,
        Self::FacadeStart,
        Self::FacadeStop,
        Self::FacadeStatus,
        Self::SensorList,
        Self::SensorStart,
        Self::SensorStop,
        Self::SensorPoll,
        Self::LocationPoll,
        Self::LocationLastKnown,
        Self::LocationGeocode,
        Self::BatteryPoll,
        Self::NetworkPoll,
        Self::NetworkWifiScan,
        Self::NetworkCellInfo,
        Self::NetworkSimInfo,
        Self::NetworkPhoneInfo,
        Self::NetworkBluetoothInfo,
        Self::NetworkBluetoothScan,
        Self::DeviceModeSettings,
        Self::DeviceDisplay,
        Self::DeviceVolume,
        Self::SpeechSpeak,
        Self::SpeechIsSpeaking,
        Self::SpeechIsMediaPlaying,
        Self::DataMostRecent,
        Self::DataAll,
        Self::OutputLog,
        Self::OutputNotice,
        Self::OutputPrompt,
    ];

    /// Render call name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BridgePing => "bridge.ping",
            Self::BridgeVersion => "bridge.version",
            Self::BridgeShutdown => "bridge.shutdown",
            Self::FacadeStart => "facade.start",
            Self::FacadeStop => "facade.stop",
            Self::FacadeStatus => "facade.status",
            Self::SensorList => "sensor.list",
            Self::SensorStart => "sensor.start",
            Self::SensorStop => "sensor.stop",
            Self::SensorPoll => "sensor.poll",
            Self::LocationPoll => "location.poll",
            Self::LocationLastKnown => "location.last_known",
            Self::LocationGeocode => "location.geocode",
            Self::BatteryPoll => "battery.poll",
            Self::NetworkPoll => "network.poll",
            Self::NetworkWifiScan => "network.wifi_scan",
            Self::NetworkCellInfo => "network.cell_info",
            Self::NetworkSimInfo => "network.sim_info",
            Self::NetworkPhoneInfo => "network.phone_info",
            Self::NetworkBluetoothInfo => "network.bluetooth_info",
            Self::NetworkBluetoothScan => "network.bluetooth_scan",
            Self::DeviceModeSettings => "device.mode_settings",
            Self::DeviceDisplay => "device.display",
            Self::DeviceVolume => "device.volume",
            Self::SpeechSpeak => "speech.speak",
            Self::SpeechIsSpeaking => "speech.is_speaking",
            Self::SpeechIsMediaPlaying => "speech.is_media_playing",
            Self::DataMostRecent => "data.most_recent",
            Self::DataAll => "data.all",
            Self::OutputLog => "output.log",
            Self::OutputNotice => "output.notice",
            Self::OutputPrompt => "output.prompt",
        }
    }

    /// Parse a call name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

/// A call from the interpreter into the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub v: u32,
    pub request_id: String,
    pub call: CallName,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl CallEnvelope {
    /// Build a v1 call envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        call: CallName,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            v: CALL_VERSION,
            request_id: request_id.into(),
            call,
            args,
        }
    }

    /// Validate version, request id, and argument flatness.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != CALL_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, CALL_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        if let Some((key, _)) = self
            .args
            .iter()
            .find(|(_, v)| v.is_array() || v.is_object())
        {
            return Err(ContractError::new(
                ContractErrorKind::NonPrimitiveArgument,
                format!("argument `{key}` must be a string, number, bool or null"),
            ));
        }
        Ok(())
    }
}

/// The bridge's answer to one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub value: serde_json::Value,
    pub error: Option<String>,
    /// Snake-case error category; see [`BridgeError::kind_label`].
    pub error_kind: Option<String>,
}

impl ReplyEnvelope {
    /// Build a successful reply.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            v: CALL_VERSION,
            request_id: request_id.into(),
            ok: true,
            value,
            error: None,
            error_kind: None,
        }
    }

    /// Build a failed reply from a bridge error.
    #[must_use]
    pub fn error(request_id: impl Into<String>, err: &BridgeError) -> Self {
        Self::failure(request_id, err.kind_label(), err.to_string())
    }

    /// Build the reply for a call line that is not a valid envelope. It has
    /// no request id to echo, so it carries `parse-error`.
    #[must_use]
    pub fn parse_error(err: &serde_json::Error) -> Self {
        Self::error(
            "parse-error",
            &BridgeError::Contract(format!("failed to parse call envelope: {err}")),
        )
    }

    /// Build a failed reply from a contract violation.
    #[must_use]
    pub fn contract_error(request_id: impl Into<String>, err: &ContractError) -> Self {
        Self::failure(request_id, "contract", err.to_string())
    }

    fn failure(request_id: impl Into<String>, kind: &str, message: String) -> Self {
        Self {
            v: CALL_VERSION,
            request_id: request_id.into(),
            ok: false,
            value: serde_json::Value::Null,
            error: Some(message),
            error_kind: Some(kind.to_owned()),
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
    NonPrimitiveArgument,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}

impl From<ContractError> for BridgeError {
    fn from(err: ContractError) -> Self {
        Self::Contract(err.to_string())
    }
}
