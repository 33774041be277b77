//! Flat text encoding for composite reply values.
//!
//! A record is `key=value` pairs joined by `&`, values percent-encoded, in a
//! fixed field order. A sequence of records is one record per line. This
//! keeps every reply value a single string the interpreter side can split
//! without a JSON parser.

use crate::error::{BridgeError, Result};
use crate::facade::battery::BatteryStatus;
use crate::facade::data::DataRecord;
use crate::facade::location::{Address, LocationFix};
use crate::facade::device::{DisplayInfo, ModeSettings, VolumeInfo};
use crate::facade::network::{
    BluetoothDevice, BluetoothInfo, CellInfo, NetworkReading, PhoneInfo, SimInfo, WifiScanResult,
};
use crate::facade::sensor::{SensorInfo, SensorReading};
use crate::facade::speech::SpeechStatus;
use crate::reading::Stamped;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::{self, Display};

/// One flat record under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRecord {
    fields: Vec<(String, String)>,
}

impl FlatRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Display) -> &mut Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Pushes `key` only when `value` is present.
    pub fn push_opt(&mut self, key: &str, value: Option<&impl Display>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

impl Display for FlatRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(
                f,
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )?;
        }
        Ok(())
    }
}

/// Types with a flat record rendering.
pub trait ToFlat {
    fn write_flat(&self, record: &mut FlatRecord);

    fn to_flat(&self) -> FlatRecord {
        let mut record = FlatRecord::new();
        self.write_flat(&mut record);
        record
    }
}

/// Renders records one per line.
#[must_use]
pub fn join_records<'a, T, I>(items: I) -> String
where
    T: ToFlat + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items
        .into_iter()
        .map(|item| item.to_flat().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decodes one record back into key/value pairs.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidArgument`] for a pair without `=` or with
/// invalid percent-encoding.
pub fn parse_record(line: &str) -> Result<Vec<(String, String)>> {
    if line.is_empty() {
        return Ok(Vec::new());
    }
    line.split('&')
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                BridgeError::InvalidArgument(format!("flat pair without `=`: {pair}"))
            })?;
            let decode = |s: &str| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .map_err(|e| BridgeError::InvalidArgument(format!("bad percent-encoding: {e}")))
            };
            Ok((decode(key)?, decode(value)?))
        })
        .collect()
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl<R: ToFlat> ToFlat for Stamped<R> {
    fn write_flat(&self, record: &mut FlatRecord) {
        record.push("received_at", timestamp(&self.received_at));
        self.reading.write_flat(record);
    }
}

impl ToFlat for SensorReading {
    fn write_flat(&self, record: &mut FlatRecord) {
        let values = self
            .values
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        record
            .push("timestamp_ns", self.timestamp_ns)
            .push("accuracy", self.accuracy)
            .push("values", values);
    }
}

impl ToFlat for SensorInfo {
    fn write_flat(&self, record: &mut FlatRecord) {
        if let Some(kind) = self.kind {
            record.push("code", kind.code()).push("type", kind);
        }
        record
            .push("name", &self.name)
            .push("vendor", &self.vendor)
            .push("version", self.version)
            .push("max_range", self.max_range)
            .push("resolution", self.resolution)
            .push("power_ma", self.power_ma)
            .push("min_delay_us", self.min_delay_us)
            .push("max_delay_us", self.max_delay_us)
            .push("wakeup", self.is_wakeup);
    }
}

impl ToFlat for LocationFix {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("time_sample_ms", self.time_sample_ms)
            .push("latitude", self.latitude)
            .push("longitude", self.longitude)
            .push("altitude_m", self.altitude_m)
            .push("accuracy_m", self.accuracy_m)
            .push("bearing_deg", self.bearing_deg)
            .push("speed_mps", self.speed_mps);
        for (key, value) in &self.extras {
            record.push(format!("extras.{key}"), value);
        }
    }
}

impl ToFlat for Address {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push_opt("admin_area", self.admin_area.as_ref())
            .push_opt("country_code", self.country_code.as_ref())
            .push_opt("country_name", self.country_name.as_ref())
            .push_opt("feature_name", self.feature_name.as_ref())
            .push_opt("locality", self.locality.as_ref())
            .push_opt("postal_code", self.postal_code.as_ref())
            .push_opt("sub_locality", self.sub_locality.as_ref())
            .push_opt("thoroughfare", self.thoroughfare.as_ref())
            .push_opt("sub_thoroughfare", self.sub_thoroughfare.as_ref());
        for (i, line) in self.lines.iter().enumerate() {
            record.push(format!("line{i}"), line);
        }
    }
}

impl ToFlat for BatteryStatus {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("level_pct", self.level_pct)
            .push("status", self.charge.as_str())
            .push("plugged", self.plugged.as_str())
            .push("health", self.health.as_str())
            .push("temperature_dc", self.temperature_dc)
            .push("voltage_mv", self.voltage_mv)
            .push("present", self.present)
            .push("technology", &self.technology);
    }
}

impl ToFlat for NetworkReading {
    fn write_flat(&self, record: &mut FlatRecord) {
        match self {
            Self::Wifi(wifi) => {
                record
                    .push("network", "wifi")
                    .push("enabled", wifi.enabled)
                    .push("connected", wifi.connected)
                    .push_opt("ssid", wifi.ssid.as_ref())
                    .push_opt("bssid", wifi.bssid.as_ref())
                    .push("rssi_dbm", wifi.rssi_dbm)
                    .push("link_speed_mbps", wifi.link_speed_mbps)
                    .push("frequency_mhz", wifi.frequency_mhz);
            }
            Self::Cellular(cell) => {
                record
                    .push("network", "cellular")
                    .push_opt("operator", cell.network_operator.as_ref())
                    .push_opt("operator_name", cell.network_operator_name.as_ref())
                    .push("network_type", &cell.network_type)
                    .push("roaming", cell.roaming)
                    .push("signal_dbm", cell.signal_dbm);
            }
        }
    }
}

impl ToFlat for WifiScanResult {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("ssid", &self.ssid)
            .push("bssid", &self.bssid)
            .push("frequency_mhz", self.frequency_mhz)
            .push("level_dbm", self.level_dbm)
            .push("capabilities", &self.capabilities);
    }
}

impl ToFlat for CellInfo {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push_opt("lac", self.lac.as_ref())
            .push_opt("cid", self.cid.as_ref());
        for (i, cell) in self.neighbors.iter().enumerate() {
            record
                .push(format!("neighbor{i}.cid"), cell.cid)
                .push(format!("neighbor{i}.rssi"), cell.rssi);
        }
    }
}

impl ToFlat for SimInfo {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push_opt("operator", self.operator.as_ref())
            .push_opt("operator_name", self.operator_name.as_ref())
            .push_opt("country_code", self.country_code.as_ref())
            .push("state", &self.state);
    }
}

impl ToFlat for PhoneInfo {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("call_state", &self.call_state)
            .push_opt("incoming_number", self.incoming_number.as_ref())
            .push("phone_type", &self.phone_type)
            .push("network_type", &self.network_type);
    }
}

impl ToFlat for BluetoothInfo {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("enabled", self.enabled)
            .push("scan_mode", self.scan_mode)
            .push_opt("local_name", self.local_name.as_ref());
    }
}

impl ToFlat for BluetoothDevice {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("address", &self.address)
            .push_opt("name", self.name.as_ref())
            .push_opt("rssi_dbm", self.rssi_dbm.as_ref());
    }
}

impl ToFlat for ModeSettings {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("airplane_mode", self.airplane_mode)
            .push("ringer_silent", self.ringer_silent)
            .push("ringer_vibrate", self.ringer_vibrate)
            .push("notification_vibrate", self.notification_vibrate);
    }
}

impl ToFlat for DisplayInfo {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("screen_on", self.screen_on)
            .push("brightness", self.brightness)
            .push("timeout_s", self.timeout_s)
            .push("width_px", self.width_px)
            .push("height_px", self.height_px)
            .push("density_dpi", self.density_dpi);
    }
}

impl ToFlat for VolumeInfo {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("media", self.media)
            .push("media_max", self.media_max)
            .push("ringer", self.ringer)
            .push("ringer_max", self.ringer_max);
    }
}

impl ToFlat for SpeechStatus {
    fn write_flat(&self, record: &mut FlatRecord) {
        record
            .push("ready", self.ready)
            .push("speaking", self.speaking)
            .push_opt("last_utterance", self.last_utterance.as_ref());
    }
}

impl ToFlat for DataRecord {
    fn write_flat(&self, record: &mut FlatRecord) {
        record.push("received_at", timestamp(&self.received_at));
        for (key, value) in &self.data {
            record.push(key.as_str(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::facade::network::WifiInfo;
    use std::collections::BTreeMap;

    #[test]
    fn values_are_percent_encoded() {
        let mut record = FlatRecord::new();
        record.push("msg", "a&b=c d").push("n", 3);
        assert_eq!(record.to_string(), "msg=a%26b%3Dc%20d&n=3");
        assert_eq!(
            parse_record(&record.to_string()).unwrap(),
            vec![
                ("msg".to_owned(), "a&b=c d".to_owned()),
                ("n".to_owned(), "3".to_owned())
            ]
        );
    }

    #[test]
    fn sensor_reading_lists_values() {
        let reading = SensorReading {
            timestamp_ns: 42,
            accuracy: 3,
            values: vec![0.5, -9.81, 1.0],
        };
        let fields = parse_record(&reading.to_flat().to_string()).unwrap();
        assert_eq!(fields[0], ("timestamp_ns".to_owned(), "42".to_owned()));
        assert_eq!(fields[2], ("values".to_owned(), "0.5,-9.81,1".to_owned()));
    }

    #[test]
    fn optional_fields_are_omitted() {
        let wifi = NetworkReading::Wifi(WifiInfo {
            enabled: true,
            ..WifiInfo::default()
        });
        let text = wifi.to_flat().to_string();
        assert!(text.starts_with("network=wifi&enabled=true"));
        assert!(!text.contains("ssid"));
    }

    #[test]
    fn records_join_one_per_line() {
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let records: Vec<DataRecord> = ["A", "B"]
            .into_iter()
            .map(|v| DataRecord {
                received_at: at,
                data: BTreeMap::from([("v".to_owned(), v.to_owned())]),
            })
            .collect();
        let text = join_records(&records);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "received_at=2026-01-02T03%3A04%3A05.000Z&v=A",
                "received_at=2026-01-02T03%3A04%3A05.000Z&v=B"
            ]
        );
    }

    #[test]
    fn cell_info_numbers_neighbors() {
        use crate::facade::network::NeighborCell;
        let cell = CellInfo {
            lac: Some(32115),
            cid: None,
            neighbors: vec![
                NeighborCell { cid: 26741, rssi: 11 },
                NeighborCell { cid: 40151, rssi: 9 },
            ],
        };
        assert_eq!(
            cell.to_flat().to_string(),
            "lac=32115&neighbor0.cid=26741&neighbor0.rssi=11&neighbor1.cid=40151&neighbor1.rssi=9"
        );
    }

    #[test]
    fn parse_rejects_bare_key() {
        assert!(parse_record("novalue").is_err());
        assert!(parse_record("").unwrap().is_empty());
    }
}
