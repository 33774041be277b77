//! Dispatches call envelopes onto facades and the output relay.
//!
//! [`CallRouter`] is the only code that touches facades on the
//! interpreter's behalf. Every call gets a reply; nothing here panics on bad
//! input.

use super::contract::{CallEnvelope, CallName, ReplyEnvelope};
use super::flat::{ToFlat, join_records};
use crate::error::{BridgeError, Result};
use crate::facade::FacadeKind;
use crate::facade::location::LocationSource;
use crate::facade::network::NetworkSource;
use crate::facade::sensor::SensorKind;
use crate::output::OutputRelay;
use crate::registry::FacadeRegistry;
use serde_json::{Map, Value, json};
use std::sync::Arc;

type Args = Map<String, Value>;

pub struct CallRouter {
    registry: Arc<FacadeRegistry>,
    relay: Arc<OutputRelay>,
}

impl CallRouter {
    pub fn new(registry: Arc<FacadeRegistry>, relay: Arc<OutputRelay>) -> Self {
        Self { registry, relay }
    }

    pub fn registry(&self) -> &Arc<FacadeRegistry> {
        &self.registry
    }

    pub fn relay(&self) -> &Arc<OutputRelay> {
        &self.relay
    }

    /// Validates and executes one call.
    pub fn route(&self, envelope: &CallEnvelope) -> ReplyEnvelope {
        if let Err(e) = envelope.validate() {
            tracing::warn!(request_id = %envelope.request_id, error = %e, "rejected call envelope");
            return ReplyEnvelope::contract_error(&envelope.request_id, &e);
        }
        tracing::debug!(
            request_id = %envelope.request_id,
            call = envelope.call.as_str(),
            "routing call"
        );
        match self.dispatch(envelope.call, &envelope.args) {
            Ok(value) => ReplyEnvelope::ok(&envelope.request_id, value),
            Err(e) => {
                tracing::debug!(
                    request_id = %envelope.request_id,
                    call = envelope.call.as_str(),
                    error = %e,
                    "call failed"
                );
                ReplyEnvelope::error(&envelope.request_id, &e)
            }
        }
    }

    /// Parses a JSON call line, routes it and serializes the reply.
    ///
    /// Unparseable input yields an error reply with request id
    /// `parse-error`.
    pub fn route_json(&self, raw: &str) -> String {
        let reply = match serde_json::from_str::<CallEnvelope>(raw) {
            Ok(envelope) => self.route(&envelope),
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse call envelope");
                ReplyEnvelope::parse_error(&e)
            }
        };
        serde_json::to_string(&reply).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize reply envelope");
            r#"{"v":1,"request_id":"serialize-error","ok":false,"value":null,"error":"reply serialization failed","error_kind":"json"}"#.to_owned()
        })
    }

    /// Records one line of non-protocol interpreter output.
    pub fn script_output(&self, role: &str, line: &str) {
        self.relay.log(role, line);
    }

    fn dispatch(&self, call: CallName, args: &Args) -> Result<Value> {
        match call {
            CallName::BridgePing => Ok(json!("pong")),
            CallName::BridgeVersion => Ok(json!(env!("CARGO_PKG_VERSION"))),
            CallName::BridgeShutdown => Ok(Value::Bool(true)),
            CallName::FacadeStart => {
                let kind = facade_kind(args)?;
                self.registry.get(kind)?.as_facade().start()?;
                Ok(Value::Bool(true))
            }
            CallName::FacadeStop => {
                let kind = facade_kind(args)?;
                self.registry.get(kind)?.as_facade().stop()?;
                Ok(Value::Bool(true))
            }
            CallName::FacadeStatus => {
                let kind = facade_kind(args)?;
                Ok(Value::Bool(self.registry.get(kind)?.as_facade().is_started()))
            }
            CallName::SensorList => {
                let list = self.registry.sensor()?.sensor_list();
                Ok(Value::String(join_records(&list)))
            }
            CallName::SensorStart => {
                self.registry.sensor()?.start_sensor(sensor_kind(args)?)?;
                Ok(Value::Bool(true))
            }
            CallName::SensorStop => {
                self.registry.sensor()?.stop_sensor(sensor_kind(args)?);
                Ok(Value::Bool(true))
            }
            CallName::SensorPoll => {
                let kind = sensor_kind(args)?;
                Ok(flat_or_null(self.registry.sensor()?.poll(kind).as_deref()))
            }
            CallName::LocationPoll => {
                let source = location_source(args)?;
                Ok(flat_or_null(self.registry.location()?.poll(source).as_deref()))
            }
            CallName::LocationLastKnown => {
                let source = location_source(args)?;
                Ok(flat_or_null(
                    self.registry.location()?.last_known(source)?.as_ref(),
                ))
            }
            CallName::LocationGeocode => {
                let latitude = arg_f64(args, "latitude")?;
                let longitude = arg_f64(args, "longitude")?;
                let max_results = arg_opt_u64(args, "max_results")?.unwrap_or(1);
                let max_results = usize::try_from(max_results).map_err(|_| {
                    BridgeError::InvalidArgument("max_results out of range".to_owned())
                })?;
                let addresses =
                    self.registry
                        .location()?
                        .reverse_geocode(latitude, longitude, max_results)?;
                Ok(Value::String(join_records(&addresses)))
            }
            CallName::BatteryPoll => Ok(flat_or_null(self.registry.battery()?.poll().as_deref())),
            CallName::NetworkPoll => {
                let raw = arg_str(args, "source")?;
                let source = NetworkSource::parse(raw).ok_or_else(|| {
                    BridgeError::InvalidArgument(format!("unknown network source `{raw}`"))
                })?;
                Ok(flat_or_null(self.registry.network()?.poll(source).as_deref()))
            }
            CallName::NetworkWifiScan => {
                let found = self.registry.network()?.wifi_scan()?;
                Ok(Value::String(join_records(&found)))
            }
            CallName::NetworkCellInfo => Ok(flat(&self.registry.network()?.cell_info()?)),
            CallName::NetworkSimInfo => Ok(flat(&self.registry.network()?.sim_info()?)),
            CallName::NetworkPhoneInfo => Ok(flat(&self.registry.network()?.phone_info()?)),
            CallName::NetworkBluetoothInfo => {
                Ok(flat(&self.registry.network()?.bluetooth_info()?))
            }
            CallName::NetworkBluetoothScan => {
                let found = self.registry.network()?.bluetooth_scan()?;
                Ok(Value::String(join_records(&found)))
            }
            CallName::DeviceModeSettings => Ok(flat(&self.registry.device()?.mode_settings()?)),
            CallName::DeviceDisplay => Ok(flat(&self.registry.device()?.display()?)),
            CallName::DeviceVolume => Ok(flat(&self.registry.device()?.volume()?)),
            CallName::SpeechSpeak => {
                let message = arg_str(args, "message")?;
                Ok(Value::Bool(self.registry.speech()?.speak(message)))
            }
            CallName::SpeechIsSpeaking => Ok(Value::Bool(self.registry.speech()?.is_speaking())),
            CallName::SpeechIsMediaPlaying => {
                Ok(Value::Bool(self.registry.speech()?.is_media_playing()))
            }
            CallName::DataMostRecent => Ok(flat_or_null(
                self.registry.data_channel()?.most_recent().as_ref(),
            )),
            CallName::DataAll => {
                let records = self.registry.data_channel()?.all();
                Ok(Value::String(join_records(&records)))
            }
            CallName::OutputLog => {
                let message = arg_str(args, "message")?;
                let tag = arg_opt_str(args, "tag")?.unwrap_or_else(|| self.relay.tag());
                self.relay.log(tag, message);
                Ok(Value::Null)
            }
            CallName::OutputNotice => {
                let message = arg_str(args, "message")?;
                match arg_opt_str(args, "tag")? {
                    Some(tag) => self.relay.emit_tagged(tag, message),
                    None => self.relay.emit(message),
                }
                Ok(Value::Null)
            }
            CallName::OutputPrompt => {
                let message = arg_str(args, "message")?;
                Ok(Value::Bool(self.relay.prompt(message)?))
            }
        }
    }
}

fn flat<T: ToFlat>(value: &T) -> Value {
    Value::String(value.to_flat().to_string())
}

fn flat_or_null<T: ToFlat>(value: Option<&T>) -> Value {
    value.map_or(Value::Null, flat)
}

fn arg_str<'a>(args: &'a Args, key: &str) -> Result<&'a str> {
    arg_opt_str(args, key)?
        .ok_or_else(|| BridgeError::InvalidArgument(format!("missing argument `{key}`")))
}

fn arg_opt_str<'a>(args: &'a Args, key: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(BridgeError::InvalidArgument(format!(
            "argument `{key}` must be a string"
        ))),
    }
}

fn arg_f64(args: &Args, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| BridgeError::InvalidArgument(format!("argument `{key}` must be a number")))
}

fn arg_opt_u64(args: &Args, key: &str) -> Result<Option<u64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            BridgeError::InvalidArgument(format!("argument `{key}` must be a non-negative integer"))
        }),
    }
}

fn facade_kind(args: &Args) -> Result<FacadeKind> {
    let raw = arg_str(args, "facade")?;
    FacadeKind::parse(raw)
        .ok_or_else(|| BridgeError::InvalidArgument(format!("unknown facade `{raw}`")))
}

/// Accepts either the numeric code or the snake_case name.
fn sensor_kind(args: &Args) -> Result<SensorKind> {
    let parsed = match args.get("sensor") {
        Some(Value::Number(n)) => n.as_i64().and_then(SensorKind::from_code),
        Some(Value::String(s)) => SensorKind::parse(s),
        None | Some(Value::Null) => {
            return Err(BridgeError::InvalidArgument(
                "missing argument `sensor`".to_owned(),
            ));
        }
        Some(_) => None,
    };
    parsed.ok_or_else(|| BridgeError::InvalidArgument("unknown sensor".to_owned()))
}

fn location_source(args: &Args) -> Result<LocationSource> {
    let raw = arg_str(args, "source")?;
    LocationSource::parse(raw)
        .ok_or_else(|| BridgeError::InvalidArgument(format!("unknown location source `{raw}`")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::bridge::flat::parse_record;
    use crate::facade::Facade;
    use crate::facade::location::LocationFix;
    use crate::output::MemoryLogSink;
    use crate::platform::sim::SimHost;

    fn router() -> (Arc<SimHost>, Arc<MemoryLogSink>, CallRouter) {
        let host = Arc::new(SimHost::new());
        let registry = Arc::new(FacadeRegistry::new(host.clone()));
        let sink = Arc::new(MemoryLogSink::default());
        let relay = Arc::new(OutputRelay::new("script", sink.clone(), None));
        (host, sink, CallRouter::new(registry, relay))
    }

    fn call(router: &CallRouter, call: CallName, args: Value) -> ReplyEnvelope {
        let args = args.as_object().cloned().unwrap_or_default();
        router.route(&CallEnvelope::new("t-1", call, args))
    }

    #[test]
    fn ping_pongs() {
        let (_, _, router) = router();
        let reply = call(&router, CallName::BridgePing, json!({}));
        assert!(reply.ok);
        assert_eq!(reply.value, json!("pong"));
        assert_eq!(reply.request_id, "t-1");
    }

    #[test]
    fn location_poll_requires_source() {
        let (_, _, router) = router();
        let reply = call(&router, CallName::LocationPoll, json!({}));
        assert!(!reply.ok);
        assert_eq!(reply.error_kind.as_deref(), Some("invalid_argument"));
    }

    #[test]
    fn location_poll_is_null_then_flat() {
        let (host, _, router) = router();
        router.registry().location().unwrap().start().unwrap();

        let reply = call(&router, CallName::LocationPoll, json!({"source": "gps"}));
        assert!(reply.ok);
        assert!(reply.value.is_null());

        host.push_location(
            LocationSource::Gps,
            LocationFix {
                latitude: 47.5,
                longitude: 8.25,
                ..LocationFix::default()
            },
        );
        let reply = call(&router, CallName::LocationPoll, json!({"source": "gps"}));
        let fields = parse_record(reply.value.as_str().unwrap()).unwrap();
        assert!(fields.contains(&("latitude".to_owned(), "47.5".to_owned())));
        assert!(fields.contains(&("longitude".to_owned(), "8.25".to_owned())));

        let other = call(&router, CallName::LocationPoll, json!({"source": "network"}));
        assert!(other.value.is_null());
    }

    #[test]
    fn sensor_accepts_code_or_name() {
        let (_, _, router) = router();
        let by_code = call(&router, CallName::SensorStart, json!({"sensor": 1}));
        assert!(by_code.ok, "{by_code:?}");
        let by_name = call(&router, CallName::SensorStart, json!({"sensor": "light"}));
        assert!(by_name.ok);
        let bad = call(&router, CallName::SensorStart, json!({"sensor": 99}));
        assert_eq!(bad.error_kind.as_deref(), Some("invalid_argument"));
    }

    #[test]
    fn unavailable_subsystem_is_reported_not_panicked() {
        let (host, _, router) = router();
        host.set_unavailable(FacadeKind::Battery, true);
        let reply = call(&router, CallName::BatteryPoll, json!({}));
        assert!(!reply.ok);
        assert_eq!(reply.error_kind.as_deref(), Some("host_subsystem_unavailable"));
    }

    #[test]
    fn output_log_uses_given_tag() {
        let (_, sink, router) = router();
        call(&router, CallName::OutputLog, json!({"message": "hi", "tag": "job"}));
        call(&router, CallName::OutputNotice, json!({"message": "there"}));
        assert_eq!(sink.lines(), vec!["job: hi", "script: there"]);
    }

    #[test]
    fn prompt_without_ui_is_invalid_state() {
        let (_, _, router) = router();
        let reply = call(&router, CallName::OutputPrompt, json!({"message": "ok?"}));
        assert_eq!(reply.error_kind.as_deref(), Some("invalid_state"));
    }

    #[test]
    fn data_channel_double_stop_reports_invalid_state() {
        let (_, _, router) = router();
        let args = json!({"facade": "data"});
        assert!(call(&router, CallName::FacadeStart, args.clone()).ok);
        assert!(call(&router, CallName::FacadeStop, args.clone()).ok);
        let again = call(&router, CallName::FacadeStop, args);
        assert_eq!(again.error_kind.as_deref(), Some("invalid_state"));
    }

    #[test]
    fn bluetooth_scan_needs_adapter_on() {
        use crate::facade::network::{BluetoothDevice, BluetoothInfo};
        let (host, _, router) = router();
        host.set_bluetooth(
            BluetoothInfo {
                enabled: true,
                ..BluetoothInfo::default()
            },
            vec![BluetoothDevice {
                address: "00:11:22:33:44:55".to_owned(),
                name: Some("headset".to_owned()),
                rssi_dbm: Some(-60),
            }],
        );
        let found = call(&router, CallName::NetworkBluetoothScan, json!({}));
        let fields = parse_record(found.value.as_str().unwrap()).unwrap();
        assert!(fields.contains(&("name".to_owned(), "headset".to_owned())));

        host.set_bluetooth(BluetoothInfo::default(), Vec::new());
        let off = call(&router, CallName::NetworkBluetoothScan, json!({}));
        assert_eq!(off.error_kind.as_deref(), Some("invalid_state"));
    }

    #[test]
    fn route_json_reports_parse_errors() {
        let (_, _, router) = router();
        let reply: ReplyEnvelope = serde_json::from_str(&router.route_json("{nope")).unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.request_id, "parse-error");
        assert_eq!(reply.error_kind.as_deref(), Some("contract"));
    }
}
