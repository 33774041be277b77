//! Integration tests: registry construction, poll semantics and facade
//! start/stop against the simulated host.

use std::sync::{Arc, Barrier};
use std::thread;

use capbridge::facade::battery::{BatteryStatus, ChargeState};
use capbridge::facade::location::{LocationFix, LocationSource};
use capbridge::facade::sensor::{SensorKind, SensorReading};
use capbridge::platform::sim::SimHost;
use capbridge::{BridgeError, Facade, FacadeKind, FacadeRegistry};

fn battery(level_pct: u8) -> BatteryStatus {
    BatteryStatus {
        level_pct,
        charge: ChargeState::Discharging,
        present: true,
        technology: "Li-ion".to_owned(),
        ..BatteryStatus::default()
    }
}

#[test]
fn concurrent_first_access_constructs_exactly_once() {
    let host = Arc::new(SimHost::new());
    let registry = Arc::new(FacadeRegistry::new(host.clone()));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.location().expect("location facade")
            })
        })
        .collect();

    let facades: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    for facade in &facades[1..] {
        assert!(Arc::ptr_eq(&facades[0], facade));
    }
    assert_eq!(host.bindings(FacadeKind::Location), 1);
}

#[test]
fn failed_construction_is_retried_on_next_access() {
    let host = Arc::new(SimHost::new());
    let registry = FacadeRegistry::new(host.clone());

    host.set_unavailable(FacadeKind::Speech, true);
    assert!(matches!(
        registry.speech(),
        Err(BridgeError::HostSubsystemUnavailable { .. })
    ));
    assert!(registry.constructed().is_empty());

    host.set_unavailable(FacadeKind::Speech, false);
    let speech = registry.speech().expect("speech after host recovered");
    assert!(Arc::ptr_eq(&speech, &registry.speech().expect("speech")));
}

#[test]
fn poll_returns_none_until_first_update_then_latest() {
    let host = Arc::new(SimHost::new());
    let registry = FacadeRegistry::new(host.clone());
    let facade = registry.battery().expect("battery facade");
    facade.start().expect("start");

    assert!(facade.poll().is_none());

    assert_eq!(host.push_battery(battery(80)), 1);
    let first = facade.poll().expect("first reading");
    assert_eq!(first.reading.level_pct, 80);

    host.push_battery(battery(79));
    let second = facade.poll().expect("second reading");
    assert_eq!(second.reading.level_pct, 79);
    assert!(second.received_at >= first.received_at);
}

#[test]
fn sources_are_cached_independently() {
    let host = Arc::new(SimHost::new());
    let registry = FacadeRegistry::new(host.clone());
    let location = registry.location().expect("location facade");
    location.start().expect("start");

    host.push_location(
        LocationSource::Gps,
        LocationFix {
            latitude: 51.5,
            longitude: -0.12,
            ..LocationFix::default()
        },
    );
    assert!(location.poll(LocationSource::Gps).is_some());
    assert!(location.poll(LocationSource::Network).is_none());
}

#[test]
fn duplicate_start_registers_listeners_once() {
    let host = Arc::new(SimHost::new());
    let registry = FacadeRegistry::new(host.clone());
    let sensors = registry.sensor().expect("sensor facade");

    sensors.start().expect("first start");
    let after_first = host.active_subscriptions();
    sensors.start().expect("second start");
    assert_eq!(host.active_subscriptions(), after_first);

    let delivered = host.push_sensor(
        SensorKind::Accelerometer,
        SensorReading {
            timestamp_ns: 1,
            accuracy: 3,
            values: vec![0.0, 9.81, 0.0],
        },
    );
    assert_eq!(delivered, 1);
}

#[test]
fn double_stop_is_harmless_and_keeps_cache() {
    let host = Arc::new(SimHost::new());
    let registry = FacadeRegistry::new(host.clone());
    let facade = registry.battery().expect("battery facade");
    facade.start().expect("start");
    host.push_battery(battery(55));

    facade.stop().expect("first stop");
    facade.stop().expect("second stop");
    assert!(!facade.is_started());
    assert_eq!(host.active_subscriptions(), 0);

    assert_eq!(host.push_battery(battery(10)), 0);
    assert_eq!(facade.poll().expect("cached reading").reading.level_pct, 55);
}

#[test]
fn stop_all_stops_only_started_facades() {
    let host = Arc::new(SimHost::new());
    let registry = FacadeRegistry::new(host.clone());
    registry.battery().expect("battery").start().expect("start");
    registry.network().expect("network");

    registry.stop_all();

    assert_eq!(registry.constructed().len(), 2);
    assert!(
        registry
            .constructed()
            .iter()
            .all(|h| !h.as_facade().is_started())
    );
    assert_eq!(host.active_subscriptions(), 0);
}
