//! Integration tests: inbound data notifications through the registry.

use std::sync::Arc;

use capbridge::platform::sim::SimHost;
use capbridge::{BridgeError, Facade, FacadeRegistry};

fn setup() -> (Arc<SimHost>, FacadeRegistry) {
    let host = Arc::new(SimHost::new());
    let registry = FacadeRegistry::new(host.clone());
    (host, registry)
}

#[test]
fn records_keep_delivery_order() {
    let (host, registry) = setup();
    let channel = registry.data_channel().expect("data channel");
    channel.start().expect("start");

    for value in ["A", "B", "C"] {
        host.deliver_notification(&format!("sensi://send.data?value={value}"));
    }

    let values: Vec<String> = channel
        .all()
        .into_iter()
        .map(|r| r.data["value"].clone())
        .collect();
    assert_eq!(values, ["A", "B", "C"]);
    assert_eq!(channel.most_recent().expect("most recent").data["value"], "C");

    // all() does not drain.
    assert_eq!(channel.all().len(), 3);
}

#[test]
fn foreign_notifications_are_ignored() {
    let (host, registry) = setup();
    let channel = registry.data_channel().expect("data channel");
    channel.start().expect("start");

    host.deliver_notification("https://send.data?value=X");
    host.deliver_notification("sensi://other.path?value=Y");
    host.deliver_notification("SENSI://send.data?value=Z&value=ignored&unit=m%2Fs");

    let records = channel.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].data["value"], "Z");
    assert_eq!(records[0].data["unit"], "m/s");
}

#[test]
fn no_records_before_first_delivery() {
    let (_host, registry) = setup();
    let channel = registry.data_channel().expect("data channel");
    channel.start().expect("start");
    assert!(channel.most_recent().is_none());
    assert!(channel.all().is_empty());
}

#[test]
fn stop_keeps_history_and_restart_clears_it() {
    let (host, registry) = setup();
    let channel = registry.data_channel().expect("data channel");
    channel.start().expect("start");
    host.deliver_notification("sensi://send.data?value=A");

    channel.stop().expect("stop");
    assert!(matches!(channel.stop(), Err(BridgeError::InvalidState(_))));
    assert_eq!(host.deliver_notification("sensi://send.data?value=B"), 0);
    assert_eq!(channel.all().len(), 1);

    channel.start().expect("restart");
    assert!(channel.all().is_empty());
    assert!(matches!(channel.start(), Err(BridgeError::InvalidState(_))));
}
