//! Inbound data channel.
//!
//! Other applications deliver structured notifications as URIs such as
//! `sensi://send.data?temp=21&unit=C`. Notifications matching the configured
//! scheme and path are turned into [`DataRecord`]s and appended to an
//! in-memory history; everything else is ignored.
//!
//! Unlike the polling facades, the channel has strict lifecycle checks:
//! starting a started channel or stopping a stopped one is
//! [`BridgeError::InvalidState`].

use super::{Facade, FacadeKind};
use crate::error::{BridgeError, Result};
use crate::platform::{BroadcastHost, NotificationSink, SubscriptionId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use url::Url;

pub const DEFAULT_SCHEME: &str = "sensi";
pub const DEFAULT_PATH: &str = "send.data";

/// Scheme + path literal a notification must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFilter {
    pub scheme: String,
    pub path: String,
}

impl Default for NotificationFilter {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_owned(),
            path: DEFAULT_PATH.to_owned(),
        }
    }
}

impl NotificationFilter {
    pub fn new(scheme: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            path: path.into(),
        }
    }

    /// Extracts the query parameters of `uri` if it matches this filter.
    ///
    /// The path compared is the URI authority followed by its path, with
    /// surrounding slashes removed, so `sensi://send.data` and
    /// `sensi:send.data` both match path `send.data`. For a repeated key the
    /// first value wins.
    #[must_use]
    pub fn extract(&self, uri: &str) -> Option<BTreeMap<String, String>> {
        let url = Url::parse(uri).ok()?;
        if !url.scheme().eq_ignore_ascii_case(&self.scheme) {
            return None;
        }
        let target = format!("{}{}", url.host_str().unwrap_or_default(), url.path());
        if target.trim_matches('/') != self.path.trim_matches('/') {
            return None;
        }
        let mut data = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            data.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
        Some(data)
    }
}

/// One delivered notification.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    pub received_at: DateTime<Utc>,
    pub data: BTreeMap<String, String>,
}

/// Append-only history fed from the broadcast delivery thread.
struct EventQueue {
    filter: NotificationFilter,
    records: RwLock<Vec<Arc<DataRecord>>>,
}

impl EventQueue {
    fn clear(&self) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl NotificationSink for EventQueue {
    fn on_notification(&self, uri: &str) {
        let Some(data) = self.filter.extract(uri) else {
            tracing::trace!(uri, "notification does not match data filter");
            return;
        };
        let record = Arc::new(DataRecord {
            received_at: Utc::now(),
            data,
        });
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.push(record);
        tracing::debug!(count = records.len(), "data record appended");
    }
}

/// Facade over inbound data notifications.
pub struct DataChannelFacade {
    host: Arc<dyn BroadcastHost>,
    queue: Arc<EventQueue>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl DataChannelFacade {
    pub fn new(host: Arc<dyn BroadcastHost>, filter: NotificationFilter) -> Self {
        Self {
            host,
            queue: Arc::new(EventQueue {
                filter,
                records: RwLock::new(Vec::new()),
            }),
            subscription: Mutex::new(None),
        }
    }

    pub fn filter(&self) -> &NotificationFilter {
        &self.queue.filter
    }

    /// The last appended record.
    pub fn most_recent(&self) -> Option<DataRecord> {
        self.queue
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|r| DataRecord::clone(r))
    }

    /// Every record since the last `start()`, oldest first. Does not drain.
    pub fn all(&self) -> Vec<DataRecord> {
        self.queue
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| DataRecord::clone(r))
            .collect()
    }

    /// Host delivery entry point.
    pub fn on_notification(&self, uri: &str) {
        self.queue.on_notification(uri);
    }
}

impl Facade for DataChannelFacade {
    fn kind(&self) -> FacadeKind {
        FacadeKind::DataChannel
    }

    fn start(&self) -> Result<()> {
        let mut subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscription.is_some() {
            return Err(BridgeError::InvalidState(
                "data channel already started".to_owned(),
            ));
        }
        self.queue.clear();
        let sink = Arc::clone(&self.queue) as Arc<dyn NotificationSink>;
        let id = self.host.subscribe(&self.queue.filter, sink)?;
        *subscription = Some(id);
        tracing::info!(
            scheme = %self.queue.filter.scheme,
            path = %self.queue.filter.path,
            "data channel listening"
        );
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let taken = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(id) => {
                self.host.unsubscribe(id);
                tracing::info!("data channel stopped");
                Ok(())
            }
            None => Err(BridgeError::InvalidState(
                "data channel is not started".to_owned(),
            )),
        }
    }

    fn is_started(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
