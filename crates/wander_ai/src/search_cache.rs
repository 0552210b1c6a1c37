//! Last-search cache.
//!
//! After a location answer the router records the merged categories, the
//! query and a timestamp in the session store so other views can offer
//! "continue exploring". Entries older than the TTL, or that fail to parse,
//! read as absent.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};
use wander_core::EphemeralStore;

use crate::categories::CategorySet;

pub const KEY_CATEGORIES: &str = "lastSearchCategories";
pub const KEY_QUERY: &str = "lastSearchQuery";
pub const KEY_TIMESTAMP: &str = "lastSearchTimestamp";

/// Default time-to-live for a cached search, in seconds.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// TTL for a configured number of seconds. Values chrono cannot represent
/// fall back to the default.
pub fn ttl_from_secs(secs: u64) -> Duration {
    match i64::try_from(secs).ok().and_then(Duration::try_seconds) {
        Some(ttl) => ttl,
        None => {
            warn!(secs, "Cache TTL out of range, using {DEFAULT_TTL_SECS}s");
            Duration::seconds(DEFAULT_TTL_SECS)
        }
    }
}

/// A cached search as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LastSearch {
    pub categories: Vec<String>,
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

pub struct LastSearchCache {
    store: Arc<dyn EphemeralStore>,
    ttl: RwLock<Duration>,
}

impl LastSearchCache {
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self {
            store,
            ttl: RwLock::new(Duration::seconds(DEFAULT_TTL_SECS)),
        }
    }

    pub fn with_ttl(self, ttl: Duration) -> Self {
        self.set_ttl(ttl);
        self
    }

    pub fn ttl(&self) -> Duration {
        *self.ttl.read()
    }

    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.write() = ttl;
    }

    /// Record a search. Empty category sets are not written.
    pub fn write(&self, categories: &CategorySet, query: &str, now: DateTime<Utc>) {
        if categories.is_empty() {
            return;
        }
        let encoded = match serde_json::to_string(categories) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to encode cached categories: {e}");
                return;
            }
        };
        self.store.set_many(&[
            (KEY_CATEGORIES, encoded),
            (KEY_QUERY, query.to_string()),
            (KEY_TIMESTAMP, now.timestamp_millis().to_string()),
        ]);
        debug!(count = categories.len(), "Last search cached");
    }

    /// The cached search if it is present, well-formed and not older than
    /// the TTL at `now`.
    pub fn read(&self, now: DateTime<Utc>) -> Option<LastSearch> {
        let mut record = self
            .store
            .get_many(&[KEY_TIMESTAMP, KEY_CATEGORIES, KEY_QUERY])
            .into_iter();
        let (stamp, categories, query) = (record.next()??, record.next()??, record.next()??);

        let millis: i64 = stamp.trim().parse().ok()?;
        let timestamp = Utc.timestamp_millis_opt(millis).single()?;
        if now.signed_duration_since(timestamp) > self.ttl() {
            debug!("Last search is stale");
            return None;
        }

        let categories: Vec<String> = serde_json::from_str(&categories).ok()?;

        Some(LastSearch {
            categories,
            query,
            timestamp,
        })
    }

    pub fn clear(&self) {
        self.store.remove(KEY_CATEGORIES);
        self.store.remove(KEY_QUERY);
        self.store.remove(KEY_TIMESTAMP);
    }
}
