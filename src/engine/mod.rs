//! This module provides the session record store.
//! The only implementation is [`MemStore`], an in-memory concurrent map with lazy expiry and
//! optional replication of every local mutation. Alternate backing stores only need to implement
//! the [`Store`] trait to be usable by the protocol engine and servers.
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Result, STORE_DATA_EXPIRE};

/// A trait for the capabilities of a whoson record store.
///
/// Keys are the canonical string form of an IP address. Implementations must be safe to use
/// from many threads at once, with per-key atomicity.
pub trait Store: Clone + Send + 'static {
    /// stores `data` under `key`, overwriting any existing record, and replicates the write
    /// when replication is enabled. The write is queued for replication first; if that fails
    /// nothing is stored.
    ///
    /// # Errors
    /// `WhosonError::ReplicationClosed` if the replication channel has no receiver
    fn set(&self, key: String, data: StoreData) -> Result<()>;

    /// gets the live record for `key`.
    ///
    /// Returns `None` if there is no record or it has expired, in which case it is removed.
    fn get(&self, key: &str) -> Option<StoreData>;

    /// removes the record for `key`, replicating the deletion when replication is enabled.
    /// Returns `true` if a record existed.
    fn del(&self, key: &str) -> Result<bool>;

    /// a snapshot of every record, expired or not
    fn items(&self) -> Vec<StoreData>;

    /// the number of records currently held
    fn count(&self) -> usize;

    /// stores a record without replicating it (applies a remote or restored write)
    fn sync_set(&self, key: String, data: StoreData);

    /// removes a record without replicating the deletion
    fn sync_del(&self, key: &str) -> bool;

    /// removes the record for `key` only if it is still expired at `now`, replicating the
    /// deletion when one happened. A record refreshed since it was seen expired is kept.
    ///
    /// # Errors
    /// `WhosonError::ReplicationClosed` if the replication channel has no receiver
    fn del_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool>;

    /// as [`Store::del_expired`], without replicating the deletion
    fn sync_del_expired(&self, key: &str, now: DateTime<Utc>) -> bool;

    /// a snapshot of every live record. Expired records found along the way are removed
    /// through the non-replicating path.
    fn live_items(&self) -> Vec<StoreData> {
        let now = Utc::now();
        let mut live = Vec::new();
        for item in self.items() {
            if item.is_expired_at(now) {
                if self.sync_del_expired(&item.key(), now) {
                    info!(ip = %item.ip, "ExpireData");
                }
            } else {
                live.push(item);
            }
        }
        live
    }

    /// the live records serialized as a JSON array of `{Expire, IP, Data}` objects
    fn items_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.live_items())?)
    }
}

/// A single session record: the data associated with an IP until `expire`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreData {
    /// absolute expiry time, RFC 3339 when serialized
    #[serde(rename = "Expire")]
    pub expire: DateTime<Utc>,
    /// the IP this record belongs to
    #[serde(rename = "IP")]
    pub ip: IpAddr,
    /// opaque data set at login time
    #[serde(rename = "Data")]
    pub data: String,
}

impl StoreData {
    /// creates a record for `ip` that expires [`STORE_DATA_EXPIRE`] from now
    pub fn new(ip: IpAddr, data: impl Into<String>) -> Self {
        StoreData {
            expire: fresh_expire(),
            ip,
            data: data.into(),
        }
    }

    /// the store key of this record
    pub fn key(&self) -> String {
        self.ip.to_string()
    }

    /// true once `now` has reached the expiry time
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire
    }

    /// true if the record has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

fn fresh_expire() -> DateTime<Utc> {
    // STORE_DATA_EXPIRE is a small constant, always representable
    Utc::now() + Duration::from_std(STORE_DATA_EXPIRE).unwrap_or_else(|_| Duration::minutes(30))
}

mod mem;
pub mod snapshot;

pub use self::mem::MemStore;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_ip_string() {
        let sd = StoreData::new("10.0.0.1".parse().unwrap(), "test");
        assert_eq!(sd.key(), "10.0.0.1");
    }

    #[test]
    fn fresh_record_expires_in_thirty_minutes() {
        let mut sd = StoreData::new("10.0.0.1".parse().unwrap(), "test");
        assert!(!sd.is_expired());
        assert!(sd.expire > Utc::now() + Duration::minutes(29));
        sd.expire = Utc::now() - Duration::seconds(1);
        assert!(sd.is_expired());
    }

    #[test]
    fn live_items_keep_a_record_refreshed_after_the_snapshot() {
        let store = testing::RefreshingStore::new("10.0.0.1");
        assert!(store.live_items().is_empty());
        assert_eq!(store.inner.get("10.0.0.1").unwrap().data, "fresh");
    }

    #[test]
    fn serializes_with_capitalized_keys() {
        let sd = StoreData::new("10.0.0.1".parse().unwrap(), "user");
        let json = serde_json::to_value(&sd).unwrap();
        assert_eq!(json["IP"], "10.0.0.1");
        assert_eq!(json["Data"], "user");
        assert!(json["Expire"].is_string());
    }
}
