use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use tracing::debug;

use super::{Store, StoreData};
use crate::sync::ReplicationMessage;
use crate::{Result, WhosonError, SYNC_CHANNEL_SIZE};

/// The in-memory [`Store`] implementation.
///
/// Records live in a sharded concurrent map ([`DashMap`]), so callers never need their own
/// locking. Clones share the same map and replication channel.
///
/// When built with [`MemStore::with_replication`], every `set` and `del` also pushes a
/// [`ReplicationMessage`] onto a bounded channel that is drained by the replication dispatcher.
/// A full channel blocks the writer.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    map: Arc<DashMap<String, StoreData>>,
    sync_tx: Option<Sender<ReplicationMessage>>,
}

impl MemStore {
    /// creates an empty store that does not replicate its writes
    pub fn new() -> Self {
        MemStore::default()
    }

    /// creates an empty store that replicates its writes.
    /// Returns the store along with the receiving end of its replication channel.
    pub fn with_replication() -> (Self, Receiver<ReplicationMessage>) {
        let (tx, rx) = channel::bounded(SYNC_CHANNEL_SIZE);
        let store = MemStore {
            map: Arc::new(DashMap::new()),
            sync_tx: Some(tx),
        };
        (store, rx)
    }

    /// true if local writes are replicated
    pub fn sync_remote(&self) -> bool {
        self.sync_tx.is_some()
    }

    fn replicate(&self, msg: ReplicationMessage) -> Result<()> {
        if let Some(tx) = &self.sync_tx {
            debug!(?msg, "queue replication");
            tx.send(msg).map_err(|_| WhosonError::ReplicationClosed)?;
        }
        Ok(())
    }
}

impl Store for MemStore {
    fn set(&self, key: String, data: StoreData) -> Result<()> {
        let msg = ReplicationMessage::Set {
            ip: data.ip.to_string(),
            data: data.data.clone(),
            expire: data.expire.timestamp(),
        };
        self.replicate(msg)?;
        self.map.insert(key, data);
        Ok(())
    }

    fn get(&self, key: &str) -> Option<StoreData> {
        let now = Utc::now();
        let expired = match self.map.get(key) {
            Some(item) if !item.is_expired_at(now) => return Some(item.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            // a concurrent login may have replaced the expired record in between
            self.map.remove_if(key, |_, item| item.is_expired_at(now));
        }
        None
    }

    fn del(&self, key: &str) -> Result<bool> {
        self.replicate(ReplicationMessage::Del { ip: key.to_string() })?;
        Ok(self.map.remove(key).is_some())
    }

    fn items(&self) -> Vec<StoreData> {
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }

    fn count(&self) -> usize {
        self.map.len()
    }

    fn sync_set(&self, key: String, data: StoreData) {
        self.map.insert(key, data);
    }

    fn sync_del(&self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    fn del_expired(&self, key: &str, now: DateTime<Utc>) -> Result<bool> {
        if !self.sync_del_expired(key, now) {
            return Ok(false);
        }
        self.replicate(ReplicationMessage::Del { ip: key.to_string() })?;
        Ok(true)
    }

    fn sync_del_expired(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.map.remove_if(key, |_, item| item.is_expired_at(now)).is_some()
    }
}
