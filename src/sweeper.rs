//! The expiration sweeper: periodically removes expired records through the replicating
//! delete path.
use std::time::Duration;

use chrono::Utc;
use crossbeam::channel::{self, select};
use tracing::{error, info, instrument};

use crate::engine::Store;
use crate::shutdown::Signal;

/// deletes every expired record of `store` through the replicating `del_expired` path, so
/// sweeps reach the peers like any other logout. A record refreshed after the snapshot is kept.
/// Returns the number of records removed.
pub fn delete_expire_data<S: Store>(store: &S) -> usize {
    let now = Utc::now();
    let mut removed = 0;
    for item in store.items() {
        if item.is_expired_at(now) {
            match store.del_expired(&item.key(), now) {
                Ok(true) => {
                    info!(ip = %item.ip, "ExpireData");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => error!(ip = %item.ip, error = %e, "expire check could not delete"),
            }
        }
    }
    removed
}

/// sweeps `store` every `interval` until `shutdown` fires.
/// A sweep in progress always completes; the signal is only observed between ticks.
#[instrument(skip(store, shutdown))]
pub fn run_expire_checker<S: Store>(store: S, interval: Duration, shutdown: Signal) {
    let ticker = channel::tick(interval);
    info!("runExpireCheckerStart");
    loop {
        select! {
            recv(shutdown.receiver()) -> _ => {
                info!("runExpireCheckerStop");
                return;
            }
            recv(ticker) -> _ => {
                delete_expire_data(&store);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::RefreshingStore;
    use crate::engine::{MemStore, StoreData};
    use crate::shutdown;
    use crate::sync::ReplicationMessage;
    use std::thread;

    fn expired(ip: &str) -> StoreData {
        let mut sd = StoreData::new(ip.parse().unwrap(), "old");
        sd.expire = Utc::now() - chrono::Duration::seconds(5);
        sd
    }

    #[test]
    fn sweep_removes_only_expired_records() {
        let store = MemStore::new();
        store.sync_set("10.0.0.1".to_string(), expired("10.0.0.1"));
        store.sync_set("10.0.0.2".to_string(), StoreData::new("10.0.0.2".parse().unwrap(), "new"));
        assert_eq!(delete_expire_data(&store), 1);
        assert_eq!(store.count(), 1);
        assert!(store.get("10.0.0.2").is_some());
    }

    #[test]
    fn sweep_deletions_are_replicated() {
        let (store, rx) = MemStore::with_replication();
        store.sync_set("10.0.0.1".to_string(), expired("10.0.0.1"));
        delete_expire_data(&store);
        assert_eq!(rx.try_recv().unwrap(), ReplicationMessage::Del { ip: "10.0.0.1".to_string() });
    }

    #[test]
    fn sweep_keeps_a_record_refreshed_after_the_snapshot() {
        let (inner, rx) = MemStore::with_replication();
        let store = RefreshingStore::wrap(inner, "10.0.0.1");
        assert_eq!(delete_expire_data(&store), 0);
        assert_eq!(store.get("10.0.0.1").unwrap().data, "fresh");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn checker_sweeps_on_tick_and_stops_on_shutdown() {
        let store = MemStore::new();
        store.sync_set("10.0.0.1".to_string(), expired("10.0.0.1"));
        let (trigger, signal) = shutdown::channel();
        let checker_store = store.clone();
        let handle = thread::spawn(move || {
            run_expire_checker(checker_store, Duration::from_millis(20), signal)
        });

        let mut waited = 0;
        while store.count() > 0 && waited < 100 {
            thread::sleep(Duration::from_millis(10));
            waited += 1;
        }
        assert_eq!(store.count(), 0);
        trigger.fire();
        handle.join().unwrap();
    }
}
