//! Loading and saving a [`Store`] to a JSON snapshot file.
//!
//! The file holds a JSON array of `{Expire, IP, Data}` objects, indented with two spaces.
//! An empty store is saved as an empty file.
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{info, warn};

use super::{Store, StoreData};
use crate::Result;

/// loads the records in the snapshot file at `path` into `store` through the non-replicating
/// path, skipping records that have already expired.
/// Returns the number of records admitted.
///
/// A missing or empty file loads nothing. A file that is not valid JSON is logged and ignored.
///
/// # Errors
/// IO errors other than a missing file, and JSON that is valid but has the wrong shape
pub fn load<S: Store>(store: &S, path: &Path) -> Result<usize> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(?path, "no snapshot file to load");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(0);
    }

    let records: Vec<StoreData> = match serde_json::from_str(&content) {
        Ok(records) => records,
        Err(e) if e.is_syntax() || e.is_eof() => {
            warn!(?path, error = %e, "snapshot file is not valid JSON, ignoring it");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let mut loaded = 0;
    for record in records.into_iter().filter(|r| !r.is_expired()) {
        store.sync_set(record.key(), record);
        loaded += 1;
    }
    info!(?path, loaded, "snapshot loaded");
    Ok(loaded)
}

/// saves the live records of `store` into the snapshot file at `path`, replacing its content.
/// Returns the number of records saved.
pub fn save<S: Store>(store: &S, path: &Path) -> Result<usize> {
    let records = store.live_items();
    if records.is_empty() {
        fs::write(path, "")?;
    } else {
        fs::write(path, to_indented_json(&records)?)?;
    }
    info!(?path, saved = records.len(), "snapshot saved");
    Ok(records.len())
}

/// serializes `value` as JSON indented with two spaces
pub(crate) fn to_indented_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"  "));
    value.serialize(&mut ser)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemStore;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    #[test]
    fn save_then_load_keeps_live_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gowhoson.json");

        let store = MemStore::new();
        store.sync_set("10.0.0.1".to_string(), StoreData::new("10.0.0.1".parse().unwrap(), "alice"));
        store.sync_set("10.0.0.2".to_string(), StoreData::new("10.0.0.2".parse().unwrap(), "bob"));
        assert_eq!(save(&store, &path).unwrap(), 2);
        assert!(fs::read_to_string(&path).unwrap().contains("\n  {"));

        let restored = MemStore::new();
        assert_eq!(load(&restored, &path).unwrap(), 2);
        assert_eq!(restored.get("10.0.0.2").unwrap().data, "bob");
    }

    #[test]
    fn empty_store_saves_an_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gowhoson.json");
        assert_eq!(save(&MemStore::new(), &path).unwrap(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert_eq!(load(&MemStore::new(), &path).unwrap(), 0);
    }

    #[test]
    fn load_skips_expired_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gowhoson.json");
        let past = (Utc::now() - Duration::minutes(1)).to_rfc3339();
        let future = (Utc::now() + Duration::minutes(10)).to_rfc3339();
        let json = format!(
            r#"[{{"Expire":"{}","IP":"10.0.0.1","Data":"old"}},{{"Expire":"{}","IP":"10.0.0.2","Data":"new"}}]"#,
            past, future
        );
        fs::write(&path, json).unwrap();

        let store = MemStore::new();
        assert_eq!(load(&store, &path).unwrap(), 1);
        assert!(store.get("10.0.0.1").is_none());
        assert_eq!(store.get("10.0.0.2").unwrap().data, "new");
    }

    #[test]
    fn missing_or_garbled_files_load_nothing() {
        let dir = TempDir::new().unwrap();
        let store = MemStore::new();
        assert_eq!(load(&store, &dir.path().join("absent.json")).unwrap(), 0);

        let garbled = dir.path().join("garbled.json");
        fs::write(&garbled, "[{").unwrap();
        assert_eq!(load(&store, &garbled).unwrap(), 0);
    }
}
