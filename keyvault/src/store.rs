//! Persistence of master key records.

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::storage::Storage;
use crate::{Error, Result};

/// Storage prefix of master key records.
pub const KEY_PREFIX: &str = "key/";

/// A persisted master key.
///
/// The record is always written as a whole; it is never patched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKeyRecord {
    /// The identity, encoded with its secret key material.
    #[serde(rename = "SerializedKey", with = "base64_bytes")]
    pub serialized_identity: Vec<u8>,
    /// Whether the secret key material may be exported.
    #[serde(rename = "Exportable")]
    pub exportable: bool,
}

/// Maps key names to [`StoredKeyRecord`]s.
#[derive(Clone)]
pub struct KeyStore {
    storage: Arc<dyn Storage>,
}

impl From<Arc<dyn Storage>> for KeyStore {
    fn from(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

impl KeyStore {
    fn path(name: &str) -> String {
        format!("{}{}", KEY_PREFIX, name)
    }

    /// Returns the record stored under `name`, if any.
    pub fn get(&self, name: &str) -> Result<Option<StoredKeyRecord>> {
        let bytes = match self.storage.get(&Self::path(name))
            .map_err(|e| failure("reading", name, e))?
        {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        serde_json::from_slice(&bytes)
            .with_context(|| format!("Decoding the record of {:?}", name))
            .map(Some)
            .map_err(|e| failure("decoding", name, e))
    }

    /// Stores `record` under `name`, replacing any existing record.
    pub fn put(&self, name: &str, record: &StoredKeyRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)
            .context("Encoding the record")
            .map_err(|e| failure("encoding", name, e))?;
        self.storage.put(&Self::path(name), bytes)
            .map_err(|e| failure("writing", name, e))
    }

    /// Removes the record stored under `name`, if any.
    pub fn delete(&self, name: &str) -> Result<()> {
        self.storage.delete(&Self::path(name))
            .map_err(|e| failure("deleting", name, e))
    }

    /// Lists the names of the stored records, in order.
    pub fn list(&self) -> Result<Vec<String>> {
        self.storage.list(KEY_PREFIX)
            .map_err(|e| failure("listing", "", e))
    }
}

fn failure(what: &str, name: &str, e: anyhow::Error) -> Error {
    log::warn!("Storage failure {} {:?}: {}", what, name, e);
    Error::StorageFailure(e)
}

/// Bytes as base64 strings.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S)
                                    -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D)
                                                  -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, KeyStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = KeyStore::from(storage.clone() as Arc<dyn Storage>);
        (storage, store)
    }

    #[test]
    fn get_nonexistent() -> Result<()> {
        let (_, store) = store();
        assert!(store.get("alice")?.is_none());
        Ok(())
    }

    #[test]
    fn put_get() -> Result<()> {
        let (storage, store) = store();
        let record = StoredKeyRecord {
            serialized_identity: vec![0x99, 0x01, 0x0d],
            exportable: true,
        };
        store.put("alice", &record)?;
        assert_eq!(store.get("alice")?, Some(record));

        // The record lives under the key prefix, in the JSON shape
        // the records have always had.
        let raw = storage.get("key/alice").unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["SerializedKey"], "mQEN");
        assert_eq!(json["Exportable"], true);
        Ok(())
    }

    #[test]
    fn delete_is_idempotent() -> Result<()> {
        let (_, store) = store();
        store.delete("alice")?;

        store.put("alice", &StoredKeyRecord {
            serialized_identity: vec![1, 2, 3],
            exportable: false,
        })?;
        store.delete("alice")?;
        store.delete("alice")?;
        assert!(store.get("alice")?.is_none());
        Ok(())
    }

    #[test]
    fn list() -> Result<()> {
        let (storage, store) = store();
        let record = StoredKeyRecord {
            serialized_identity: vec![],
            exportable: false,
        };
        store.put("bob", &record)?;
        store.put("alice", &record)?;
        storage.put("config", vec![]).unwrap();

        assert_eq!(store.list()?, vec!["alice", "bob"]);
        Ok(())
    }

    #[test]
    fn corrupt_record() -> Result<()> {
        let (storage, store) = store();
        storage.put("key/alice", b"{not json".to_vec()).unwrap();
        assert!(matches!(store.get("alice"),
                         Err(Error::StorageFailure(_))));
        Ok(())
    }
}
