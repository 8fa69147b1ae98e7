//! The key-value storage the vault persists into.
//!
//! The vault does not own a storage engine.  Hosts plug one in by
//! implementing [`Storage`].  Keys are `/`-separated paths; the
//! vault keeps its master key records under `key/`.
//!
//! [`MemoryStorage`] is a process-local implementation suitable for
//! tests and ephemeral vaults.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// A key-value store.
///
/// Implementations must make single-key writes atomic.  No other
/// transactional guarantees are assumed.
pub trait Storage: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;

    /// Removes `key`.  Removing an absent key is not an error.
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Lists the entries directly below `prefix`, in order.
    ///
    /// The prefix is stripped from the returned names.  Entries
    /// further down the hierarchy are folded into their first path
    /// segment, which carries a trailing `/`.
    fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>>;
}

/// An in-memory [`Storage`].
#[derive(Default, Debug)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Returns an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        self.entries().insert(key.into(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let entries = self.entries();
        let mut names: Vec<String> = Vec::new();
        for key in entries.range(prefix.to_string()..).map(|(k, _)| k) {
            let rest = match key.strip_prefix(prefix) {
                Some(rest) => rest,
                None => break,
            };

            let name = match rest.find('/') {
                Some(i) => &rest[..=i],
                None => rest,
            };

            // Keys are sorted, so folded directories are adjacent.
            if names.last().map(|n| n.as_str()) != Some(name) {
                names.push(name.into());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_put_delete() -> anyhow::Result<()> {
        let s = MemoryStorage::new();
        assert!(s.get("key/a")?.is_none());

        s.put("key/a", b"one".to_vec())?;
        assert_eq!(s.get("key/a")?.as_deref(), Some(&b"one"[..]));

        s.put("key/a", b"two".to_vec())?;
        assert_eq!(s.get("key/a")?.as_deref(), Some(&b"two"[..]));
        assert_eq!(s.len(), 1);

        s.delete("key/a")?;
        assert!(s.get("key/a")?.is_none());

        // Deleting again is fine.
        s.delete("key/a")?;
        assert!(s.is_empty());
        Ok(())
    }

    #[test]
    fn list() -> anyhow::Result<()> {
        let s = MemoryStorage::new();
        s.put("key/bob", vec![])?;
        s.put("key/alice", vec![])?;
        s.put("key/team/carol", vec![])?;
        s.put("key/team/dave", vec![])?;
        s.put("other/eve", vec![])?;
        s.put("kez", vec![])?;

        assert_eq!(s.list("key/")?, vec!["alice", "bob", "team/"]);
        assert_eq!(s.list("key/team/")?, vec!["carol", "dave"]);
        assert!(s.list("nothing/")?.is_empty());
        Ok(())
    }
}
