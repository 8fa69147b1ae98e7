//! Vault configuration.
//!
//! A [`Config`] can be deserialized from the host's configuration
//! file, or assembled with the builder returned by
//! [`KeyVault::configure`]:
//!
//! ```
//! use std::sync::Arc;
//! use sequoia_keyvault::{KeyVault, MemoryStorage};
//!
//! let vault = KeyVault::configure()
//!     .min_key_bits(3072)
//!     .lock_shards(64)
//!     .build(Arc::new(MemoryStorage::new()));
//! assert_eq!(vault.config().min_key_bits(), 3072);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::KeyVault;
use crate::lock::{LockProvider, ShardedLocks, DEFAULT_SHARDS};
use crate::storage::Storage;

/// The smallest RSA modulus the vault accepts, in bits.
pub const MIN_KEY_BITS: usize = 2048;

/// Tunables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    min_key_bits: usize,
    lock_shards: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_key_bits: MIN_KEY_BITS,
            lock_shards: DEFAULT_SHARDS,
        }
    }
}

impl Config {
    /// Returns the minimum key size for master keys and subkeys.
    ///
    /// This is never below [`MIN_KEY_BITS`], whatever the
    /// configuration file says.
    pub fn min_key_bits(&self) -> usize {
        self.min_key_bits.max(MIN_KEY_BITS)
    }

    /// Returns the number of shards of the per-name lock table.
    pub fn lock_shards(&self) -> usize {
        self.lock_shards.max(1)
    }
}

/// Builds a [`KeyVault`].
pub struct Builder {
    config: Config,
    locks: Option<Arc<dyn LockProvider>>,
}

impl Builder {
    pub(crate) fn new() -> Self {
        Builder {
            config: Config::default(),
            locks: None,
        }
    }

    /// Starts from an existing configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Raises the minimum key size.
    ///
    /// Values below [`MIN_KEY_BITS`] have no effect.
    pub fn min_key_bits(mut self, bits: usize) -> Self {
        self.config.min_key_bits = bits.max(MIN_KEY_BITS);
        self
    }

    /// Sets the number of shards of the default lock table.
    ///
    /// Ignored if a lock provider is set.
    pub fn lock_shards(mut self, shards: usize) -> Self {
        self.config.lock_shards = shards.max(1);
        self
    }

    /// Uses `locks` instead of a [`ShardedLocks`] table.
    pub fn lock_provider(mut self, locks: Arc<dyn LockProvider>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Returns the vault, persisting into `storage`.
    pub fn build(self, storage: Arc<dyn Storage>) -> KeyVault {
        let locks = self.locks.unwrap_or_else(|| {
            Arc::new(ShardedLocks::new(self.config.lock_shards()))
        });
        KeyVault::assemble(storage, locks, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.min_key_bits(), 2048);
        assert_eq!(c.lock_shards(), 256);
    }

    #[test]
    fn deserialize_partial() -> anyhow::Result<()> {
        let c: Config = serde_json::from_str(r#"{ "min_key_bits": 4096 }"#)?;
        assert_eq!(c.min_key_bits(), 4096);
        assert_eq!(c.lock_shards(), DEFAULT_SHARDS);

        let c: Config = serde_json::from_str("{}")?;
        assert_eq!(c, Config::default());
        Ok(())
    }

    #[test]
    fn floor_cannot_be_lowered() -> anyhow::Result<()> {
        let c: Config = serde_json::from_str(
            r#"{ "min_key_bits": 512, "lock_shards": 0 }"#)?;
        assert_eq!(c.min_key_bits(), MIN_KEY_BITS);
        assert_eq!(c.lock_shards(), 1);

        let b = Builder::new().min_key_bits(1024);
        assert_eq!(b.config.min_key_bits(), MIN_KEY_BITS);
        Ok(())
    }
}
