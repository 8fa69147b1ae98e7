//! A vault for OpenPGP master keys.
//!
//! The vault keeps named master keys with their secret key material
//! and binds signing subkeys to them.  Master keys are generated or
//! imported; their secrets stay in the vault unless the key is
//! marked exportable.  Subkeys are bound with a cross-signed binding
//! signature, so that they can be handed out for signing while the
//! master key never leaves the vault.
//!
//! Records are persisted through a [`Storage`] backend.  Mutations
//! of a master key are serialized per name by a [`LockProvider`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use sequoia_keyvault::{KeyVault, MemoryStorage};
//! use sequoia_keyvault::{MasterKeyParams, SubkeyParams};
//! # fn main() -> sequoia_keyvault::Result<()> {
//!
//! let vault = KeyVault::new(Arc::new(MemoryStorage::new()));
//!
//! vault.create_master("release", &MasterKeyParams::generate(
//!     "Release Signing", "release@example.org", "", 2048))?;
//!
//! let keyid = vault.bind_subkey("release", &SubkeyParams {
//!     key_bits: 2048,
//!     ..Default::default()
//! })?;
//!
//! let info = vault.read_subkey("release", &keyid.to_hex())?;
//! assert_eq!(info.key_bits, 2048);
//! assert_eq!(info.capabilities.len(), 1);
//! # Ok(()) }
//! ```

#![warn(missing_docs)]

use std::sync::Arc;

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{Builder, Config};
pub mod codec;
pub use codec::Identity;
pub mod storage;
pub use storage::{MemoryStorage, Storage};
pub mod store;
pub use store::{KeyStore, StoredKeyRecord};
pub mod lock;
pub use lock::{LockProvider, ShardedLocks};
pub mod master;
pub use master::{KeySource, MasterKeyInfo, MasterKeyParams};
pub mod subkey;
pub use subkey::{Capability, KeyType, SubkeyInfo, SubkeyParams};

/// Manages named master keys and their subkeys.
///
/// The vault is `Send` and `Sync`; share it between threads with an
/// [`Arc`] or by reference.
pub struct KeyVault {
    store: KeyStore,
    locks: Arc<dyn LockProvider>,
    config: Config,
}

impl KeyVault {
    /// Returns a vault with the default configuration.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::configure().build(storage)
    }

    /// Returns a vault using `config`.
    pub fn with_config(storage: Arc<dyn Storage>, config: Config) -> Self {
        Self::configure().config(config).build(storage)
    }

    /// Returns a builder for a vault.
    pub fn configure() -> Builder {
        Builder::new()
    }

    pub(crate) fn assemble(storage: Arc<dyn Storage>,
                           locks: Arc<dyn LockProvider>,
                           config: Config)
        -> Self
    {
        KeyVault {
            store: KeyStore::from(storage),
            locks,
            config,
        }
    }

    /// Returns the configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
