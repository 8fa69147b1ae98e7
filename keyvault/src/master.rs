//! Master keys.
//!
//! A master key is created once, either generated by the vault or
//! imported from a key ring that includes secret key material, and
//! is never silently replaced: creating a name that already exists
//! fails.

use std::time::SystemTime;

use serde::Serialize;

use sequoia_openpgp as openpgp;
use openpgp::Cert;
use openpgp::Fingerprint;
use openpgp::Packet;
use openpgp::packet::{Key, UserID};
use openpgp::packet::key::{Key4, PrimaryRole, SecretParts};
use openpgp::packet::signature::SignatureBuilder;
use openpgp::types::{
    Features,
    HashAlgorithm,
    KeyFlags,
    SignatureType,
    SymmetricAlgorithm,
    Timestamp,
};

use crate::codec::{fingerprint_hex, Identity};
use crate::store::StoredKeyRecord;
use crate::{Error, KeyVault, Result};

/// Default size of generated master keys.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Characters that must not appear in user id components.
const USERID_FORBIDDEN: &[char] = &['(', ')', '<', '>', '\0'];

/// Where the master key comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySource {
    /// Generate a fresh RSA key.
    Generate {
        /// The real name of the user id.
        real_name: String,
        /// The email address of the user id.
        email: String,
        /// The comment of the user id.
        comment: String,
        /// The size of the key.
        key_bits: usize,
    },
    /// Import a key ring, armored or binary.
    ///
    /// The key ring must include secret key material.
    Import(Vec<u8>),
}

impl Default for KeySource {
    fn default() -> Self {
        KeySource::Generate {
            real_name: String::new(),
            email: String::new(),
            comment: String::new(),
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

/// Parameters for [`KeyVault::create_master`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MasterKeyParams {
    /// Where the key comes from.
    pub source: KeySource,
    /// Whether the secret key material may be exported.
    pub exportable: bool,
}

impl MasterKeyParams {
    /// Generates a key for the given user id.
    pub fn generate<N, E, C>(real_name: N, email: E, comment: C,
                             key_bits: usize)
        -> Self
        where N: Into<String>, E: Into<String>, C: Into<String>,
    {
        MasterKeyParams {
            source: KeySource::Generate {
                real_name: real_name.into(),
                email: email.into(),
                comment: comment.into(),
                key_bits,
            },
            exportable: false,
        }
    }

    /// Imports the given key ring.
    pub fn import<K: Into<Vec<u8>>>(key: K) -> Self {
        MasterKeyParams {
            source: KeySource::Import(key.into()),
            exportable: false,
        }
    }

    /// Sets the exportable flag.
    pub fn exportable(mut self, exportable: bool) -> Self {
        self.exportable = exportable;
        self
    }
}

/// Public information about a master key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MasterKeyInfo {
    /// The primary key's fingerprint, lowercase hex.
    pub fingerprint: String,
    /// The certificate, ASCII-armored, without secrets.
    pub public_key: String,
    /// Whether the secret key material may be exported.
    pub exportable: bool,
}

impl KeyVault {
    /// Creates the master key `name`.
    ///
    /// Fails with [`Error::AlreadyExists`] if `name` exists.  Returns
    /// the new key's fingerprint.
    pub fn create_master(&self, name: &str, params: &MasterKeyParams)
        -> Result<Fingerprint>
    {
        validate_name(name)?;

        let _guard = self.locks.lock_for(name);
        if self.store.get(name)?.is_some() {
            return Err(Error::AlreadyExists(name.into()));
        }

        let serialized = match &params.source {
            KeySource::Generate { real_name, email, comment, key_bits } => {
                self.check_key_bits(*key_bits)?;
                let uid = user_id(real_name, comment, email)?;
                generate_identity(uid, *key_bits)?.encode_private()?
            },
            KeySource::Import(key) => {
                if key.is_empty() {
                    return Err(Error::MalformedInput(
                        anyhow::anyhow!("The key value is required \
                                         for imported keys")));
                }
                Identity::decode(key)?.encode_private()?
            },
        };

        // Re-read what we are about to store, so that the fingerprint
        // we return is the one of the persisted identity.
        let fingerprint = Identity::decode(&serialized)?.fingerprint();

        self.store.put(name, &StoredKeyRecord {
            serialized_identity: serialized,
            exportable: params.exportable,
        })?;

        log::info!("Created master key {:?} ({})", name, fingerprint);
        Ok(fingerprint)
    }

    /// Returns the public information about the master key `name`.
    pub fn read_master(&self, name: &str) -> Result<MasterKeyInfo> {
        validate_name(name)?;
        let (identity, exportable) = self.load(name)?;
        log::debug!("Read master key {:?}", name);

        Ok(MasterKeyInfo {
            fingerprint: fingerprint_hex(&identity.fingerprint()),
            public_key: identity.encode_public()?,
            exportable,
        })
    }

    /// Deletes the master key `name` and all of its subkeys.
    ///
    /// Deleting a key that does not exist is not an error.
    pub fn delete_master(&self, name: &str) -> Result<()> {
        validate_name(name)?;

        let _guard = self.locks.lock_for(name);
        self.store.delete(name)?;
        log::info!("Deleted master key {:?}", name);
        Ok(())
    }

    /// Lists the names of the master keys, in order.
    pub fn list_masters(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    /// Returns the identity stored under `name`.
    ///
    /// This is the read path of the operations that use the keys.
    /// It does not take the name's lock.
    pub fn load_identity(&self, name: &str) -> Result<Identity> {
        validate_name(name)?;
        self.load(name).map(|(identity, _)| identity)
    }

    /// Loads and decodes the record `name`.
    pub(crate) fn load(&self, name: &str) -> Result<(Identity, bool)> {
        let record = self.store.get(name)?
            .ok_or_else(|| Error::NotFound(name.into()))?;
        let identity = Identity::decode(&record.serialized_identity)?;
        Ok((identity, record.exportable))
    }

    pub(crate) fn check_key_bits(&self, bits: usize) -> Result<()> {
        let min = self.config.min_key_bits();
        if bits < min {
            return Err(Error::WeakKeyPolicyViolation { bits, min });
        }
        Ok(())
    }
}

/// Checks that `name` is usable as a storage path segment.
///
/// Names consist of ASCII word characters, with dots and dashes
/// allowed everywhere but at the ends.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    let valid = match (name.chars().next(), name.chars().last()) {
        (Some(first), Some(last)) =>
            word(first) && word(last)
            && name.chars().all(|c| word(c) || c == '-' || c == '.'),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.into()))
    }
}

/// Assembles a user id from its components.
///
/// The result has the form `real name (comment) <email>`, leaving
/// out absent components.
pub(crate) fn user_id(real_name: &str, comment: &str, email: &str)
    -> Result<UserID>
{
    for part in [real_name, comment, email] {
        if part.contains(USERID_FORBIDDEN) {
            return Err(Error::InvalidUserID(part.into()));
        }
    }

    let mut uid = String::from(real_name);
    if ! comment.is_empty() {
        if ! uid.is_empty() {
            uid.push(' ');
        }
        uid.push('(');
        uid.push_str(comment);
        uid.push(')');
    }
    if ! email.is_empty() {
        if ! uid.is_empty() {
            uid.push(' ');
        }
        uid.push('<');
        uid.push_str(email);
        uid.push('>');
    }

    Ok(UserID::from(uid))
}

/// Generates an RSA primary key with one self-signed user id.
fn generate_identity(uid: UserID, key_bits: usize) -> Result<Identity> {
    let creation_time: SystemTime = Timestamp::now().into();

    let mut primary: Key<SecretParts, PrimaryRole> =
        Key4::<SecretParts, PrimaryRole>::generate_rsa(key_bits)?.into();
    primary.set_creation_time(creation_time)?;
    let mut signer = primary.clone().into_keypair()
        .map_err(Error::SigningFailure)?;

    let cert = Cert::try_from(vec![Packet::SecretKey(primary)])?;

    let sig = SignatureBuilder::new(SignatureType::PositiveCertification)
        .set_hash_algo(HashAlgorithm::SHA512)
        .set_signature_creation_time(creation_time)?
        .set_key_flags(KeyFlags::empty().set_certification().set_signing())?
        .set_primary_userid(true)?
        .set_features(Features::sequoia())?
        .set_preferred_hash_algorithms(vec![
            HashAlgorithm::SHA512,
            HashAlgorithm::SHA256,
        ])?
        .set_preferred_symmetric_algorithms(vec![
            SymmetricAlgorithm::AES256,
            SymmetricAlgorithm::AES128,
        ])?;
    let sig = uid.bind(&mut signer, &cert, sig)
        .map_err(Error::SigningFailure)?;

    let cert = cert.insert_packets(vec![Packet::from(uid), sig.into()])?;
    Ok(cert.into())
}
