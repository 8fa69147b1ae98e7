//! Signing subkeys.
//!
//! A subkey is bound to its master key by two signatures:
//!
//!   - the *primary key binding* signature (the "back signature"),
//!     made by the subkey over the primary key, and
//!   - the *subkey binding* signature, made by the primary key over
//!     the subkey, which carries the back signature as an embedded
//!     signature subpacket.
//!
//! Only together do they prove that whoever bound the subkey
//! controls both secret keys.  Without the back signature, anyone
//! could claim a victim's signing key as a subkey of their own
//! certificate.
//!
//! Binding rewrites the whole master key record.  The record is
//! only written after both signatures have been made; a failed
//! binding leaves the stored identity untouched.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use sequoia_openpgp as openpgp;
use openpgp::{Fingerprint, KeyHandle, KeyID, Packet};
use openpgp::cert::prelude::*;
use openpgp::packet::{Key, Signature};
use openpgp::packet::key::{
    Key4,
    PrimaryRole,
    PublicParts,
    SecretParts,
    SubordinateRole,
};
use openpgp::packet::signature::SignatureBuilder;
use openpgp::policy::StandardPolicy;
use openpgp::types::{
    HashAlgorithm,
    KeyFlags,
    PublicKeyAlgorithm,
    SignatureType,
    Timestamp,
};

use crate::codec::Identity;
use crate::master::validate_name;
use crate::store::StoredKeyRecord;
use crate::{Error, KeyVault, Result};

/// Default size of generated subkeys.
pub const DEFAULT_SUBKEY_BITS: usize = 4096;

/// Default lifetime of generated subkeys: one year.
pub const DEFAULT_SUBKEY_EXPIRES: u32 = 365 * 24 * 60 * 60;

/// Subkey algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// RSA.
    Rsa,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyType::Rsa => f.write_str("rsa"),
        }
    }
}

impl FromStr for KeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("rsa") {
            Ok(KeyType::Rsa)
        } else {
            Err(Error::UnsupportedKeyType(s.into()))
        }
    }
}

/// What a subkey may be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Making signatures.
    Sign,
    /// Encrypting data, in transit or at rest.
    Encrypt,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Capability::Sign => f.write_str("sign"),
            Capability::Encrypt => f.write_str("encrypt"),
        }
    }
}

/// Parameters for [`KeyVault::bind_subkey`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubkeyParams {
    /// The algorithm.  Only `"rsa"` is supported.
    pub key_type: String,
    /// The capabilities.  Only `["sign"]` is supported.
    pub capabilities: Vec<String>,
    /// The size of the key.
    pub key_bits: usize,
    /// Seconds from now until the subkey expires, 0 for never.
    pub expires: u32,
}

impl Default for SubkeyParams {
    fn default() -> Self {
        SubkeyParams {
            key_type: KeyType::Rsa.to_string(),
            capabilities: vec![Capability::Sign.to_string()],
            key_bits: DEFAULT_SUBKEY_BITS,
            expires: DEFAULT_SUBKEY_EXPIRES,
        }
    }
}

/// Information about a bound subkey.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubkeyInfo {
    /// The algorithm.
    pub key_type: KeyType,
    /// The size of the key.
    pub key_bits: usize,
    /// What the binding signature allows the subkey to be used for.
    pub capabilities: Vec<Capability>,
    /// Seconds from the subkey's creation until it expires, 0 for
    /// never.
    pub expires: u64,
}

impl KeyVault {
    /// Generates a subkey and binds it to the master key `name`.
    ///
    /// Returns the subkey's key ID.  The master key's primary key
    /// must carry secret key material, otherwise the binding fails
    /// with [`Error::SigningFailure`] and the record is left as is.
    pub fn bind_subkey(&self, name: &str, params: &SubkeyParams)
        -> Result<KeyID>
    {
        self.check_key_bits(params.key_bits)?;
        params.key_type.parse::<KeyType>()?;
        if params.capabilities != [Capability::Sign.to_string()] {
            return Err(Error::UnsupportedCapability(
                params.capabilities.clone()));
        }
        validate_name(name)?;

        let _guard = self.locks.lock_for(name);
        let (identity, exportable) = self.load(name)?;

        let validity = match params.expires {
            0 => None,
            secs => Some(Duration::from_secs(secs.into())),
        };
        let (identity, keyid) = bind_rsa_subkey(identity, params.key_bits,
                                                validity)
            .map_err(|e| {
                log::warn!("Binding a subkey to {:?} failed: {}", name, e);
                e
            })?;

        self.store.put(name, &StoredKeyRecord {
            serialized_identity: identity.encode_private()?,
            exportable,
        })?;

        log::info!("Bound subkey {} to master key {:?}", keyid, name);
        Ok(keyid)
    }

    /// Returns information about the subkey `key_id` of the master
    /// key `name`.
    ///
    /// `key_id` is a key ID in hex.  A v4 fingerprint is also
    /// accepted.
    pub fn read_subkey(&self, name: &str, key_id: &str)
        -> Result<SubkeyInfo>
    {
        let handle = parse_key_handle(key_id)?;
        validate_name(name)?;

        let (identity, _) = self.load(name)?;
        log::debug!("Reading subkey {} of {:?}", key_id, name);
        subkey_info(&identity, &handle, key_id)
    }

    /// Deleting subkeys is not supported.
    pub fn delete_subkey(&self, _name: &str, _key_id: &str) -> Result<()> {
        Err(Error::NotImplemented("subkey deletion"))
    }

    /// Listing subkeys is not supported.
    pub fn list_subkeys(&self, _name: &str) -> Result<Vec<KeyID>> {
        Err(Error::NotImplemented("subkey listing"))
    }
}

/// Parses a key ID or v4 fingerprint in hex.
fn parse_key_handle(key_id: &str) -> Result<KeyHandle> {
    let invalid = || Error::InvalidKeyID(key_id.into());

    match key_id.len() {
        16 => match KeyID::from_hex(key_id) {
            Ok(id @ KeyID::V4(_)) => Ok(id.into()),
            _ => Err(invalid()),
        },
        40 => match Fingerprint::from_hex(key_id) {
            Ok(fp @ Fingerprint::V4(_)) => Ok(fp.into()),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

/// Generates an RSA signing subkey and binds it to `identity`.
///
/// The subkey and both signatures are created at the same instant.
fn bind_rsa_subkey(identity: Identity, key_bits: usize,
                   validity: Option<Duration>)
    -> Result<(Identity, KeyID)>
{
    let cert = identity.into_cert();
    let primary = cert.primary_key().key();
    if ! primary.has_secret() {
        return Err(Error::SigningFailure(anyhow::anyhow!(
            "The primary key has no secret key material")));
    }
    let mut primary_signer = primary.clone().parts_into_secret()
        .and_then(|k| k.into_keypair())
        .map_err(Error::SigningFailure)?;

    let creation_time: SystemTime = Timestamp::now().into();
    let mut subkey: Key<SecretParts, SubordinateRole> =
        Key4::<SecretParts, SubordinateRole>::generate_rsa(key_bits)?.into();
    subkey.set_creation_time(creation_time)?;
    let keyid = subkey.keyid();

    // The subkey consents first; the primary's binding embeds that.
    let backsig = primary_key_binding(&subkey, primary, creation_time,
                                      validity)
        .map_err(Error::SigningFailure)?;

    let binding = SignatureBuilder::new(SignatureType::SubkeyBinding)
        .set_hash_algo(HashAlgorithm::SHA512)
        .set_signature_creation_time(creation_time)
        .and_then(|b| b.set_key_flags(KeyFlags::empty().set_signing()))
        .and_then(|b| b.set_key_validity_period(validity))
        .and_then(|b| b.set_issuer(primary.keyid()))
        .and_then(|b| b.set_issuer_fingerprint(primary.fingerprint()))
        .and_then(|b| b.set_embedded_signature(backsig))
        .and_then(|b| subkey.bind(&mut primary_signer, &cert, b))
        .map_err(Error::SigningFailure)?;

    let cert = cert.insert_packets(vec![
        Packet::SecretSubkey(subkey),
        binding.into(),
    ])?;

    Ok((cert.into(), keyid))
}

/// Makes the subkey's back signature over the primary key.
fn primary_key_binding(subkey: &Key<SecretParts, SubordinateRole>,
                       primary: &Key<PublicParts, PrimaryRole>,
                       creation_time: SystemTime,
                       validity: Option<Duration>)
    -> openpgp::Result<Signature>
{
    let mut subkey_signer = subkey.clone().into_keypair()?;

    SignatureBuilder::new(SignatureType::PrimaryKeyBinding)
        .set_hash_algo(HashAlgorithm::SHA512)
        .set_signature_creation_time(creation_time)?
        .set_key_validity_period(validity)?
        .set_issuer(primary.keyid())?
        .sign_primary_key_binding(&mut subkey_signer, primary, subkey)
}

/// Extracts the information about the subkey `handle`.
fn subkey_info(identity: &Identity, handle: &KeyHandle, key_id: &str)
    -> Result<SubkeyInfo>
{
    let policy = StandardPolicy::new();
    let cert = identity.cert();

    let matches: Vec<_> = cert.keys()
        .filter(|ka| ka.key().key_handle().aliases(handle))
        .map(|ka| ka.key().fingerprint())
        .collect();
    if matches.len() != 1 {
        return Err(Error::SubkeyNotFound {
            key_id: key_id.into(),
            found: matches.len(),
        });
    }
    let fingerprint = &matches[0];

    let not_a_subkey = || Error::NotASubkey(key_id.into());
    let ka = cert.keys().subkeys()
        .find(|ka| &ka.key().fingerprint() == fingerprint)
        .ok_or_else(not_a_subkey)?;
    if ! ka.key().has_secret() {
        return Err(not_a_subkey());
    }

    let key = ka.key();
    #[allow(deprecated)]
    let (key_type, key_bits) = match key.pk_algo() {
        PublicKeyAlgorithm::RSAEncryptSign
            | PublicKeyAlgorithm::RSAEncrypt
            | PublicKeyAlgorithm::RSASign =>
            (KeyType::Rsa, key.mpis().bits().unwrap_or(0)),
        algo => return Err(Error::UnsupportedKeyType(algo.to_string())),
    };

    let vka = ka.clone().with_policy(&policy, None)
        .map_err(|source| Error::InvalidBindingSignature {
            key_id: key_id.into(),
            source,
        })?;
    let binding = vka.binding_signature();

    let mut capabilities = Vec::new();
    if let Some(flags) = binding.key_flags() {
        if flags.for_signing() {
            capabilities.push(Capability::Sign);
        }
        if flags.for_transport_encryption() || flags.for_storage_encryption() {
            capabilities.push(Capability::Encrypt);
        }
    }

    Ok(SubkeyInfo {
        key_type,
        key_bits,
        capabilities,
        expires: binding.key_validity_period()
            .map(|d| d.as_secs())
            .unwrap_or(0),
    })
}
