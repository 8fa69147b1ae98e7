//! Encoding and decoding of identities.
//!
//! An [`Identity`] is an OpenPGP certificate whose secret key
//! material the vault manages.  It is persisted as a transferable
//! secret key, i.e. the certificate's packets with the secret key
//! packets in place of the public ones:
//!
//! ```text
//! primary secret key
//!   [ signatures over the primary key ]
//! user id, self-signature       (for each user id)
//! secret subkey, binding sig    (for each subkey)
//! ```
//!
//! Public material is exported ASCII-armored.

use sequoia_openpgp as openpgp;
use openpgp::cert::CertParser;
use openpgp::parse::Parse;
use openpgp::serialize::SerializeInto;
use openpgp::{Cert, Fingerprint, KeyID};

use crate::{Error, Result};

/// A master key, its user ids and its subkeys.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity(Cert);

impl From<Cert> for Identity {
    fn from(cert: Cert) -> Self {
        Identity(cert)
    }
}

impl Identity {
    /// Decodes an identity from a key ring.
    ///
    /// Accepts both binary and ASCII-armored input.  If the key ring
    /// holds more than one certificate, the first one is used.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut parser = CertParser::from_bytes(bytes)
            .map_err(Error::MalformedInput)?;
        match parser.next() {
            Some(Ok(cert)) => Ok(Identity(cert)),
            Some(Err(e)) => Err(Error::MalformedInput(e)),
            None => Err(Error::MalformedInput(
                anyhow::anyhow!("No primary key found"))),
        }
    }

    /// Encodes the public parts, ASCII-armored.
    pub fn encode_public(&self) -> Result<String> {
        let armored = self.0.armored().to_vec()?;
        String::from_utf8(armored).map_err(|e| Error::Other(e.into()))
    }

    /// Encodes the identity including its secret key material.
    ///
    /// Every packet of the certificate is written, not only the
    /// primary key, user ids, subkeys and their self-signatures:
    /// direct-key signatures, revocations, third-party
    /// certifications and user attributes are kept as well.
    ///
    /// Fails with [`Error::NoPrivateKeyMaterial`] if neither the
    /// primary key nor any subkey carries secrets: such an identity
    /// must not be persisted as a private record.
    pub fn encode_private(&self) -> Result<Vec<u8>> {
        if ! self.has_private_key() {
            return Err(Error::NoPrivateKeyMaterial);
        }
        Ok(self.0.as_tsk().to_vec()?)
    }

    /// Returns whether any key has secret key material.
    pub fn has_private_key(&self) -> bool {
        self.0.is_tsk()
    }

    /// Returns the primary key's fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        self.0.fingerprint()
    }

    /// Returns the primary key's key ID.
    pub fn keyid(&self) -> KeyID {
        self.0.keyid()
    }

    /// Returns the certificate.
    pub fn cert(&self) -> &Cert {
        &self.0
    }

    /// Returns the certificate, consuming the identity.
    pub fn into_cert(self) -> Cert {
        self.0
    }
}

/// Formats a fingerprint the way the vault reports it.
pub(crate) fn fingerprint_hex(fp: &Fingerprint) -> String {
    fp.to_hex().to_lowercase()
}
