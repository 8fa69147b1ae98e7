//! Error types.

/// Result specialization
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the key vault.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A master key with this name already exists
    #[error("Key already exists: {0}")]
    AlreadyExists(String),
    /// The master key was not found
    #[error("Master key does not exist: {0}")]
    NotFound(String),
    /// The key name is not a valid path segment
    #[error("Invalid key name: {0:?}")]
    InvalidName(String),
    /// The requested key size is below the configured floor
    #[error("Keys < {min} bits are unsafe and not supported (requested {bits})")]
    WeakKeyPolicyViolation {
        /// The requested size.
        bits: usize,
        /// The configured floor.
        min: usize,
    },
    /// Only RSA keys are supported
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),
    /// Only signing subkeys are supported
    #[error("Capabilities other than signing are not yet supported: {0:?}")]
    UnsupportedCapability(Vec<String>),
    /// A user id component contains a forbidden character
    #[error("Invalid User ID component: {0:?}")]
    InvalidUserID(String),
    /// The supplied key material could not be decoded
    #[error("Malformed key material")]
    MalformedInput(#[source] anyhow::Error),
    /// The identity carries no private key packet
    #[error("No private key material present")]
    NoPrivateKeyMaterial,
    /// Creating a binding or certification signature failed
    #[error("Signing failed")]
    SigningFailure(#[source] anyhow::Error),
    /// The key ID could not be parsed
    #[error("Invalid key ID: {0:?}")]
    InvalidKeyID(String),
    /// Zero or more than one key matched the key ID
    #[error("Expected exactly one subkey with ID {key_id}, found {found}")]
    SubkeyNotFound {
        /// The key ID as given.
        key_id: String,
        /// The number of matching keys.
        found: usize,
    },
    /// The key ID refers to a key that is not a subkey with secrets
    #[error("Key ID {0} does not correspond to a subkey")]
    NotASubkey(String),
    /// The subkey's binding signature does not validate
    #[error("Subkey {key_id} has no valid binding signature")]
    InvalidBindingSignature {
        /// The key ID as given.
        key_id: String,
        /// Why the binding was rejected.
        #[source]
        source: anyhow::Error,
    },
    /// The operation is deliberately not supported
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
    /// The storage backend failed
    #[error("Storage failure")]
    StorageFailure(#[source] anyhow::Error),
    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error), // source and Display delegate to anyhow::Error
}

impl Error {
    /// Returns whether the error was caused by the caller's request.
    ///
    /// Client errors are reported back as error responses; everything
    /// else is an internal failure of the vault or its collaborators.
    pub fn is_client_error(&self) -> bool {
        use Error::*;
        match self {
            AlreadyExists(_)
            | NotFound(_)
            | InvalidName(_)
            | WeakKeyPolicyViolation { .. }
            | UnsupportedKeyType(_)
            | UnsupportedCapability(_)
            | InvalidUserID(_)
            | MalformedInput(_)
            | NoPrivateKeyMaterial
            | InvalidKeyID(_)
            | SubkeyNotFound { .. }
            | NotASubkey(_)
            | NotImplemented(_) => true,
            InvalidBindingSignature { .. }
            | SigningFailure(_)
            | StorageFailure(_)
            | Other(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors() {
        assert!(Error::AlreadyExists("k".into()).is_client_error());
        assert!(Error::NoPrivateKeyMaterial.is_client_error());
        assert!(Error::NotImplemented("subkey deletion").is_client_error());
        assert!(! Error::StorageFailure(anyhow::anyhow!("disk on fire"))
                .is_client_error());
        assert!(! Error::SigningFailure(anyhow::anyhow!("no"))
                .is_client_error());
    }

    #[test]
    fn messages() {
        let e = Error::WeakKeyPolicyViolation { bits: 1024, min: 2048 };
        assert_eq!(e.to_string(),
                   "Keys < 2048 bits are unsafe and not supported \
                    (requested 1024)");

        let e = Error::SubkeyNotFound { key_id: "AB".into(), found: 0 };
        assert_eq!(e.to_string(),
                   "Expected exactly one subkey with ID AB, found 0");
    }
}
