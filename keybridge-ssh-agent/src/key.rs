//! Parsed keys served by the agent.

use std::fmt;
use std::sync::Arc;

use keybridge_core::SecretVersion;
use signature::Signer as _;
use ssh_key::public::KeyData;
use ssh_key::{HashAlg, PrivateKey, PublicKey, Signature};

use crate::error::{Error, Result};
use crate::pem::parse_comment;

/// One key fetched from the secrets service.
///
/// Records are immutable once parsed and shared as `Arc<KeyRecord>`, so a
/// refresh that finds the same version can carry the record over without
/// touching the private key.
pub struct KeyRecord {
    /// Secret name in the secrets service.
    pub name: String,
    /// Version of the secret this key was parsed from.
    pub version: SecretVersion,
    /// Public-key comment embedded in the container, or `""`.
    pub comment: String,
    /// SHA-256 fingerprint of the public key (`SHA256:…`).
    pub fingerprint: String,
    public_key: PublicKey,
    // Zeroized on drop by ssh-key.
    private_key: PrivateKey,
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("comment", &self.comment)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl KeyRecord {
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Key type name as used on the wire, e.g. `ssh-ed25519`.
    pub fn format(&self) -> String {
        self.public_key.algorithm().to_string()
    }

    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        Ok(self.private_key.try_sign(data)?)
    }
}

/// SHA-256 fingerprint of a public key, the key store's lookup key.
pub fn fingerprint(key: &KeyData) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

/// Parse the stored value of secret `name` at `version`.
///
/// The value must be a PEM-encoded, unencrypted OpenSSH private key.  A key
/// without a comment is fine; a key that `ssh-key` rejects is not.
pub fn parse_stored_key(name: &str, version: SecretVersion, data: &[u8]) -> Result<KeyRecord> {
    let malformed = |reason: String| Error::MalformedKey {
        name: name.to_string(),
        reason,
    };

    let private_key = PrivateKey::from_openssh(data).map_err(|e| malformed(e.to_string()))?;
    if private_key.is_encrypted() {
        return Err(malformed("passphrase-protected keys are not supported".to_string()));
    }

    let public_key = private_key.public_key().clone();
    Ok(KeyRecord {
        name: name.to_string(),
        version,
        comment: parse_comment(data),
        fingerprint: fingerprint(public_key.key_data()),
        public_key,
        private_key,
    })
}

/// Handle to a cached key, returned by
/// [`KeyAgent::signers`](crate::agent::KeyAgent::signers).
///
/// The handle keeps the key alive even if a later refresh or removal drops
/// it from the store.
#[derive(Clone, Debug)]
pub struct Signer(pub(crate) Arc<KeyRecord>);

impl Signer {
    pub fn public_key(&self) -> &PublicKey {
        self.0.public_key()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn comment(&self) -> &str {
        &self.0.comment
    }

    pub fn fingerprint(&self) -> &str {
        &self.0.fingerprint
    }

    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        self.0.sign(data)
    }
}

#[cfg(test)]
mod tests {
    use signature::Verifier as _;

    use super::*;

    const TEST_KEY: &[u8] = include_bytes!("../testdata/test.key");
    const TEST_PUB: &str = include_str!("../testdata/test.key.pub");
    const NO_COMMENT_KEY: &[u8] = include_bytes!("../testdata/nocomment.key");
    const RSA_KEY: &[u8] = include_bytes!("../testdata/rsa.key");
    const ENCRYPTED_KEY: &[u8] = include_bytes!("../testdata/encrypted.key");

    #[test]
    fn parse_test_key() {
        let key = parse_stored_key("foo", SecretVersion(1), TEST_KEY).unwrap();
        assert_eq!(key.name, "foo");
        assert_eq!(key.version, SecretVersion(1));
        assert_eq!(key.comment, "Dummy key for testing");
        assert_eq!(key.format(), "ssh-ed25519");

        let expected = PublicKey::from_openssh(TEST_PUB.trim()).unwrap();
        assert_eq!(key.public_key().key_data(), expected.key_data());
        assert_eq!(key.fingerprint, fingerprint(expected.key_data()));
        assert!(key.fingerprint.starts_with("SHA256:"));
    }

    #[test]
    fn comment_agrees_with_ssh_key() {
        for data in [TEST_KEY, NO_COMMENT_KEY, RSA_KEY] {
            let key = parse_stored_key("k", SecretVersion(1), data).unwrap();
            let reference = PrivateKey::from_openssh(data).unwrap();
            assert_eq!(key.comment, reference.comment());
        }
    }

    #[test]
    fn missing_comment_does_not_fail_parse() {
        let key = parse_stored_key("bare", SecretVersion(3), NO_COMMENT_KEY).unwrap();
        assert_eq!(key.comment, "");
        assert_eq!(key.format(), "ssh-ed25519");
    }

    #[test]
    fn rsa_key_parses() {
        let key = parse_stored_key("rsa", SecretVersion(1), RSA_KEY).unwrap();
        assert_eq!(key.format(), "ssh-rsa");
        assert_eq!(key.comment, "rsa key for testing");
    }

    #[test]
    fn encrypted_key_is_malformed() {
        let err = parse_stored_key("locked", SecretVersion(1), ENCRYPTED_KEY).unwrap_err();
        assert!(matches!(err, Error::MalformedKey { ref name, .. } if name == "locked"));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_stored_key("junk", SecretVersion(1), b"not a key").unwrap_err();
        assert!(matches!(err, Error::MalformedKey { .. }));
        assert!(err.to_string().contains("junk"));
    }

    #[test]
    fn signature_verifies_against_public_key() {
        let key = parse_stored_key("foo", SecretVersion(1), TEST_KEY).unwrap();
        let signer = Signer(Arc::new(key));
        let data = b"challenge bytes";
        let sig = signer.sign(data).unwrap();
        signer.public_key().key_data().verify(data, &sig).unwrap();
        assert!(signer.public_key().key_data().verify(b"other", &sig).is_err());
    }

    #[test]
    fn debug_omits_private_key() {
        let key = parse_stored_key("foo", SecretVersion(1), TEST_KEY).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("Dummy key for testing"));
        assert!(!debug.contains("private_key"));
    }
}
