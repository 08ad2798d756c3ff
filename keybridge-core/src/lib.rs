//! Shared types for keybridge.
//!
//! The [`SecretsClient`] trait is the seam between the SSH agent and the
//! remote secrets service.  The agent only ever needs two calls from the
//! service: a catalog listing (names and active versions) and a fetch of the
//! active value for one name.

use std::fmt;

use zeroize::Zeroizing;

pub mod config;

/// Version token assigned by the secrets service.
///
/// Versions are opaque to the agent apart from equality: a cached key is
/// reused only when the catalog reports the exact same version for its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SecretVersion(pub u64);

impl fmt::Display for SecretVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for SecretVersion {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// One catalog entry: a secret name and its currently active version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretInfo {
    pub name: String,
    pub active_version: SecretVersion,
}

/// The active value of a secret, as returned by [`SecretsClient::get`].
#[derive(Debug, Clone)]
pub struct SecretValue {
    pub version: SecretVersion,
    pub value: SecretBytes,
}

/// Raw secret bytes, zeroized on drop and redacted in debug output.
pub struct SecretBytes(Zeroizing<Vec<u8>>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBytes([redacted])")
    }
}

impl Clone for SecretBytes {
    fn clone(&self) -> Self {
        Self(Zeroizing::new(self.0.to_vec()))
    }
}

/// Failure talking to the secrets service.
#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("secrets service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("secret not found")]
    NotFound,
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Client for the remote secrets service.
///
/// Implementations must be cheap to share across tasks; the agent holds one
/// behind an `Arc` and may call it from several concurrent refreshes.
#[async_trait::async_trait]
pub trait SecretsClient: Send + Sync + fmt::Debug {
    /// List every secret visible to this client with its active version.
    async fn list(&self) -> Result<Vec<SecretInfo>, RemoteError>;

    /// Fetch the active value of the named secret.
    async fn get(&self, name: &str) -> Result<SecretValue, RemoteError>;
}
