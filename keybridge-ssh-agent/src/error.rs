//! Error types for the SSH agent.

use keybridge_core::RemoteError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("list secrets: {0}")]
    Remote(#[from] RemoteError),

    #[error("get {name:?}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("malformed key {name:?}: {reason}")]
    MalformedKey { name: String, reason: String },

    #[error("agent: key not found")]
    KeyNotFound,

    #[error("agent: already locked")]
    AlreadyLocked,

    #[error("agent: not locked")]
    NotLocked,

    #[error("agent: incorrect passphrase")]
    WrongPassphrase,

    #[error("agent: {0} is not supported")]
    Unsupported(&'static str),

    #[error("signing failed: {0}")]
    Signing(#[from] signature::Error),
}

impl From<Error> for ssh_agent_lib::error::AgentError {
    fn from(err: Error) -> Self {
        Self::other(err)
    }
}
