//! SSH agent backed by a remote secrets service.
//!
//! Serves private keys stored as secrets under a configured name prefix over
//! the standard OpenSSH agent protocol.  Keys are pulled from the service by
//! [`KeyAgent::update`] and held in memory until the next refresh.
//!
//! # Architecture
//!
//! ```text
//! SecretsClient ◄── list/get ── KeyAgent::update()
//!                                   │ installs
//!                                   ▼
//!                 KeyAgent { LockState, KeyStore }  ◄──── shared Arc
//!                                   ▲
//!                            UnixListener (serve)
//!                                   │
//!                            per-connection
//!                         AgentSession (clone of Arc)
//! ```
//!
//! # Key discovery
//!
//! Every secret whose name starts with `<prefix>/` is treated as an OpenSSH
//! private key.  Secrets whose active version is unchanged since the last
//! refresh are not fetched again.  Values that fail to parse are skipped with
//! a warning; one bad secret never hides the others.

pub mod agent;
pub mod error;
pub mod key;
pub mod keystore;
pub mod lock;
pub mod pem;
pub mod session;

#[cfg(test)]
mod testing;

pub use agent::{AgentConfig, KeyAgent, LogSink, PublicKeyInfo, UpdateSummary};
pub use error::{Error, Result};
pub use key::{KeyRecord, Signer};
pub use keystore::KeyStore;
pub use session::{AgentSession, bind, serve, serve_one};
