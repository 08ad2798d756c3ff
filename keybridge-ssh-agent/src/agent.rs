//! The key agent: cached keys, lock state, and refresh from the secrets
//! service.
//!
//! All agent operations and the final step of [`KeyAgent::update`] run under
//! one mutex covering both the lock state and the key store.  Network calls
//! in `update` happen outside it, so a slow secrets service never stalls
//! clients that are listing or signing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use keybridge_core::{SecretVersion, SecretsClient};
use ssh_key::Signature;
use ssh_key::public::KeyData;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::key::{Signer, fingerprint, parse_stored_key};
use crate::keystore::KeyStore;
use crate::lock::LockState;

/// Per-agent log callback.  Receives the same reconciliation and lock
/// messages that are emitted through `tracing`.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Settings for a [`KeyAgent`].
#[derive(Clone)]
pub struct AgentConfig {
    /// Client for the secrets service.
    pub client: Arc<dyn SecretsClient>,
    /// Secret name prefix to serve.  Must be non-empty; a trailing `/` is
    /// added if missing.
    pub prefix: String,
    pub log_sink: Option<LogSink>,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("client", &self.client)
            .field("prefix", &self.prefix)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

/// A key as advertised to clients by [`KeyAgent::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyInfo {
    /// Key type, e.g. `ssh-ed25519`.
    pub format: String,
    pub key: KeyData,
    pub comment: String,
}

/// What a successful [`KeyAgent::update`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Keys carried over because their version did not change.
    pub kept: usize,
    /// Secrets fetched and parsed successfully.
    pub fetched: usize,
    /// Secrets fetched but skipped because they did not hold a usable key.
    pub skipped: usize,
    /// Keys installed in the store.
    pub total: usize,
}

#[derive(Debug, Default)]
struct AgentState {
    lock: LockState,
    keys: KeyStore,
}

/// SSH key agent backed by the secrets service.
///
/// The store starts empty: call [`update`](Self::update) at least once
/// before serving, and again whenever the keys should be re-synced.  The
/// agent never refreshes on its own.
pub struct KeyAgent {
    /// Always ends in `/`.
    prefix: String,
    client: Arc<dyn SecretsClient>,
    log_sink: Option<LogSink>,
    state: Mutex<AgentState>,
}

impl fmt::Debug for KeyAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAgent")
            .field("prefix", &self.prefix)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl KeyAgent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let mut prefix = config.prefix;
        if prefix.is_empty() {
            return Err(Error::Config("empty secret name prefix".to_string()));
        }
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Ok(Self {
            prefix,
            client: config.client,
            log_sink: config.log_sink,
            state: Mutex::new(AgentState::default()),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Keys available to clients.  Empty while the agent is locked.
    pub fn list(&self) -> Vec<PublicKeyInfo> {
        let state = self.state();
        if state.lock.is_locked() {
            return Vec::new();
        }
        state
            .keys
            .iter()
            .map(|record| PublicKeyInfo {
                format: record.format(),
                key: record.public_key().key_data().clone(),
                comment: record.comment.clone(),
            })
            .collect()
    }

    /// Sign `data` with the cached key matching `pubkey`.
    ///
    /// Lock state is not consulted: a locked agent hides its keys from
    /// [`list`](Self::list) but still signs with them.
    pub fn sign(&self, pubkey: &KeyData, data: &[u8]) -> Result<Signature> {
        let fp = fingerprint(pubkey);
        let state = self.state();
        let record = state.keys.get(&fp).ok_or(Error::KeyNotFound)?;
        debug!(fingerprint = %fp, secret = %record.name, data_len = data.len(), "sign");
        record.sign(data)
    }

    /// Keys are only ever loaded from the secrets service.
    pub fn add(&self) -> Result<()> {
        Err(Error::Unsupported("adding keys"))
    }

    /// Drop the key matching `pubkey` from the local cache.  The secret is
    /// left alone and returns on the next [`update`](Self::update).
    pub fn remove(&self, pubkey: &KeyData) -> Result<()> {
        let fp = fingerprint(pubkey);
        let removed = self.state().keys.remove(&fp).ok_or(Error::KeyNotFound)?;
        debug!(fingerprint = %fp, secret = %removed.name, "removed key from cache");
        Ok(())
    }

    /// Drop every key from the local cache.
    pub fn remove_all(&self) {
        self.state().keys.clear();
        debug!("removed all keys from cache");
    }

    pub fn lock(&self, passphrase: &[u8]) -> Result<()> {
        self.state().lock.lock(passphrase)?;
        self.report_info("agent is now locked");
        Ok(())
    }

    pub fn unlock(&self, passphrase: &[u8]) -> Result<()> {
        self.state().lock.unlock(passphrase)?;
        self.report_info("agent is now unlocked");
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.state().lock.is_locked()
    }

    /// Handles for every cached key.
    ///
    /// Like [`sign`](Self::sign), this ignores the lock state.
    pub fn signers(&self) -> Vec<Signer> {
        self.state()
            .keys
            .iter()
            .map(|record| Signer(Arc::clone(record)))
            .collect()
    }

    /// Re-sync the cache with the secrets service.
    ///
    /// Keys whose secret is still listed at the same version are kept as-is;
    /// new and changed secrets are fetched and parsed; secrets no longer
    /// listed are dropped.  A secret that does not hold a usable key is
    /// skipped with a warning.  Any listing or fetch failure aborts the
    /// update and leaves the current cache in place.
    ///
    /// Safe to call concurrently with client access and with itself; the
    /// last update to finish wins.
    pub async fn update(&self) -> Result<UpdateSummary> {
        let mut listed: BTreeMap<String, SecretVersion> = self
            .client
            .list()
            .await?
            .into_iter()
            .filter(|info| info.name.starts_with(&self.prefix))
            .map(|info| (info.name, info.active_version))
            .collect();

        let mut next = self.state().keys.retain_current(&mut listed);
        let mut summary = UpdateSummary {
            kept: next.len(),
            ..UpdateSummary::default()
        };
        for record in next.iter() {
            self.report_debug(&format!(
                "[update] keep {:?} version {}",
                record.name, record.version
            ));
        }

        for name in listed.into_keys() {
            let secret = self
                .client
                .get(&name)
                .await
                .map_err(|source| Error::Fetch {
                    name: name.clone(),
                    source,
                })?;
            self.report_debug(&format!(
                "[update] fetched {name:?} version {}",
                secret.version
            ));

            let record = match parse_stored_key(&name, secret.version, secret.value.as_slice()) {
                Ok(record) => record,
                Err(e) => {
                    summary.skipped += 1;
                    self.report_warn(&format!("[update] skipped invalid key {name:?} ({e})"));
                    continue;
                }
            };
            summary.fetched += 1;
            if let Some(shadowed) = next.insert(Arc::new(record)) {
                self.report_warn(&format!(
                    "[update] {name:?} holds the same key as {:?}",
                    shadowed.name
                ));
            }
        }

        summary.total = next.len();
        self.state().keys = next;
        info!(
            kept = summary.kept,
            fetched = summary.fetched,
            skipped = summary.skipped,
            total = summary.total,
            "key cache updated"
        );
        Ok(summary)
    }

    // The guarded state is replaced or edited in single statements, so a
    // panic elsewhere cannot leave it half-updated.
    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report_debug(&self, msg: &str) {
        debug!("{msg}");
        self.report(msg);
    }

    fn report_info(&self, msg: &str) {
        info!("{msg}");
        self.report(msg);
    }

    fn report_warn(&self, msg: &str) {
        warn!("{msg}");
        self.report(msg);
    }

    fn report(&self, msg: &str) {
        if let Some(sink) = &self.log_sink {
            sink(msg);
        }
    }
}
