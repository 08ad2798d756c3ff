//! Test fixtures shared by the unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use keybridge_core::{
    RemoteError, SecretBytes, SecretInfo, SecretValue, SecretVersion, SecretsClient,
};
use ssh_key::PublicKey;

use crate::agent::LogSink;

// Throwaway keys generated for these tests and used nowhere else:
//
//     ssh-keygen -t ed25519 -C "Dummy key for testing" -N "" -f testdata/test.key
pub(crate) const TEST_KEY: &[u8] = include_bytes!("../testdata/test.key");
pub(crate) const TEST_PUB: &str = include_str!("../testdata/test.key.pub");
pub(crate) const DEMO_KEY: &[u8] = include_bytes!("../testdata/demo.key");
pub(crate) const DEMO_PUB: &str = include_str!("../testdata/demo.key.pub");
pub(crate) const RSA_KEY: &[u8] = include_bytes!("../testdata/rsa.key");

pub(crate) fn public_key(openssh: &str) -> PublicKey {
    PublicKey::from_openssh(openssh.trim()).unwrap()
}

#[derive(Debug, Default)]
struct FakeState {
    secrets: BTreeMap<String, (SecretVersion, Vec<u8>)>,
    failing_gets: HashSet<String>,
    fail_list: bool,
    list_calls: usize,
    get_calls: Vec<String>,
}

/// In-memory secrets service that counts calls and fails on request.
#[derive(Debug, Default)]
pub(crate) struct FakeSecrets {
    state: Mutex<FakeState>,
}

impl FakeSecrets {
    /// Store `value` under `name` as a new active version.
    pub(crate) fn put(&self, name: &str, value: &[u8]) -> SecretVersion {
        let mut state = self.state.lock().unwrap();
        let next = state
            .secrets
            .get(name)
            .map_or(SecretVersion(1), |(v, _)| SecretVersion(v.0 + 1));
        state
            .secrets
            .insert(name.to_string(), (next, value.to_vec()));
        next
    }

    pub(crate) fn delete(&self, name: &str) {
        self.state.lock().unwrap().secrets.remove(name);
    }

    pub(crate) fn fail_get(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_gets
            .insert(name.to_string());
    }

    pub(crate) fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub(crate) fn get_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().get_calls.clone()
    }
}

#[async_trait::async_trait]
impl SecretsClient for FakeSecrets {
    async fn list(&self) -> Result<Vec<SecretInfo>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_list {
            return Err(RemoteError::Http("connection refused".to_string()));
        }
        Ok(state
            .secrets
            .iter()
            .map(|(name, (version, _))| SecretInfo {
                name: name.clone(),
                active_version: *version,
            })
            .collect())
    }

    async fn get(&self, name: &str) -> Result<SecretValue, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.get_calls.push(name.to_string());
        if state.failing_gets.contains(name) {
            return Err(RemoteError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        let (version, value) = state.secrets.get(name).ok_or(RemoteError::NotFound)?;
        Ok(SecretValue {
            version: *version,
            value: SecretBytes::new(value.clone()),
        })
    }
}

/// Collects messages written to an agent's log sink.
#[derive(Clone, Default)]
pub(crate) struct LogCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    pub(crate) fn sink(&self) -> LogSink {
        let lines = Arc::clone(&self.lines);
        Arc::new(move |msg: &str| lines.lock().unwrap().push(msg.to_string()))
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}
