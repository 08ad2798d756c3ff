//! In-memory key store.
//!
//! The [`KeyStore`] maps SHA-256 fingerprints to parsed keys.  It is owned by
//! the [`KeyAgent`](crate::agent::KeyAgent), which replaces it wholesale on
//! every successful refresh and edits it in place only for client removals.
//!
//! The fingerprint, not the secret name, is the identity of a key: two
//! secrets holding the same key material collapse into one entry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use keybridge_core::SecretVersion;
use tracing::debug;

use crate::key::KeyRecord;

#[derive(Debug, Default)]
pub struct KeyStore {
    entries: HashMap<String, Arc<KeyRecord>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key, replacing and returning any entry with the same
    /// fingerprint.
    pub fn insert(&mut self, record: Arc<KeyRecord>) -> Option<Arc<KeyRecord>> {
        debug!(
            fingerprint = %record.fingerprint,
            secret = %record.name,
            "keystore: adding key"
        );
        self.entries.insert(record.fingerprint.clone(), record)
    }

    pub fn get(&self, fingerprint: &str) -> Option<&Arc<KeyRecord>> {
        self.entries.get(fingerprint)
    }

    pub fn remove(&mut self, fingerprint: &str) -> Option<Arc<KeyRecord>> {
        self.entries.remove(fingerprint)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<KeyRecord>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Carry over every key whose secret is still listed at the same version.
    ///
    /// Names satisfied from the store are removed from `listed`, leaving only
    /// the secrets that are new or have changed and must be fetched.
    pub fn retain_current(&self, listed: &mut BTreeMap<String, SecretVersion>) -> KeyStore {
        let mut kept = KeyStore::new();
        for (fingerprint, record) in &self.entries {
            if listed.get(&record.name) == Some(&record.version) {
                listed.remove(&record.name);
                kept.entries.insert(fingerprint.clone(), Arc::clone(record));
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::parse_stored_key;

    const TEST_KEY: &[u8] = include_bytes!("../testdata/test.key");
    const DEMO_KEY: &[u8] = include_bytes!("../testdata/demo.key");

    fn record(name: &str, version: u64, data: &[u8]) -> Arc<KeyRecord> {
        Arc::new(parse_stored_key(name, SecretVersion(version), data).unwrap())
    }

    #[test]
    fn insert_and_lookup_by_fingerprint() {
        let mut store = KeyStore::new();
        let rec = record("a", 1, TEST_KEY);
        let fp = rec.fingerprint.clone();
        assert!(store.insert(rec).is_none());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&fp).unwrap().name, "a");
        assert!(store.get("SHA256:nope").is_none());
    }

    #[test]
    fn same_key_under_two_names_is_one_entry() {
        let mut store = KeyStore::new();
        store.insert(record("a", 1, TEST_KEY));
        let replaced = store.insert(record("b", 1, TEST_KEY));

        assert_eq!(replaced.unwrap().name, "a");
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter().next().unwrap().name, "b");
    }

    #[test]
    fn remove_and_clear() {
        let mut store = KeyStore::new();
        let rec = record("a", 1, TEST_KEY);
        let fp = rec.fingerprint.clone();
        store.insert(rec);
        store.insert(record("b", 1, DEMO_KEY));

        assert!(store.remove(&fp).is_some());
        assert!(store.remove(&fp).is_none());
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn retain_current_keeps_only_unchanged_versions() {
        let mut store = KeyStore::new();
        let unchanged = record("p/a", 1, TEST_KEY);
        store.insert(Arc::clone(&unchanged));
        store.insert(record("p/b", 1, DEMO_KEY));

        let mut listed = BTreeMap::from([
            ("p/a".to_string(), SecretVersion(1)),
            ("p/b".to_string(), SecretVersion(2)),
            ("p/c".to_string(), SecretVersion(1)),
        ]);
        let kept = store.retain_current(&mut listed);

        assert_eq!(kept.len(), 1);
        let carried = kept.get(&unchanged.fingerprint).unwrap();
        assert!(Arc::ptr_eq(carried, &unchanged));
        assert_eq!(
            listed.keys().map(String::as_str).collect::<Vec<_>>(),
            ["p/b", "p/c"]
        );
        // The source store is untouched.
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn retain_current_drops_delisted_names() {
        let mut store = KeyStore::new();
        store.insert(record("p/gone", 4, TEST_KEY));

        let mut listed = BTreeMap::new();
        let kept = store.retain_current(&mut listed);
        assert!(kept.is_empty());
    }
}
