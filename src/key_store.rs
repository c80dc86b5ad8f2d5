//! The ordered, process-wide index of loaded keys (`spec.md` §4.1).

use crate::key::{Key, SshVersion};
use crate::wire;
use std::collections::BTreeMap;

/// Sort key: `(ssh_version, public_blob)`, version ascending then lexicographic on the
/// raw blob bytes — the store's only ordering rule (`spec.md` §4.1).
type StoreKey = (u8, Vec<u8>);

/// An ordered map keyed by `(ssh_version, public_blob)`. `BTreeMap` gives the ordered
/// position queries `nth`/`count` need without a separate index structure, and keeps
/// insertion trivially single-threaded (`spec.md` §5: "no lock is needed under
/// single-thread discipline").
#[derive(Default)]
pub struct KeyStore {
    keys: BTreeMap<StoreKey, Key>,
}

impl KeyStore {
    pub fn new() -> Self {
        KeyStore { keys: BTreeMap::new() }
    }

    fn store_key(version: SshVersion, blob: &[u8]) -> StoreKey {
        (version as u8, blob.to_vec())
    }

    /// Number of keys with the given version.
    pub fn count(&self, version: SshVersion) -> usize {
        self.range(version).count()
    }

    fn range(&self, version: SshVersion) -> impl Iterator<Item = (&StoreKey, &Key)> {
        let v = version as u8;
        self.keys.range((v, Vec::new())..(v + 1, Vec::new()))
    }

    /// The i-th key of the given version in sort order, if any.
    pub fn nth(&self, version: SshVersion, i: usize) -> Option<&Key> {
        self.range(version).nth(i).map(|(_, k)| k)
    }

    /// Inserts `key` if `(version, public_blob)` is absent. Returns `false` on a
    /// duplicate — the caller retains ownership of `key` in that case (it is simply
    /// dropped by the caller, per `spec.md`'s "does not take ownership... caller must
    /// free", which in Rust just means we hand it back instead of storing it).
    pub fn add(&mut self, key: Key) -> bool {
        let sk = Self::store_key(key.ssh_version, &key.public_blob);
        if self.keys.contains_key(&sk) {
            return false;
        }
        self.keys.insert(sk, key);
        true
    }

    pub fn find(&self, version: SshVersion, blob: &[u8]) -> Option<&Key> {
        self.keys.get(&Self::store_key(version, blob))
    }

    /// Removes and returns the key, if present, so the caller can let it drop (which
    /// zeroizes its secret material, see `crate::key`).
    pub fn remove(&mut self, version: SshVersion, blob: &[u8]) -> Option<Key> {
        self.keys.remove(&Self::store_key(version, blob))
    }

    /// Removes every key of the given version, dropping (and so zeroizing) each.
    pub fn remove_all(&mut self, version: SshVersion) {
        let v = version as u8;
        let start = (v, Vec::new());
        let end = (v + 1, Vec::new());
        let doomed: Vec<StoreKey> = self
            .keys
            .range(start..end)
            .map(|(k, _)| k.clone())
            .collect();
        for k in doomed {
            self.keys.remove(&k);
        }
    }

    /// Writes `uint32 count` then, per key, the wire layout appropriate to `version`:
    /// SSH-1 emits the raw public blob with no extra length prefix (it is already a
    /// self-delimiting MP-int pair); SSH-2 emits a length-prefixed string.
    pub fn enumerate(&self, version: SshVersion, out: &mut Vec<u8>) {
        let keys: Vec<&Key> = self.range(version).map(|(_, k)| k).collect();
        wire::append_u32(out, keys.len() as u32);
        for key in keys {
            match version {
                SshVersion::V1 => out.extend_from_slice(&key.public_blob),
                SshVersion::V2 => wire::append_string(out, &key.public_blob),
            }
            wire::append_string(out, key.comment.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Rsa1Private, Secret};
    use rsa::RsaPrivateKey;

    fn dummy_v1(blob: &[u8], comment: &str) -> Key {
        let mut rng = rand::thread_rng();
        let inner = RsaPrivateKey::new(&mut rng, 512).unwrap();
        Key {
            ssh_version: SshVersion::V1,
            public_blob: blob.to_vec(),
            comment: comment.to_string(),
            secret: Secret::V1(Rsa1Private { bits: 512, inner }),
        }
    }

    #[test]
    fn add_find_remove_roundtrip() {
        let mut store = KeyStore::new();
        let k = dummy_v1(b"blob-a", "k1");
        assert!(store.add(k));
        assert!(store.find(SshVersion::V1, b"blob-a").is_some());
        let removed = store.remove(SshVersion::V1, b"blob-a");
        assert!(removed.is_some());
        assert!(store.find(SshVersion::V1, b"blob-a").is_none());
    }

    #[test]
    fn duplicate_add_rejected() {
        let mut store = KeyStore::new();
        assert!(store.add(dummy_v1(b"blob-a", "k1")));
        assert!(!store.add(dummy_v1(b"blob-a", "k1-dup")));
        assert_eq!(store.count(SshVersion::V1), 1);
    }

    #[test]
    fn count_matches_population() {
        let mut store = KeyStore::new();
        store.add(dummy_v1(b"aaa", "a"));
        store.add(dummy_v1(b"bbb", "b"));
        store.add(dummy_v1(b"ccc", "c"));
        assert_eq!(store.count(SshVersion::V1), 3);
        assert_eq!(store.count(SshVersion::V2), 0);
    }

    #[test]
    fn ordering_is_lexicographic_on_blob() {
        let mut store = KeyStore::new();
        store.add(dummy_v1(b"zzz", "z"));
        store.add(dummy_v1(b"aaa", "a"));
        store.add(dummy_v1(b"mmm", "m"));
        assert_eq!(store.nth(SshVersion::V1, 0).unwrap().public_blob, b"aaa");
        assert_eq!(store.nth(SshVersion::V1, 1).unwrap().public_blob, b"mmm");
        assert_eq!(store.nth(SshVersion::V1, 2).unwrap().public_blob, b"zzz");
    }

    #[test]
    fn enumerate_round_trips_blob_and_comment() {
        let mut store = KeyStore::new();
        store.add(dummy_v1(b"aaa", "comment-a"));
        store.add(dummy_v1(b"bbb", "comment-b"));

        let mut out = Vec::new();
        store.enumerate(SshVersion::V1, &mut out);

        let mut r = wire::Reader::new(&out);
        let count = r.take_u32().unwrap();
        assert_eq!(count, 2);

        // SSH-1 layout has no length prefix on the blob; since both fixture blobs are
        // fixed-width 3 bytes this parses unambiguously for the test.
        let blob1 = r.take_bytes(3).unwrap().to_vec();
        let comment1 = r.take_string().unwrap().to_vec();
        let blob2 = r.take_bytes(3).unwrap().to_vec();
        let comment2 = r.take_string().unwrap().to_vec();

        assert_eq!(blob1, b"aaa");
        assert_eq!(comment1, b"comment-a");
        assert_eq!(blob2, b"bbb");
        assert_eq!(comment2, b"comment-b");
    }
}
