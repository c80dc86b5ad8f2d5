//! `KeyLoader`: client-side helper that adds a key file to "the agent", which may be
//! this process (in-process shortcut) or a separately running one reached over the
//! wire protocol (`spec.md` §4.5).

use crate::agent::handler::{AgentCore, SSH_AGENT_SUCCESS};
use crate::agent::protocol::*;
use crate::error::LoadError;
use crate::key::{Key, SshVersion};
use crate::passphrase::PassphraseCache;
use crate::wire::{self, Reader};

/// The concrete key-file parsing/decryption backend is out of this spec's scope
/// (`spec.md` §1: "key-file loaders for SSH-1 and PPK formats... Assumed available").
/// `KeyLoader` only needs the three operations below from it, so callers can plug in
/// a real PEM/PPK loader without `KeyLoader` itself changing.
pub trait KeyFileSource {
    /// Returns `Err` with a human-readable reason if the file is not a recognized
    /// SSH-1 or PPK key file (`spec.md` §4.5 step 1).
    fn probe(&self) -> Result<(), String>;

    /// The public half's wire blob, loadable without a passphrase.
    fn public_blob(&self) -> Result<(SshVersion, Vec<u8>), String>;

    /// `true` if the private half needs a passphrase to decrypt.
    fn is_encrypted(&self) -> bool;

    /// Attempts to decrypt the private half with `passphrase`. `Ok(None)` means the
    /// passphrase was structurally accepted but wrong (try the next candidate);
    /// `Ok(Some(key))` is success; `Err` is a structural parse failure.
    fn decrypt(&self, passphrase: &str) -> Result<Option<Key>, String>;
}

/// Either this process's own `KeyStore` (in-process shortcut) or a remote agent
/// reached over the wire protocol, selected by `Config::agent_is_local`
/// (`spec.md` §2 "selected by a single `agent_is_local` flag").
pub enum AgentTarget<'a> {
    InProcess(&'a mut AgentCore),
    Remote(&'a mut dyn RemoteAgent),
}

/// A synchronous round-trip to an out-of-process agent: send one framed request, await
/// one framed reply. `KeyLoader` only ever does one at a time, so this stays
/// synchronous even though the real listener is async.
pub trait RemoteAgent {
    fn request(&mut self, body: &[u8]) -> std::io::Result<Vec<u8>>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    AlreadyPresent,
    Added,
}

pub struct KeyLoader<'a> {
    pub passphrases: &'a mut PassphraseCache,
}

impl<'a> KeyLoader<'a> {
    pub fn new(passphrases: &'a mut PassphraseCache) -> Self {
        KeyLoader { passphrases }
    }

    /// Runs the full algorithm from `spec.md` §4.5: probe, dedup against the agent's
    /// current identities, decrypt (trying `first_passphrase` then the cache), then
    /// submit an `ADD_*` request.
    pub fn load(
        &mut self,
        file: &dyn KeyFileSource,
        first_passphrase: Option<&str>,
        mut target: AgentTarget<'_>,
    ) -> Result<LoadOutcome, LoadError> {
        file.probe().map_err(LoadError::Failure)?;

        let (version, public_blob) = file.public_blob().map_err(LoadError::Failure)?;

        if self.already_loaded(version, &public_blob, &mut target)? {
            return Ok(LoadOutcome::AlreadyPresent);
        }

        let key = self.decrypt_with_retries(file, first_passphrase)?;

        self.submit_add(key, &mut target)?;
        Ok(LoadOutcome::Added)
    }

    fn already_loaded(
        &self,
        version: SshVersion,
        public_blob: &[u8],
        target: &mut AgentTarget<'_>,
    ) -> Result<bool, LoadError> {
        match target {
            AgentTarget::InProcess(core) => Ok(core.keys.find(version, public_blob).is_some()),
            AgentTarget::Remote(remote) => {
                let req_type = match version {
                    SshVersion::V1 => SSH1_AGENTC_REQUEST_RSA_IDENTITIES,
                    SshVersion::V2 => SSH2_AGENTC_REQUEST_IDENTITIES,
                };
                let reply = remote
                    .request(&[req_type])
                    .map_err(|e| LoadError::Failure(e.to_string()))?;
                let blobs = parse_identity_blobs(version, &reply)
                    .map_err(|_| LoadError::Failure("malformed identities reply".into()))?;
                Ok(blobs.iter().any(|b| b == public_blob))
            }
        }
    }

    /// Loop: caller-provided passphrase first, then each cached passphrase in order.
    /// `NEED_PP` (as `LoadError::NeedPassphrase`) is returned once every candidate has
    /// been exhausted without success (`spec.md` §4.5 step 3).
    fn decrypt_with_retries(&mut self, file: &dyn KeyFileSource, first: Option<&str>) -> Result<Key, LoadError> {
        if !file.is_encrypted() {
            return match file.decrypt("") {
                Ok(Some(key)) => Ok(key),
                Ok(None) => Err(LoadError::Failure("unencrypted key failed to parse".into())),
                Err(e) => Err(LoadError::Failure(e)),
            };
        }

        let candidates: Vec<String> = first
            .into_iter()
            .map(str::to_string)
            .chain(self.passphrases.candidates().map(str::to_string))
            .collect();

        for candidate in &candidates {
            match file.decrypt(candidate) {
                Ok(Some(key)) => {
                    self.passphrases.push_front(candidate.clone());
                    return Ok(key);
                }
                Ok(None) => continue,
                Err(e) => return Err(LoadError::Failure(e)),
            }
        }

        Err(LoadError::NeedPassphrase { comment: "passphrase required".into() })
    }

    fn submit_add(&self, key: Key, target: &mut AgentTarget<'_>) -> Result<(), LoadError> {
        match target {
            AgentTarget::InProcess(core) => {
                if core.keys.add(key) {
                    Ok(())
                } else {
                    Err(LoadError::Failure("key already present".into()))
                }
            }
            AgentTarget::Remote(remote) => {
                let body = build_add_request(&key);
                let reply = remote
                    .request(&body)
                    .map_err(|e| LoadError::Failure(e.to_string()))?;
                match reply.first() {
                    Some(&SSH_AGENT_SUCCESS) => Ok(()),
                    _ => Err(LoadError::Failure("agent rejected ADD request".into())),
                }
            }
        }
    }
}

/// Per-key callback used by the enumeration helper: `(fingerprint, comment, pubkey)`.
pub type EnumerateSink<'a> = dyn FnMut(&str, &str, &[u8]) + 'a;

/// Iterates both key lists via the wire protocol, invoking `sink` per key
/// (`spec.md` §4.5 "Enumeration helper"). Any parse error anywhere in a list aborts the
/// whole call with `FAILURE`.
pub fn enumerate_keys(remote: &mut dyn RemoteAgent, sink: &mut EnumerateSink<'_>) -> Result<(), LoadError> {
    for (version, req_type) in [
        (SshVersion::V1, SSH1_AGENTC_REQUEST_RSA_IDENTITIES),
        (SshVersion::V2, SSH2_AGENTC_REQUEST_IDENTITIES),
    ] {
        let reply = remote
            .request(&[req_type])
            .map_err(|e| LoadError::Failure(e.to_string()))?;
        let entries = parse_identity_entries(version, &reply)
            .map_err(|_| LoadError::Failure("malformed identities reply".into()))?;
        for (blob, comment) in entries {
            let fingerprint = fingerprint_hex(&blob);
            sink(&fingerprint, &comment, &blob);
        }
    }
    Ok(())
}

fn fingerprint_hex(blob: &[u8]) -> String {
    let digest = crate::crypto::md5(blob);
    digest.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
}

fn parse_identity_blobs(version: SshVersion, reply: &[u8]) -> Result<Vec<Vec<u8>>, ()> {
    Ok(parse_identity_entries(version, reply)?.into_iter().map(|(b, _)| b).collect())
}

fn parse_identity_entries(version: SshVersion, reply: &[u8]) -> Result<Vec<(Vec<u8>, String)>, ()> {
    let mut r = Reader::new(reply);
    let _msg_type = r.take_u8().map_err(|_| ())?;
    let count = r.take_u32().map_err(|_| ())? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let blob = match version {
            SshVersion::V1 => {
                // Raw e/n MP-int pair with no outer length; re-encode to get its
                // byte span consumed from the reader.
                let start = r.remaining();
                let e = r.take_mpint1().map_err(|_| ())?;
                let n = r.take_mpint1().map_err(|_| ())?;
                let consumed = start.len() - r.remaining().len();
                let mut blob = Vec::new();
                wire::append_mpint1(&mut blob, &e);
                wire::append_mpint1(&mut blob, &n);
                debug_assert_eq!(blob.len(), consumed);
                blob
            }
            SshVersion::V2 => r.take_string().map_err(|_| ())?.to_vec(),
        };
        let comment = String::from_utf8_lossy(r.take_string().map_err(|_| ())?).into_owned();
        out.push((blob, comment));
    }
    Ok(out)
}

/// Builds an `ADD_*` request body matching what [`crate::agent::handler::AgentCore`]
/// expects to parse (`spec.md` §4.5 step 5: "frames a request and awaits a synchronous
/// agent reply"), mirroring the field order `handler.rs`'s `add_rsa_identity`/
/// `add_identity` consume.
fn build_add_request(key: &Key) -> Vec<u8> {
    use rsa::traits::PrivateKeyParts;

    let mut body = Vec::new();
    match &key.secret {
        crate::key::Secret::V1(rsa1) => {
            let primes = rsa1.inner.primes();
            let (p, q) = (&primes[0], &primes[1]);
            let iqmp = rsa1.inner.crt_coefficient().unwrap_or_default();

            body.push(SSH1_AGENTC_ADD_RSA_IDENTITY);
            wire::append_u32(&mut body, rsa1.bits);
            wire::append_mpint1(&mut body, &key_n(&rsa1.inner));
            wire::append_mpint1(&mut body, &key_e(&rsa1.inner));
            wire::append_mpint1(&mut body, rsa1.inner.d());
            wire::append_mpint1(&mut body, &iqmp);
            wire::append_mpint1(&mut body, p);
            wire::append_mpint1(&mut body, q);
            wire::append_string(&mut body, key.comment.as_bytes());
        }
        crate::key::Secret::V2(crate::key::Ssh2Private::Rsa(inner)) => {
            let primes = inner.primes();
            let (p, q) = (&primes[0], &primes[1]);
            let iqmp = inner.crt_coefficient().unwrap_or_default();

            body.push(SSH2_AGENTC_ADD_IDENTITY);
            wire::append_string(&mut body, b"ssh-rsa");
            wire::append_string(&mut body, &key_n(inner).to_bytes_be());
            wire::append_string(&mut body, &key_e(inner).to_bytes_be());
            wire::append_string(&mut body, &inner.d().to_bytes_be());
            wire::append_string(&mut body, &iqmp.to_bytes_be());
            wire::append_string(&mut body, &p.to_bytes_be());
            wire::append_string(&mut body, &q.to_bytes_be());
            wire::append_string(&mut body, key.comment.as_bytes());
        }
        crate::key::Secret::V2(crate::key::Ssh2Private::Ed25519(signing)) => {
            let public = signing.verifying_key().to_bytes();
            let seed = signing.to_bytes();
            let mut private = Vec::with_capacity(64);
            private.extend_from_slice(&seed);
            private.extend_from_slice(&public);

            body.push(SSH2_AGENTC_ADD_IDENTITY);
            wire::append_string(&mut body, b"ssh-ed25519");
            wire::append_string(&mut body, &public);
            wire::append_string(&mut body, &private);
            wire::append_string(&mut body, key.comment.as_bytes());
        }
    }
    body
}

fn key_n(inner: &rsa::RsaPrivateKey) -> rsa::BigUint {
    use rsa::traits::PublicKeyParts;
    inner.n().clone()
}

fn key_e(inner: &rsa::RsaPrivateKey) -> rsa::BigUint {
    use rsa::traits::PublicKeyParts;
    inner.e().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Rsa1Private, Secret};
    use rsa::RsaPrivateKey;
    use std::cell::RefCell;

    struct FakeFile {
        version: SshVersion,
        blob: Vec<u8>,
        encrypted: bool,
        correct_passphrase: &'static str,
        key: RefCell<Option<Key>>,
    }

    impl KeyFileSource for FakeFile {
        fn probe(&self) -> Result<(), String> {
            Ok(())
        }
        fn public_blob(&self) -> Result<(SshVersion, Vec<u8>), String> {
            Ok((self.version, self.blob.clone()))
        }
        fn is_encrypted(&self) -> bool {
            self.encrypted
        }
        fn decrypt(&self, passphrase: &str) -> Result<Option<Key>, String> {
            if !self.encrypted || passphrase == self.correct_passphrase {
                Ok(self.key.borrow_mut().take())
            } else {
                Ok(None)
            }
        }
    }

    fn fake_key(blob: &[u8]) -> Key {
        let mut rng = rand::thread_rng();
        let inner = RsaPrivateKey::new(&mut rng, 512).unwrap();
        Key {
            ssh_version: SshVersion::V1,
            public_blob: blob.to_vec(),
            comment: "c".into(),
            secret: Secret::V1(Rsa1Private { bits: 512, inner }),
        }
    }

    #[test]
    fn already_present_short_circuits_without_decrypting() {
        let mut core = AgentCore::new();
        core.keys.add(fake_key(b"dup"));

        let file = FakeFile {
            version: SshVersion::V1,
            blob: b"dup".to_vec(),
            encrypted: true,
            correct_passphrase: "unused",
            key: RefCell::new(None),
        };

        let mut cache = PassphraseCache::new();
        let mut loader = KeyLoader::new(&mut cache);
        let outcome = loader
            .load(&file, None, AgentTarget::InProcess(&mut core))
            .unwrap();
        assert_eq!(outcome, LoadOutcome::AlreadyPresent);
    }

    #[test]
    fn need_passphrase_when_all_candidates_wrong() {
        let mut core = AgentCore::new();
        let file = FakeFile {
            version: SshVersion::V1,
            blob: b"fresh".to_vec(),
            encrypted: true,
            correct_passphrase: "right",
            key: RefCell::new(Some(fake_key(b"fresh"))),
        };
        let mut cache = PassphraseCache::new();
        cache.push_front("wrong1".into());
        cache.push_front("wrong2".into());
        let mut loader = KeyLoader::new(&mut cache);

        let err = loader
            .load(&file, Some("also-wrong"), AgentTarget::InProcess(&mut core))
            .unwrap_err();
        assert!(matches!(err, LoadError::NeedPassphrase { .. }));
    }

    #[test]
    fn successful_decrypt_caches_passphrase_once() {
        let mut core = AgentCore::new();
        let file = FakeFile {
            version: SshVersion::V1,
            blob: b"fresh2".to_vec(),
            encrypted: true,
            correct_passphrase: "right",
            key: RefCell::new(Some(fake_key(b"fresh2"))),
        };
        let mut cache = PassphraseCache::new();
        let mut loader = KeyLoader::new(&mut cache);
        let outcome = loader
            .load(&file, Some("right"), AgentTarget::InProcess(&mut core))
            .unwrap();
        assert_eq!(outcome, LoadOutcome::Added);
        assert_eq!(cache.len(), 1);

        // Loading the same passphrase again does not duplicate the cache entry.
        cache.push_front("right".into());
        assert_eq!(cache.len(), 1);
    }

    /// Forwards straight into a real [`AgentCore`], so `build_add_request` is checked
    /// against the actual parser in `agent::handler` rather than a stand-in.
    struct LocalAgentAsRemote<'a>(&'a mut AgentCore);

    impl RemoteAgent for LocalAgentAsRemote<'_> {
        fn request(&mut self, body: &[u8]) -> std::io::Result<Vec<u8>> {
            Ok(self.0.handle_request(body, false))
        }
    }

    #[test]
    fn remote_submit_add_round_trips_through_the_real_handler() {
        let mut core = AgentCore::new();
        let file = FakeFile {
            version: SshVersion::V1,
            blob: b"unused-probe-blob".to_vec(),
            encrypted: false,
            correct_passphrase: "",
            key: RefCell::new(Some(fake_key(b"unused-probe-blob"))),
        };
        let mut cache = PassphraseCache::new();
        let mut loader = KeyLoader::new(&mut cache);
        let mut remote = LocalAgentAsRemote(&mut core);

        let outcome = loader.load(&file, None, AgentTarget::Remote(&mut remote)).unwrap();
        assert_eq!(outcome, LoadOutcome::Added);
        assert_eq!(core.keys.count(SshVersion::V1), 1);
    }
}
