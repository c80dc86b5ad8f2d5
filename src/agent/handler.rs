//! `AgentRequestHandler`: decodes one framed request, mutates the `KeyStore` as needed,
//! and produces one framed response (`spec.md` §4.2).

use super::protocol::*;
use crate::crypto;
use crate::error::AgentError;
use crate::key::{Key, Rsa1Private, Secret, Ssh2Private, SshVersion};
use crate::key_store::KeyStore;
use crate::passphrase::PassphraseCache;
use crate::wire::{self, Reader};
use rsa::{BigUint, RsaPrivateKey};
use tracing::{debug, warn};

/// The process-wide shared state every entry point is given a reference to (Design
/// Notes: "confine to an `AgentCore` object passed by reference into every entry
/// point; do not expose mutable statics"). `pageant_local` in `spec.md` corresponds to
/// [`crate::config::Config::agent_is_local`] and is not duplicated here.
#[derive(Default)]
pub struct AgentCore {
    pub keys: KeyStore,
    pub passphrases: PassphraseCache,
}

impl AgentCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `body` (everything after the framing length prefix), mutates `self.keys`
    /// as the request demands, and returns one fully framed-body response (caller adds
    /// the length prefix; see [`super::codec`]).
    ///
    /// Never returns an error: any internal failure is logged and converted to the
    /// single-byte `SSH_AGENT_FAILURE` response, per `spec.md` §4.2's "Error rule" and
    /// §7's "FAILURE is the only negative response on the agent wire".
    pub fn handle_request(&mut self, body: &[u8], suppress_logging: bool) -> Vec<u8> {
        let Some((&msg_type, rest)) = body.split_first() else {
            warn!("empty agent request body");
            return failure();
        };

        let result = match msg_type {
            SSH1_AGENTC_REQUEST_RSA_IDENTITIES => Ok(self.request_rsa_identities()),
            SSH1_AGENTC_RSA_CHALLENGE => self.rsa_challenge(rest),
            SSH1_AGENTC_ADD_RSA_IDENTITY => self.add_rsa_identity(rest, suppress_logging),
            SSH1_AGENTC_REMOVE_RSA_IDENTITY => self.remove_rsa_identity(rest),
            SSH1_AGENTC_REMOVE_ALL_RSA_IDENTITIES => {
                self.keys.remove_all(SshVersion::V1);
                Ok(vec![SSH_AGENT_SUCCESS])
            }
            SSH2_AGENTC_REQUEST_IDENTITIES => Ok(self.request_identities()),
            SSH2_AGENTC_SIGN_REQUEST => self.sign_request(rest),
            SSH2_AGENTC_ADD_IDENTITY => self.add_identity(rest, suppress_logging),
            SSH2_AGENTC_REMOVE_IDENTITY => self.remove_identity(rest),
            SSH2_AGENTC_REMOVE_ALL_IDENTITIES => {
                self.keys.remove_all(SshVersion::V2);
                Ok(vec![SSH_AGENT_SUCCESS])
            }
            other => Err(AgentError::UnknownType(other)),
        };

        match result {
            Ok(response) => {
                if !suppress_logging {
                    debug!(msg_type, "agent request handled");
                }
                response
            }
            Err(err) => {
                warn!(msg_type, error = %err, "agent request failed");
                failure()
            }
        }
    }

    fn request_rsa_identities(&self) -> Vec<u8> {
        let mut out = vec![SSH1_AGENT_RSA_IDENTITIES_ANSWER];
        self.keys.enumerate(SshVersion::V1, &mut out);
        out
    }

    fn request_identities(&self) -> Vec<u8> {
        let mut out = vec![SSH2_AGENT_IDENTITIES_ANSWER];
        self.keys.enumerate(SshVersion::V2, &mut out);
        out
    }

    /// `SSH1_AGENTC_RSA_CHALLENGE`: parse `(public-key-no-length, mpint challenge,
    /// 16-byte session id, uint32 response_type)`, locate the key, decrypt, and answer
    /// with `MD5(bytes31..0(response) ‖ session_id)` (`spec.md` §4.2).
    fn rsa_challenge(&self, body: &[u8]) -> Result<Vec<u8>, AgentError> {
        let mut r = Reader::new(body);
        // Raw SSH-1 public key: bits(u32), e(mpint1), n(mpint1) — exponent first.
        let _bits = r.take_u32()?;
        let e = r.take_mpint1()?;
        let n = r.take_mpint1()?;
        let challenge = r.take_mpint1()?;
        let session_id_bytes = r.take_bytes(16)?;
        let response_type = r.take_u32()?;

        if response_type != SSH_AGENT_RSA_RESPONSE_TYPE_1 {
            return Err(AgentError::BadResponseType(response_type));
        }

        let public_blob = reconstruct_ssh1_public_blob(&e, &n);
        let key = self
            .keys
            .find(SshVersion::V1, &public_blob)
            .ok_or(AgentError::KeyNotFound)?;
        let Secret::V1(priv_key) = &key.secret else {
            return Err(AgentError::KeyNotFound);
        };

        let response = crypto::rsa1_decrypt(priv_key, &challenge)?;
        let session_id: [u8; 16] = session_id_bytes.try_into().map_err(|_| AgentError::Truncated)?;
        let digest = crypto::rsa1_response_digest(&response, &session_id);

        let mut out = vec![SSH1_AGENT_RSA_RESPONSE];
        out.extend_from_slice(&digest);
        Ok(out)
    }

    /// `SSH1_AGENTC_ADD_RSA_IDENTITY`: `bits, n, e, d, iqmp, p, q, comment` followed by
    /// the usual verify → add → `keylist_update()` sequence (`spec.md` §4.2 "ADD
    /// operations").
    fn add_rsa_identity(&mut self, body: &[u8], suppress_logging: bool) -> Result<Vec<u8>, AgentError> {
        let mut r = Reader::new(body);
        let bits = r.take_u32()?;
        let n = r.take_mpint1()?;
        let e = r.take_mpint1()?;
        let d = r.take_mpint1()?;
        let _iqmp = r.take_mpint1()?;
        let p = r.take_mpint1()?;
        let q = r.take_mpint1()?;
        let comment = String::from_utf8_lossy(r.take_string()?).into_owned();

        let inner = RsaPrivateKey::from_components(n.clone(), e.clone(), d, vec![p, q])
            .map_err(|_| AgentError::InvalidKey)?;
        crypto::rsa1_verify(&inner)?;

        let public_blob = reconstruct_ssh1_public_blob(&e, &n);
        if !suppress_logging {
            debug!(comment = %comment, "submitted ssh-1 identity");
        }

        let key = Key {
            ssh_version: SshVersion::V1,
            public_blob,
            comment,
            secret: Secret::V1(Rsa1Private { bits, inner }),
        };

        if self.keys.add(key) {
            notify_keylist_update();
            Ok(vec![SSH_AGENT_SUCCESS])
        } else {
            Err(AgentError::DuplicateKey)
        }
    }

    fn remove_rsa_identity(&mut self, body: &[u8]) -> Result<Vec<u8>, AgentError> {
        let mut r = Reader::new(body);
        let _bits = r.take_u32()?;
        let e = r.take_mpint1()?;
        let n = r.take_mpint1()?;
        let public_blob = reconstruct_ssh1_public_blob(&e, &n);
        self.keys
            .remove(SshVersion::V1, &public_blob)
            .ok_or(AgentError::KeyNotFound)?;
        Ok(vec![SSH_AGENT_SUCCESS])
    }

    /// `SSH2_AGENTC_SIGN_REQUEST`: `(string keyblob, string data, optional uint32
    /// flags)`. Unknown flag bits are rejected before signing is ever invoked
    /// (`spec.md` §4.2, testable property §8.6).
    fn sign_request(&self, body: &[u8]) -> Result<Vec<u8>, AgentError> {
        let mut r = Reader::new(body);
        let keyblob = r.take_string()?.to_vec();
        let data = r.take_string()?.to_vec();
        let flags = r.take_u32_or_default();

        let key = self
            .keys
            .find(SshVersion::V2, &keyblob)
            .ok_or(AgentError::KeyNotFound)?;

        if flags & !key.supported_flags() != 0 {
            return Err(AgentError::UnsupportedFlags(flags));
        }

        let Secret::V2(secret) = &key.secret else {
            return Err(AgentError::KeyNotFound);
        };

        let (sig_bytes, alg_name) = crypto::ssh2_sign(secret, &data, flags)?;

        let mut signature_blob = Vec::new();
        wire::append_string(&mut signature_blob, alg_name.as_bytes());
        wire::append_string(&mut signature_blob, &sig_bytes);

        let mut out = vec![SSH2_AGENT_SIGN_RESPONSE];
        wire::append_string(&mut out, &signature_blob);
        Ok(out)
    }

    /// `SSH2_AGENTC_ADD_IDENTITY`: `(string alg, <alg-specific private fields>, string
    /// comment)`. Only `ssh-rsa` and `ssh-ed25519` are recognized; anything else is an
    /// unsupported algorithm and fails like any other parse error (`spec.md` §4.2).
    fn add_identity(&mut self, body: &[u8], suppress_logging: bool) -> Result<Vec<u8>, AgentError> {
        let mut r = Reader::new(body);
        let alg = String::from_utf8_lossy(r.take_string()?).into_owned();

        let (secret, public_blob) = match alg.as_str() {
            "ssh-rsa" => {
                let n = r.take_string()?.to_vec();
                let e = r.take_string()?.to_vec();
                let d = r.take_string()?.to_vec();
                let iqmp = r.take_string()?.to_vec();
                let p = r.take_string()?.to_vec();
                let q = r.take_string()?.to_vec();
                let _ = iqmp;

                let n = BigUint::from_bytes_be(&n);
                let e = BigUint::from_bytes_be(&e);
                let d = BigUint::from_bytes_be(&d);
                let p = BigUint::from_bytes_be(&p);
                let q = BigUint::from_bytes_be(&q);

                let inner = RsaPrivateKey::from_components(n.clone(), e.clone(), d, vec![p, q])
                    .map_err(|_| AgentError::InvalidKey)?;
                crypto::rsa1_verify(&inner)?;

                let mut blob = Vec::new();
                wire::append_string(&mut blob, b"ssh-rsa");
                wire::append_string(&mut blob, &e.to_bytes_be());
                wire::append_string(&mut blob, &n.to_bytes_be());

                (Ssh2Private::Rsa(inner), blob)
            }
            "ssh-ed25519" => {
                let public = r.take_string()?.to_vec();
                let private = r.take_string()?.to_vec();
                if public.len() != 32 || private.len() < 32 {
                    return Err(AgentError::Truncated);
                }
                let seed: [u8; 32] = private[..32].try_into().unwrap();
                let signing = ed25519_dalek::SigningKey::from_bytes(&seed);

                let mut blob = Vec::new();
                wire::append_string(&mut blob, b"ssh-ed25519");
                wire::append_string(&mut blob, &public);

                (Ssh2Private::Ed25519(signing), blob)
            }
            _ => return Err(AgentError::InvalidKey),
        };

        let comment = String::from_utf8_lossy(r.take_string()?).into_owned();
        if !suppress_logging {
            debug!(comment = %comment, alg = %alg, "submitted ssh-2 identity");
        }

        let key = Key {
            ssh_version: SshVersion::V2,
            public_blob,
            comment,
            secret: Secret::V2(secret),
        };

        if self.keys.add(key) {
            notify_keylist_update();
            Ok(vec![SSH_AGENT_SUCCESS])
        } else {
            Err(AgentError::DuplicateKey)
        }
    }

    fn remove_identity(&mut self, body: &[u8]) -> Result<Vec<u8>, AgentError> {
        let mut r = Reader::new(body);
        let blob = r.take_string()?.to_vec();
        self.keys
            .remove(SshVersion::V2, &blob)
            .ok_or(AgentError::KeyNotFound)?;
        Ok(vec![SSH_AGENT_SUCCESS])
    }
}

/// SSH-1 public blobs are not length-prefixed as a whole; they are `e` then `n`, each
/// as an SSH-1 MP-int (`spec.md` §3 "raw SSH-1 public-RSA serialization with exponent
/// first").
pub fn reconstruct_ssh1_public_blob(e: &BigUint, n: &BigUint) -> Vec<u8> {
    let mut out = Vec::new();
    wire::append_mpint1(&mut out, e);
    wire::append_mpint1(&mut out, n);
    out
}

pub const SSH_AGENT_SUCCESS: u8 = 6;

fn failure() -> Vec<u8> {
    vec![SSH_AGENT_FAILURE]
}

/// Fire-and-forget UI notification that the identity list changed
/// (`spec.md` §4.2 "notify the UI layer via `keylist_update()`"). The UI layer is out
/// of scope (`spec.md` §1); this just logs at debug level so the hook point is visible.
fn notify_keylist_update() {
    debug!("keylist_update");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;

    fn rsa1_key(bits: usize) -> (RsaPrivateKey, BigUint, BigUint) {
        use rsa::traits::PublicKeyParts;
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, bits).unwrap();
        let n = key.n().clone();
        let e = key.e().clone();
        (key, n, e)
    }

    #[test]
    fn ssh1_challenge_response_is_idempotent() {
        let mut core = AgentCore::new();
        let (inner, n, e) = rsa1_key(512);
        let public_blob = reconstruct_ssh1_public_blob(&e, &n);
        core.keys.add(Key {
            ssh_version: SshVersion::V1,
            public_blob: public_blob.clone(),
            comment: "test".into(),
            secret: Secret::V1(Rsa1Private { bits: 512, inner }),
        });

        let plaintext = BigUint::from(424242u64);
        let challenge = plaintext.modpow(&e, &n);
        let session_id = [3u8; 16];

        let build_request = || {
            let mut body = vec![SSH1_AGENTC_RSA_CHALLENGE];
            wire::append_u32(&mut body, 512);
            wire::append_mpint1(&mut body, &e);
            wire::append_mpint1(&mut body, &n);
            wire::append_mpint1(&mut body, &challenge);
            body.extend_from_slice(&session_id);
            wire::append_u32(&mut body, 1);
            body
        };

        let r1 = core.handle_request(&build_request(), false);
        let r2 = core.handle_request(&build_request(), false);
        assert_eq!(r1, r2);
        assert_eq!(r1[0], SSH1_AGENT_RSA_RESPONSE);
        assert_eq!(r1.len(), 17);
    }

    #[test]
    fn ssh1_challenge_wrong_response_type_fails() {
        let mut core = AgentCore::new();
        let (inner, n, e) = rsa1_key(512);
        let public_blob = reconstruct_ssh1_public_blob(&e, &n);
        core.keys.add(Key {
            ssh_version: SshVersion::V1,
            public_blob,
            comment: "test".into(),
            secret: Secret::V1(Rsa1Private { bits: 512, inner }),
        });

        let challenge = BigUint::from(1u64).modpow(&e, &n);
        let mut body = vec![SSH1_AGENTC_RSA_CHALLENGE];
        wire::append_u32(&mut body, 512);
        wire::append_mpint1(&mut body, &e);
        wire::append_mpint1(&mut body, &n);
        wire::append_mpint1(&mut body, &challenge);
        body.extend_from_slice(&[0u8; 16]);
        wire::append_u32(&mut body, 2); // wrong response_type

        let resp = core.handle_request(&body, false);
        assert_eq!(resp, vec![SSH_AGENT_FAILURE]);
    }

    #[test]
    fn unknown_type_fails() {
        let mut core = AgentCore::new();
        let resp = core.handle_request(&[250u8], false);
        assert_eq!(resp, vec![SSH_AGENT_FAILURE]);
    }

    #[test]
    fn empty_body_fails() {
        let mut core = AgentCore::new();
        let resp = core.handle_request(&[], false);
        assert_eq!(resp, vec![SSH_AGENT_FAILURE]);
    }
}
