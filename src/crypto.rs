//! The `Crypto` provider. `spec.md` §1 treats cryptographic primitives as an external
//! collaborator; this module is the concrete (but minimal) backing for that
//! collaborator, built on `rsa`, `md-5`, `sha1`, `sha2`, and `ed25519-dalek` — the same
//! crates `tssh`'s `encrypter.rs` reaches for (sha2, rsa) extended with the legacy SSH-1
//! digest primitives `spec.md` needs.

use crate::error::AgentError;
use crate::key::{Rsa1Private, Ssh2Private};
use md5::{Digest as Md5Digest, Md5};
use rsa::pkcs1v15::{Signature as RsaSignature, SigningKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

/// Decrypts an SSH-1 RSA challenge: raw (unpadded) modular exponentiation with the
/// private exponent, exactly as the legacy protocol performs it (`spec.md` §4.2's
/// `SSH1_AGENTC_RSA_CHALLENGE`: "Decrypt the challenge using the private key").
pub fn rsa1_decrypt(key: &Rsa1Private, challenge: &BigUint) -> Result<[u8; 32], AgentError> {
    let n = key.inner.n();
    let d = key.inner.d();
    let m = challenge.modpow(d, n);

    let mut bytes = m.to_bytes_be();
    if bytes.len() > 32 {
        return Err(AgentError::CryptoFailure);
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    bytes.zeroize_in_place();
    Ok(out)
}

trait ZeroizeInPlace {
    fn zeroize_in_place(&mut self);
}

impl ZeroizeInPlace for Vec<u8> {
    fn zeroize_in_place(&mut self) {
        for b in self.iter_mut() {
            *b = 0;
        }
    }
}

/// `MD5(big_endian_32(response) ‖ session_id)`, per `spec.md` §4.2's SSH-1 challenge
/// rule ("Interpret the 256-bit result in big-endian order, emit bytes 31..0 followed
/// by the session id into MD5") and the original's `put_byte(h, mp_get_byte(response,
/// 31 - i))` / `buffer[i] = bignum_byte(response, 31 - i)`: iterating `i` from 31 down
/// to 0 over a big-endian-indexed integer just re-emits the bytes in the same
/// big-endian order `response` is already stored in (`rsa1_decrypt` fills it via
/// `to_bytes_be`), so no reversal is needed here.
pub fn rsa1_response_digest(response: &[u8; 32], session_id: &[u8; 16]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(response);
    hasher.update(session_id);
    hasher.finalize().into()
}

/// SSH-1 session id: `MD5(host_modulus ‖ server_modulus ‖ cookie)`, moduli emitted
/// big-endian in their minimal byte length (`spec.md` §4.6 "Session id").
pub fn ssh1_session_id(host_modulus: &BigUint, server_modulus: &BigUint, cookie: &[u8; 8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(host_modulus.to_bytes_be());
    hasher.update(server_modulus.to_bytes_be());
    hasher.update(cookie);
    hasher.finalize().into()
}

/// `MD5` convenience over arbitrary bytes, used by the camouflage-password path's test
/// vectors and by ssh1 message authentication fallbacks.
pub fn md5(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Verifies an SSH-1 `ADD_RSA_IDENTITY` private key structurally: recomputing `n` from
/// `p`/`q` and confirming `e*d ≡ 1 (mod λ(n))` is handled by `RsaPrivateKey::from_p_q`
/// plus `validate()`; this wraps that in the vocabulary `spec.md` §4.2 uses ("verify").
pub fn rsa1_verify(key: &RsaPrivateKey) -> Result<(), AgentError> {
    if key.n().bits() == 0 {
        return Err(AgentError::InvalidKey);
    }
    key.validate().map_err(|_| AgentError::InvalidKey)
}

/// Signs `data` with the stated SSH2 sign-request `flags`. Flag validity against the
/// key's `supported_flags()` mask must already have been checked by the caller
/// (`spec.md` §4.2: "MUST reject unknown flag bits" happens before this is invoked).
pub fn ssh2_sign(secret: &Ssh2Private, data: &[u8], flags: u32) -> Result<(Vec<u8>, &'static str), AgentError> {
    match secret {
        Ssh2Private::Ed25519(signing) => {
            use ed25519_dalek::Signer;
            let sig = signing.sign(data);
            Ok((sig.to_bytes().to_vec(), "ssh-ed25519"))
        }
        Ssh2Private::Rsa(key) => {
            let key = key.clone();
            if flags & crate::key::SSH_AGENT_RSA_SHA2_512 != 0 {
                let signing_key = SigningKey::<Sha512>::new(key);
                let sig: RsaSignature = signing_key.sign_with_rng(&mut rand::thread_rng(), data);
                Ok((sig.to_bytes().to_vec(), "rsa-sha2-512"))
            } else if flags & crate::key::SSH_AGENT_RSA_SHA2_256 != 0 {
                let signing_key = SigningKey::<Sha256>::new(key);
                let sig: RsaSignature = signing_key.sign_with_rng(&mut rand::thread_rng(), data);
                Ok((sig.to_bytes().to_vec(), "rsa-sha2-256"))
            } else {
                let signing_key = SigningKey::<Sha1>::new(key);
                let sig: RsaSignature = signing_key.sign_with_rng(&mut rand::thread_rng(), data);
                Ok((sig.to_bytes().to_vec(), "ssh-rsa"))
            }
        }
    }
}

/// Encrypts `data` (expected to be 32 bytes — the XOR'd/plain session-key buffer from
/// `spec.md` §4.6 "Session key") with PKCS#1 v1.5 type-2 padding under the public key
/// `(e, n)`. Used twice, inner-then-outer, by `ssh1::login_machine` to build
/// `CMSG_SESSION_KEY`'s ciphertext.
pub fn pkcs1v15_encrypt(e: &BigUint, n: &BigUint, data: &[u8]) -> Result<Vec<u8>, AgentError> {
    use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
    let key = RsaPublicKey::new(n.clone(), e.clone()).map_err(|_| AgentError::InvalidKey)?;
    key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, data)
        .map_err(|_| AgentError::CryptoFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    #[test]
    fn rsa1_decrypt_is_deterministic() {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 512).unwrap();
        let priv1 = Rsa1Private { bits: 512, inner: key.clone() };
        use rsa::traits::PublicKeyParts;
        let n = priv1.inner.n().clone();
        let e = priv1.inner.e().clone();

        let plain = BigUint::from(1234567u64);
        let challenge = plain.modpow(&e, &n);

        let out1 = rsa1_decrypt(&priv1, &challenge).unwrap();
        let out2 = rsa1_decrypt(&priv1, &challenge).unwrap();
        assert_eq!(out1, out2);

        let recovered = BigUint::from_bytes_be(&out1);
        assert_eq!(recovered, plain);
    }

    #[test]
    fn response_digest_is_idempotent() {
        let response = [7u8; 32];
        let session_id = [9u8; 16];
        let a = rsa1_response_digest(&response, &session_id);
        let b = rsa1_response_digest(&response, &session_id);
        assert_eq!(a, b);
    }

    /// Scenario D's byte-order rule: the response is hashed in the same big-endian order
    /// `rsa1_decrypt` already stores it in, never reversed. An asymmetric fixture (each
    /// byte distinct) makes a reversal change the digest, so a regression that reintroduces
    /// `.reverse()` fails this test instead of hiding behind idempotence.
    #[test]
    fn response_digest_uses_big_endian_order_unreversed() {
        let mut response = [0u8; 32];
        for (i, b) in response.iter_mut().enumerate() {
            *b = i as u8;
        }
        let session_id = [0xAAu8; 16];

        let digest = rsa1_response_digest(&response, &session_id);

        let mut expected_hasher = Md5::new();
        expected_hasher.update(response);
        expected_hasher.update(session_id);
        let expected: [u8; 16] = expected_hasher.finalize().into();
        assert_eq!(digest, expected);

        let mut reversed = response;
        reversed.reverse();
        let mut reversed_hasher = Md5::new();
        reversed_hasher.update(reversed);
        reversed_hasher.update(session_id);
        let reversed_digest: [u8; 16] = reversed_hasher.finalize().into();
        assert_ne!(digest, reversed_digest);
    }
}
