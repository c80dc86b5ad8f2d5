//! The `Key` entity: an identity held by the agent, in either SSH-1 or SSH-2 form.

use rsa::RsaPrivateKey;

/// SSH protocol version a key belongs to. Numeric order matches the KeyStore sort rule
/// in `spec.md` §4.1: version 1 sorts before version 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SshVersion {
    V1 = 1,
    V2 = 2,
}

/// An SSH-1 RSA private key, holding only what the agent needs to answer a challenge:
/// the modulus (for matching/`CMSG_AUTH_RSA`) and the private exponent (for decryption).
///
/// CRT parameters are accepted by [`crate::crypto::Crypto::rsa1_decrypt`] through the
/// full `RsaPrivateKey` so the `rsa` crate can use them, but this struct only exposes
/// what the rest of the agent core needs to reason about: the public modulus.
///
/// `RsaPrivateKey` scrubs its own backing bytes on `Drop`, so this struct needs no
/// zeroizing `Drop` impl of its own beyond what `inner` already does.
#[derive(Clone)]
pub struct Rsa1Private {
    pub bits: u32,
    pub inner: RsaPrivateKey,
}

impl std::fmt::Debug for Rsa1Private {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rsa1Private").field("bits", &self.bits).finish_non_exhaustive()
    }
}

/// An SSH-2 private key. Only RSA and Ed25519 are modeled — the minimal set needed to
/// exercise `spec.md`'s scenarios (A: ed25519 add&list, C: RSA-SHA1/SHA2 sign flags).
///
/// Both `RsaPrivateKey` and `SigningKey` scrub their own backing bytes on `Drop`
/// (the `rsa` and `ed25519-dalek` crates implement `ZeroizeOnDrop` themselves), so
/// `remove`/`remove_all` (`spec.md` §4.1) satisfy "secrets zeroed before release"
/// simply by dropping the returned `Key`.
#[derive(Clone)]
pub enum Ssh2Private {
    Rsa(RsaPrivateKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl std::fmt::Debug for Ssh2Private {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ssh2Private::Rsa(_) => f.write_str("Ssh2Private::Rsa(..)"),
            Ssh2Private::Ed25519(_) => f.write_str("Ssh2Private::Ed25519(..)"),
        }
    }
}

/// Per-algorithm mask of SSH2_AGENTC_SIGN_REQUEST flag bits a key's algorithm honors.
/// RSA keys advertise the SHA-2 variant bits; Ed25519 (and anything else) advertises
/// none, so any nonzero `flags` on a sign request is rejected (`spec.md` §4.2, §8.6).
pub const SSH_AGENT_RSA_SHA2_256: u32 = 0x02;
pub const SSH_AGENT_RSA_SHA2_512: u32 = 0x04;

/// The union-tagged secret, one variant per SSH version (Design Notes: "represent as a
/// sum type... sort-key prefix is a separate projection, not embedded pointer identity").
#[derive(Debug, Clone)]
pub enum Secret {
    V1(Rsa1Private),
    V2(Ssh2Private),
}

/// A loaded identity. `public_blob` is the authoritative sort key and primary identity;
/// `comment` is stored independently of whatever comment the key file itself carried.
#[derive(Debug, Clone)]
pub struct Key {
    pub ssh_version: SshVersion,
    pub public_blob: Vec<u8>,
    pub comment: String,
    pub secret: Secret,
}

impl Key {
    /// The bitmask of `SSH2_AGENTC_SIGN_REQUEST` flags this key's algorithm supports.
    /// SSH-1 keys never receive sign requests so they report `0`.
    pub fn supported_flags(&self) -> u32 {
        match &self.secret {
            Secret::V1(_) => 0,
            Secret::V2(Ssh2Private::Rsa(_)) => SSH_AGENT_RSA_SHA2_256 | SSH_AGENT_RSA_SHA2_512,
            Secret::V2(Ssh2Private::Ed25519 { .. }) => 0,
        }
    }
}
