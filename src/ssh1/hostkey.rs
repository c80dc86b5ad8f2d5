//! Host-key verification (`spec.md` §4.6 "Host-key verification", §6 "Host-key
//! verification interface").

use rsa::BigUint;
use std::path::Path;

/// The three-valued outcome of consulting the (external) host-key-verification
/// dialog: reject, accept, or "still waiting on the user" — matching `spec.md` §6's
/// "callback-based, three-valued return (reject/accept/pending→callback)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogDecision {
    Reject,
    Accept,
    Pending,
}

/// Result of checking a host key against the manually-configured list
/// (`spec.md` §4.6 "ask the configuration first for a manual-host-key list").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualListOutcome {
    Match,
    ConfiguredButNoMatch,
    Unconfigured,
}

/// A host key as the manual list stores it: modulus and exponent, independent of bit
/// count (`spec.md`'s SSH-1 public key is exponent-first `(e, n)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyFingerprint {
    pub e: BigUint,
    pub n: BigUint,
}

/// Checks `host_key` against `manual_list`. An empty list means host-key checking was
/// never configured, which falls through to the interactive dialog rather than being
/// treated as a configured-but-empty mismatch.
pub fn check_manual_list(host_key: &HostKeyFingerprint, manual_list: &[HostKeyFingerprint]) -> ManualListOutcome {
    if manual_list.is_empty() {
        return ManualListOutcome::Unconfigured;
    }
    if manual_list.contains(host_key) {
        ManualListOutcome::Match
    } else {
        ManualListOutcome::ConfiguredButNoMatch
    }
}

/// Loads a manually-pinned host-key list from a simple `e n` decimal-pair-per-line
/// file. Lines that fail to parse are skipped rather than treated as fatal — a
/// malformed line in a locally-trusted pin file is an operator typo, not an attack.
pub fn load_known_hosts(path: &Path) -> Vec<HostKeyFingerprint> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return Vec::new(),
    };
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let e = parts.next()?.parse::<BigUint>().ok()?;
            let n = parts.next()?.parse::<BigUint>().ok()?;
            Some(HostKeyFingerprint { e, n })
        })
        .collect()
}
