//! Error types shared across the agent core and the SSH-1 login layer.

use thiserror::Error;

/// Errors produced while handling agent-wire traffic or mutating the key store.
///
/// Every variant here is an *internal* error. The agent wire protocol itself only ever
/// sends a single-byte `SSH_AGENT_FAILURE` on the wire (see [`crate::agent::protocol`]);
/// these variants exist so the reason can still be logged before it is collapsed.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("truncated or malformed request body")]
    Truncated,
    #[error("unrecognized request type {0}")]
    UnknownType(u8),
    #[error("requested key was not found in the store")]
    KeyNotFound,
    #[error("a key with this (version, public blob) already exists")]
    DuplicateKey,
    #[error("signature flags 0x{0:08x} are not supported by this key's algorithm")]
    UnsupportedFlags(u32),
    #[error("RSA challenge response_type must be 1, got {0}")]
    BadResponseType(u32),
    #[error("private key failed cryptographic verification")]
    InvalidKey,
    #[error("decrypt/sign operation failed")]
    CryptoFailure,
    #[error("message of length {len} exceeds AGENT_MAX_MSGLEN")]
    Overlong { len: u32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors produced by the SSH-1 login state machine.
///
/// Fatal variants terminate the session (`spec.md` §7 "Security-critical violation" /
/// "Protocol parse error"); the state machine does not use this type for non-fatal
/// per-method auth refusals, which are represented as a loop-continue instead.
#[derive(Debug, Error)]
pub enum Ssh1Error {
    #[error("ssh_proto_error: {0}")]
    Protocol(String),
    #[error("server disconnected: {0}")]
    ServerDisconnected(String),
    #[error("user rejected the host key")]
    HostKeyRejected,
    #[error("user rejected the weak cipher warning")]
    WeakCipherRejected,
    #[error("host key did not appear in manually configured list")]
    HostKeyNotInManualList,
    #[error("server violates protocol by not supporting 3DES")]
    No3DesSupport,
    #[error("supported_auths_mask for PASSWORD is zero and no other method succeeded")]
    PasswordNotSupported,
    #[error("user cancelled input")]
    UserCancelled,
    #[error("all configured authentication methods were exhausted")]
    AuthExhausted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`crate::keyloader::KeyLoader`].
///
/// Mirrors the three-valued `OK | FAILURE | NEED_PP` return convention from `spec.md`
/// §4.5 / §6, but as a proper Rust enum rather than an out-parameter.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{0}")]
    Failure(String),
    #[error("passphrase required: {comment}")]
    NeedPassphrase { comment: String },
}
