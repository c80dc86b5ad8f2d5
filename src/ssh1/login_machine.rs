//! `Ssh1LoginMachine`: the SSH-1 login-phase state machine (`spec.md` §4.6).
//!
//! Modeled as an explicit `step(event) -> actions` coroutine rather than a native
//! `async fn`: the state enum's variants hold exactly the locals alive across each
//! suspension point, so "what this machine is waiting for" is always inspectable from
//! `self.state` instead of hidden inside a generated future (see `SPEC_FULL.md` §5's
//! note on why — this keeps one cooperative-scheduling discipline uniform across the
//! whole crate rather than mixing it with `async`/`.await`).

use super::auth::{self, ChallengePrompt};
use super::hostkey::{self, DialogDecision, HostKeyFingerprint, ManualListOutcome};
use super::packets::{self, Packet, PublicKeyPacket};
use crate::config::{CipherPref, Config};
use crate::crypto;
use crate::error::Ssh1Error;
use rand::RngCore;
use rsa::{BigUint, RsaPrivateKey};
use tracing::{debug, warn};

/// Decrypts the on-disk private half of a configured key file. Key-file parsing
/// (PEM/PPK) is an external collaborator (`spec.md` §1 Non-goals); the login machine
/// only needs this one operation from it, mirroring [`crate::keyloader::KeyFileSource`]
/// but scoped to the single SSH-1 RSA key a login session cares about.
pub trait Ssh1KeyFile {
    fn decrypt(&self, passphrase: &str) -> Result<Option<RsaPrivateKey>, String>;
}

/// Which prompt the generic "ask for input" suspension is waiting on — the reuse point
/// `spec.md` names explicitly ("Prompt flow (reused for passphrases/passwords)").
#[derive(Debug, Clone)]
enum InputPurpose {
    Username,
    PubkeyFilePassphrase,
    TisResponse,
    CcardResponse,
    Password,
}

/// Bookkeeping for the repeat-until-`SMSG_SUCCESS` authentication loop (`spec.md` §4.6
/// "Authentication round").
#[derive(Debug, Default, Clone)]
struct AuthProgress {
    agent_tried: bool,
    pubkey_file_tried: bool,
    tis_refused: bool,
    ccard_refused: bool,
    tis_in_flight: bool,
    ccard_in_flight: bool,
}

type SessionId = [u8; 16];

#[derive(Debug, Clone)]
enum State {
    AwaitPubkeys,
    AwaitHostKeyDecision { pkp: PublicKeyPacket },
    AwaitWeakCipherDecision { pkp: PublicKeyPacket, cipher: CipherPref },
    AwaitSessionKeyAck { session_id: SessionId },
    AwaitUserInput { purpose: InputPurpose, session_id: SessionId, auth: AuthProgress },
    AwaitAuthReply { auth: AuthProgress, session_id: SessionId },
    AwaitAgentIdentities { auth: AuthProgress, session_id: SessionId },
    AwaitAgentRsaChallenge {
        auth: AuthProgress,
        session_id: SessionId,
        current_blob: Vec<u8>,
        remaining_keys: Vec<(Vec<u8>, BigUint)>,
    },
    AwaitAgentSignature {
        auth: AuthProgress,
        session_id: SessionId,
        remaining_keys: Vec<(Vec<u8>, BigUint)>,
    },
    AwaitCompressionReply,
    Done,
}

/// One thing the machine wants its driver to do on its behalf: send a packet over the
/// (out-of-scope) BPP, pop up a dialog, prompt the user, ask the agent something, or —
/// terminally — hand off to the successor connection layer.
#[derive(Debug)]
pub enum Action {
    Send(Packet),
    AskHostKeyDialog(HostKeyFingerprint),
    AskWeakCipherDialog(CipherPref),
    AskUserInput { prompt: String, is_secret: bool },
    AskAgentIdentities,
    AskAgentSign { blob: Vec<u8>, challenge: BigUint, session_id: SessionId },
    Log(String),
    HandoffToConnectionLayer { local_protoflags: u32 },
}

/// An event delivered into [`Ssh1LoginMachine::step`]: an inbound server packet, or the
/// asynchronous result of one of the requests in [`Action`].
#[derive(Debug)]
pub enum Event {
    ServerPacket(Packet),
    UserInput(String),
    UserCancelled,
    HostKeyDecision(DialogDecision),
    WeakCipherDecision(DialogDecision),
    /// `(public_blob, modulus)` pairs for each SSH-1 identity the agent currently
    /// holds, in the order the agent returned them.
    AgentIdentities(Vec<(Vec<u8>, BigUint)>),
    /// The 16-byte response digest the agent computed for a challenge, or `None` if it
    /// declined/failed to sign.
    AgentSignature(Option<[u8; 16]>),
}

pub struct Ssh1LoginMachine {
    config: Config,
    known_hosts: Vec<HostKeyFingerprint>,
    keyfile_public: Option<(BigUint, BigUint)>, // (e, n) of a configured keyfile's public half
    keyfile_source: Option<Box<dyn Ssh1KeyFile>>,
    keyfile_private: Option<RsaPrivateKey>,
    username: Option<String>,
    state: State,
    chosen_cipher: Option<CipherPref>,
    local_protoflags: u32,
    supported_auths_mask: u32,
}

impl Ssh1LoginMachine {
    pub fn new(config: Config, known_hosts: Vec<HostKeyFingerprint>) -> Self {
        Ssh1LoginMachine {
            config,
            known_hosts,
            keyfile_public: None,
            keyfile_source: None,
            keyfile_private: None,
            username: None,
            state: State::AwaitPubkeys,
            chosen_cipher: None,
            local_protoflags: 0,
            supported_auths_mask: 0,
        }
    }

    /// Registers the configured key file's public half and its decryptor, loaded
    /// eagerly and independent of whether a passphrase is ever supplied — needed so
    /// the agent-RSA skip rule (`spec.md` §4.6, `SPEC_FULL.md`'s supplement) can
    /// compare blobs before any passphrase prompt happens.
    pub fn set_keyfile(&mut self, e: BigUint, n: BigUint, source: Box<dyn Ssh1KeyFile>) {
        self.keyfile_public = Some((e, n));
        self.keyfile_source = Some(source);
    }

    /// Drives the machine with one inbound event, returning the actions the driver must
    /// perform. A server `MSG_DISCONNECT`/parse failure returns `Err` and the machine
    /// must not be stepped again (`spec.md` §4.6 "Common centrally-handled messages").
    pub fn step(&mut self, event: Event) -> Result<Vec<Action>, Ssh1Error> {
        if let Event::ServerPacket(packet) = &event {
            match packet.msg_type {
                packets::MSG_DISCONNECT => {
                    return Err(Ssh1Error::ServerDisconnected(packets::parse_disconnect_reason(&packet.body)));
                }
                packets::MSG_DEBUG => {
                    debug!("server debug message");
                    return Ok(vec![]);
                }
                packets::MSG_IGNORE => return Ok(vec![]),
                _ => {}
            }
        }

        match std::mem::replace(&mut self.state, State::Done) {
            State::AwaitPubkeys => self.on_await_pubkeys(event),
            State::AwaitHostKeyDecision { pkp } => self.on_host_key_decision(pkp, event),
            State::AwaitWeakCipherDecision { pkp, cipher } => self.on_weak_cipher_decision(pkp, cipher, event),
            State::AwaitSessionKeyAck { session_id } => self.request_username(session_id),
            State::AwaitUserInput { purpose, session_id, auth } => {
                self.on_user_input(purpose, session_id, auth, event)
            }
            State::AwaitAuthReply { auth, session_id } => self.on_auth_reply(auth, session_id, event),
            State::AwaitAgentIdentities { auth, session_id } => self.on_agent_identities(auth, session_id, event),
            State::AwaitAgentRsaChallenge { auth, session_id, current_blob, remaining_keys } => {
                self.on_agent_rsa_challenge(auth, session_id, current_blob, remaining_keys, event)
            }
            State::AwaitAgentSignature { auth, session_id, remaining_keys } => {
                self.on_agent_signature(auth, session_id, remaining_keys, event)
            }
            State::AwaitCompressionReply => self.on_compression_reply(event),
            State::Done => {
                warn!("event delivered to a finished SSH-1 login machine");
                Ok(vec![])
            }
        }
    }

    fn on_await_pubkeys(&mut self, event: Event) -> Result<Vec<Action>, Ssh1Error> {
        let Event::ServerPacket(packet) = event else {
            return Err(Ssh1Error::Protocol("expected SMSG_PUBLIC_KEY".into()));
        };
        if packet.msg_type != packets::SMSG_PUBLIC_KEY {
            return Err(Ssh1Error::Protocol(format!(
                "expected SMSG_PUBLIC_KEY, got type {}",
                packet.msg_type
            )));
        }
        let pkp = packets::parse_public_key(&packet.body)
            .ok_or_else(|| Ssh1Error::Protocol("Bad SSH-1 public key packet".into()))?;
        self.supported_auths_mask = pkp.supported_auths_mask;

        let fp = HostKeyFingerprint { e: pkp.host_e.clone(), n: pkp.host_n.clone() };
        match hostkey::check_manual_list(&fp, &self.known_hosts) {
            ManualListOutcome::Match => self.after_host_key_accepted(pkp),
            ManualListOutcome::ConfiguredButNoMatch => Err(Ssh1Error::HostKeyNotInManualList),
            ManualListOutcome::Unconfigured => {
                self.state = State::AwaitHostKeyDecision { pkp };
                Ok(vec![Action::AskHostKeyDialog(fp)])
            }
        }
    }

    fn on_host_key_decision(&mut self, pkp: PublicKeyPacket, event: Event) -> Result<Vec<Action>, Ssh1Error> {
        let Event::HostKeyDecision(decision) = event else {
            return Err(Ssh1Error::Protocol("expected a host-key dialog result".into()));
        };
        match decision {
            DialogDecision::Reject => Err(Ssh1Error::HostKeyRejected),
            DialogDecision::Pending => {
                self.state = State::AwaitHostKeyDecision { pkp };
                Ok(vec![])
            }
            DialogDecision::Accept => self.after_host_key_accepted(pkp),
        }
    }

    /// Cipher negotiation (`spec.md` §4.6 "Cipher negotiation").
    fn after_host_key_accepted(&mut self, pkp: PublicKeyPacket) -> Result<Vec<Action>, Ssh1Error> {
        let mut warn_next = false;
        let mut chosen = None;
        for pref in self.config.cipher_preference.clone() {
            match pref {
                CipherPref::Warn => warn_next = true,
                CipherPref::Aes => continue, // unsupported in SSH-1, silently skipped
                cipher => {
                    let bit = cipher_mask_bit(cipher);
                    if pkp.supported_ciphers_mask & bit != 0 {
                        chosen = Some((cipher, warn_next));
                        break;
                    }
                }
            }
        }

        let (cipher, warned) = match chosen {
            Some(c) => c,
            None if pkp.supported_ciphers_mask & cipher_mask_bit(CipherPref::TripleDes) == 0 => {
                return Err(Ssh1Error::No3DesSupport);
            }
            None => (CipherPref::TripleDes, false),
        };
        self.chosen_cipher = Some(cipher);

        if warned {
            self.state = State::AwaitWeakCipherDecision { pkp, cipher };
            return Ok(vec![Action::AskWeakCipherDialog(cipher)]);
        }
        self.send_session_key(pkp)
    }

    fn on_weak_cipher_decision(
        &mut self,
        pkp: PublicKeyPacket,
        cipher: CipherPref,
        event: Event,
    ) -> Result<Vec<Action>, Ssh1Error> {
        let Event::WeakCipherDecision(decision) = event else {
            return Err(Ssh1Error::Protocol("expected a weak-cipher dialog result".into()));
        };
        match decision {
            DialogDecision::Reject => Err(Ssh1Error::WeakCipherRejected),
            DialogDecision::Pending => {
                self.state = State::AwaitWeakCipherDecision { pkp, cipher };
                Ok(vec![])
            }
            DialogDecision::Accept => self.send_session_key(pkp),
        }
    }

    /// `spec.md` §4.6 "Session key": XOR'd/plain buffer, double RSA encryption
    /// (smaller key inner, larger key outer), then `CMSG_SESSION_KEY`.
    fn send_session_key(&mut self, pkp: PublicKeyPacket) -> Result<Vec<Action>, Ssh1Error> {
        let session_id = crypto::ssh1_session_id(&pkp.host_n, &pkp.server_n, &pkp.cookie);

        let mut session_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut session_key);

        let mut buf = [0u8; 32];
        for i in 0..16 {
            buf[i] = session_key[i] ^ session_id[i];
        }
        buf[16..].copy_from_slice(&session_key[16..]);

        let server_len = pkp.server_n.to_bytes_be().len();
        let host_len = pkp.host_n.to_bytes_be().len();
        let ((inner_e, inner_n), (outer_e, outer_n)) = if server_len <= host_len {
            ((&pkp.server_e, &pkp.server_n), (&pkp.host_e, &pkp.host_n))
        } else {
            ((&pkp.host_e, &pkp.host_n), (&pkp.server_e, &pkp.server_n))
        };

        let inner_ct = crypto::pkcs1v15_encrypt(inner_e, inner_n, &buf)
            .map_err(|_| Ssh1Error::Protocol("RSA encryption of session key failed".into()))?;
        let outer_ct = crypto::pkcs1v15_encrypt(outer_e, outer_n, &inner_ct)
            .map_err(|_| Ssh1Error::Protocol("RSA encryption of session key failed".into()))?;

        buf.iter_mut().for_each(|b| *b = 0);
        session_key.iter_mut().for_each(|b| *b = 0);

        let cipher_type = cipher_wire_value(self.chosen_cipher.unwrap_or(CipherPref::TripleDes));
        let packet = packets::build_session_key(cipher_type, &pkp.cookie, &outer_ct, self.local_protoflags);

        self.state = State::AwaitSessionKeyAck { session_id };
        Ok(vec![Action::Send(packet)])
    }

    fn request_username(&mut self, session_id: SessionId) -> Result<Vec<Action>, Ssh1Error> {
        if let Some(user) = self.config.remote_user.clone() {
            self.username = Some(user.clone());
            self.state = State::AwaitAuthReply { auth: AuthProgress::default(), session_id };
            return Ok(vec![Action::Send(packets::build_user(&user))]);
        }
        self.state = State::AwaitUserInput {
            purpose: InputPurpose::Username,
            session_id,
            auth: AuthProgress::default(),
        };
        Ok(vec![Action::AskUserInput { prompt: "login as: ".into(), is_secret: false }])
    }

    fn on_user_input(
        &mut self,
        purpose: InputPurpose,
        session_id: SessionId,
        auth: AuthProgress,
        event: Event,
    ) -> Result<Vec<Action>, Ssh1Error> {
        let input = match event {
            Event::UserCancelled => return Err(Ssh1Error::UserCancelled),
            Event::UserInput(s) => s,
            _ => return Err(Ssh1Error::Protocol("expected user input".into())),
        };

        match purpose {
            InputPurpose::Username => {
                self.username = Some(input.clone());
                self.state = State::AwaitAuthReply { auth, session_id };
                Ok(vec![Action::Send(packets::build_user(&input))])
            }
            InputPurpose::PubkeyFilePassphrase => self.try_pubkey_file_decrypt(&input, auth, session_id),
            InputPurpose::Password => {
                let password_packets = auth::build_password_packets(input.as_bytes(), self.config.remote_bugs);
                let actions = password_packets.into_iter().map(|p| Action::Send(p.packet)).collect();
                self.state = State::AwaitAuthReply { auth, session_id };
                Ok(actions)
            }
            InputPurpose::TisResponse => {
                self.state = State::AwaitAuthReply { auth, session_id };
                Ok(vec![Action::Send(packets::build_auth_tis_response(&input))])
            }
            InputPurpose::CcardResponse => {
                self.state = State::AwaitAuthReply { auth, session_id };
                Ok(vec![Action::Send(packets::build_auth_ccard_response(&input))])
            }
        }
    }

    /// One pass of the authentication loop: decides the next method to try.
    /// `spec.md` §4.6 "Authentication round": agent RSA, then pubkey file, then
    /// TIS, then CryptoCard, then password, repeating on `SMSG_FAILURE` until
    /// `SMSG_SUCCESS`.
    fn on_auth_reply(
        &mut self,
        mut auth: AuthProgress,
        session_id: SessionId,
        event: Event,
    ) -> Result<Vec<Action>, Ssh1Error> {
        let Event::ServerPacket(packet) = event else {
            return Err(Ssh1Error::Protocol("expected SMSG_SUCCESS or SMSG_FAILURE".into()));
        };

        match packet.msg_type {
            packets::SMSG_SUCCESS => self.after_auth_success(),
            packets::SMSG_FAILURE => {
                if auth.tis_in_flight {
                    auth.tis_refused = true;
                    auth.tis_in_flight = false;
                }
                if auth.ccard_in_flight {
                    auth.ccard_refused = true;
                    auth.ccard_in_flight = false;
                }
                self.try_next_auth_method(auth, session_id)
            }
            packets::SMSG_AUTH_RSA_CHALLENGE => self.on_rsa_challenge(auth, session_id, &packet.body),
            packets::SMSG_AUTH_TIS_CHALLENGE | packets::SMSG_AUTH_CCARD_CHALLENGE
                if auth.tis_in_flight || auth.ccard_in_flight =>
            {
                self.on_tis_or_ccard_challenge(auth, session_id, &packet.body)
            }
            other => Err(Ssh1Error::Protocol(format!("unexpected reply type {other} in auth round"))),
        }
    }

    fn try_next_auth_method(&mut self, mut auth: AuthProgress, session_id: SessionId) -> Result<Vec<Action>, Ssh1Error> {
        let mask = self.supported_auths_mask;

        if !auth.agent_tried && self.config.try_agent && mask & packets::SSH_AUTH_RSA != 0 {
            auth.agent_tried = true;
            self.state = State::AwaitAgentIdentities { auth, session_id };
            return Ok(vec![Action::AskAgentIdentities]);
        }
        auth.agent_tried = true;

        if !auth.pubkey_file_tried && self.keyfile_public.is_some() && mask & packets::SSH_AUTH_RSA != 0 {
            auth.pubkey_file_tried = true;
            if self.keyfile_private.is_some() {
                let n = self.keyfile_public.as_ref().unwrap().1.clone();
                self.state = State::AwaitAuthReply { auth, session_id };
                return Ok(vec![Action::Send(packets::build_auth_rsa(&n))]);
            }
            self.state = State::AwaitUserInput { purpose: InputPurpose::PubkeyFilePassphrase, session_id, auth };
            return Ok(vec![Action::AskUserInput {
                prompt: "Enter passphrase for key file: ".into(),
                is_secret: true,
            }]);
        }
        auth.pubkey_file_tried = true;

        if self.config.try_tis && !auth.tis_refused && !auth.tis_in_flight && mask & packets::SSH_AUTH_TIS != 0 {
            auth.tis_in_flight = true;
            self.state = State::AwaitAuthReply { auth, session_id };
            return Ok(vec![Action::Send(packets::build_auth_tis())]);
        }

        if self.config.try_cryptocard
            && !auth.ccard_refused
            && !auth.ccard_in_flight
            && mask & packets::SSH_AUTH_CCARD != 0
        {
            auth.ccard_in_flight = true;
            self.state = State::AwaitAuthReply { auth, session_id };
            return Ok(vec![Action::Send(packets::build_auth_ccard())]);
        }

        if mask & packets::SSH_AUTH_PASSWORD == 0 {
            return Err(Ssh1Error::PasswordNotSupported);
        }

        self.state = State::AwaitUserInput { purpose: InputPurpose::Password, session_id, auth };
        let user = self.username.clone().unwrap_or_default();
        Ok(vec![Action::AskUserInput { prompt: format!("{user}@host's password: "), is_secret: true }])
    }

    /// Decrypts the configured key file with `passphrase` via the registered
    /// [`Ssh1KeyFile`], retrying with a failure response if the passphrase was
    /// rejected (`spec.md` §4.6 "loop to acquire correct passphrase").
    fn try_pubkey_file_decrypt(
        &mut self,
        passphrase: &str,
        auth: AuthProgress,
        session_id: SessionId,
    ) -> Result<Vec<Action>, Ssh1Error> {
        let Some(source) = &self.keyfile_source else {
            return self.try_next_auth_method(auth, session_id);
        };
        match source.decrypt(passphrase) {
            Ok(Some(key)) => {
                self.keyfile_private = Some(key);
                let n = self.keyfile_public.as_ref().unwrap().1.clone();
                self.state = State::AwaitAuthReply { auth, session_id };
                Ok(vec![Action::Send(packets::build_auth_rsa(&n))])
            }
            Ok(None) => {
                self.state = State::AwaitUserInput { purpose: InputPurpose::PubkeyFilePassphrase, session_id, auth };
                Ok(vec![Action::AskUserInput {
                    prompt: "Enter passphrase for key file (again): ".into(),
                    is_secret: true,
                }])
            }
            Err(msg) => {
                warn!(error = %msg, "key file failed to parse");
                self.try_next_auth_method(auth, session_id)
            }
        }
    }

    fn on_rsa_challenge(
        &mut self,
        auth: AuthProgress,
        session_id: SessionId,
        body: &[u8],
    ) -> Result<Vec<Action>, Ssh1Error> {
        let challenge = packets::parse_auth_rsa_challenge(body)
            .ok_or_else(|| Ssh1Error::Protocol("malformed SMSG_AUTH_RSA_CHALLENGE".into()))?;

        let priv_key = self
            .keyfile_private
            .as_ref()
            .ok_or_else(|| Ssh1Error::Protocol("SMSG_AUTH_RSA_CHALLENGE with no local private key loaded".into()))?;

        let rsa1 = crate::key::Rsa1Private { bits: 0, inner: priv_key.clone() };
        let response = crypto::rsa1_decrypt(&rsa1, &challenge)
            .map_err(|_| Ssh1Error::Protocol("local RSA challenge decrypt failed".into()))?;
        let digest = crypto::rsa1_response_digest(&response, &session_id);
        self.state = State::AwaitAuthReply { auth, session_id };
        Ok(vec![Action::Send(packets::build_auth_rsa_response(&digest))])
    }

    fn on_tis_or_ccard_challenge(
        &mut self,
        auth: AuthProgress,
        session_id: SessionId,
        body: &[u8],
    ) -> Result<Vec<Action>, Ssh1Error> {
        let challenge = packets::parse_challenge_string(body)
            .ok_or_else(|| Ssh1Error::Protocol("malformed TIS/CCard challenge".into()))?;
        let ChallengePrompt { prompt, instruction } = auth::interpret_challenge(&challenge);
        let purpose = if auth.tis_in_flight { InputPurpose::TisResponse } else { InputPurpose::CcardResponse };
        self.state = State::AwaitUserInput { purpose, session_id, auth };
        let full_prompt = if instruction.is_empty() { prompt } else { format!("{instruction}\n{prompt}") };
        Ok(vec![Action::AskUserInput { prompt: full_prompt, is_secret: false }])
    }

    fn on_agent_identities(
        &mut self,
        auth: AuthProgress,
        session_id: SessionId,
        event: Event,
    ) -> Result<Vec<Action>, Ssh1Error> {
        let Event::AgentIdentities(keys) = event else {
            return Err(Ssh1Error::Protocol("expected agent identities".into()));
        };
        let configured_blob = self.keyfile_public.as_ref().map(|(e, n)| {
            let mut blob = Vec::new();
            crate::wire::append_mpint1(&mut blob, e);
            crate::wire::append_mpint1(&mut blob, n);
            blob
        });

        let mut candidates: Vec<(Vec<u8>, BigUint)> = keys
            .into_iter()
            .filter(|(blob, _n)| !auth::skip_agent_key(configured_blob.as_deref(), blob))
            .collect();

        if candidates.is_empty() {
            return self.try_next_auth_method(auth, session_id);
        }

        let (blob, n) = candidates.remove(0);
        self.state = State::AwaitAgentRsaChallenge { auth, session_id, current_blob: blob, remaining_keys: candidates };
        Ok(vec![Action::Send(packets::build_auth_rsa(&n))])
    }

    fn on_agent_rsa_challenge(
        &mut self,
        auth: AuthProgress,
        session_id: SessionId,
        current_blob: Vec<u8>,
        mut remaining_keys: Vec<(Vec<u8>, BigUint)>,
        event: Event,
    ) -> Result<Vec<Action>, Ssh1Error> {
        let Event::ServerPacket(packet) = event else {
            return Err(Ssh1Error::Protocol("expected a server reply to CMSG_AUTH_RSA".into()));
        };
        match packet.msg_type {
            packets::SMSG_FAILURE => {
                if remaining_keys.is_empty() {
                    self.try_next_auth_method(auth, session_id)
                } else {
                    let (blob, n) = remaining_keys.remove(0);
                    self.state =
                        State::AwaitAgentRsaChallenge { auth, session_id, current_blob: blob, remaining_keys };
                    Ok(vec![Action::Send(packets::build_auth_rsa(&n))])
                }
            }
            packets::SMSG_AUTH_RSA_CHALLENGE => {
                let challenge = packets::parse_auth_rsa_challenge(&packet.body)
                    .ok_or_else(|| Ssh1Error::Protocol("malformed SMSG_AUTH_RSA_CHALLENGE".into()))?;
                self.state = State::AwaitAgentSignature { auth, session_id, remaining_keys };
                Ok(vec![Action::AskAgentSign { blob: current_blob, challenge, session_id }])
            }
            other => Err(Ssh1Error::Protocol(format!("unexpected reply type {other} to agent CMSG_AUTH_RSA"))),
        }
    }

    fn on_agent_signature(
        &mut self,
        auth: AuthProgress,
        session_id: SessionId,
        mut remaining_keys: Vec<(Vec<u8>, BigUint)>,
        event: Event,
    ) -> Result<Vec<Action>, Ssh1Error> {
        let Event::AgentSignature(maybe_digest) = event else {
            return Err(Ssh1Error::Protocol("expected an agent signature result".into()));
        };
        match maybe_digest {
            Some(digest) => {
                self.state = State::AwaitAuthReply { auth, session_id };
                Ok(vec![Action::Send(packets::build_auth_rsa_response(&digest))])
            }
            None if !remaining_keys.is_empty() => {
                let (blob, n) = remaining_keys.remove(0);
                self.state =
                    State::AwaitAgentRsaChallenge { auth, session_id, current_blob: blob, remaining_keys };
                Ok(vec![Action::Send(packets::build_auth_rsa(&n))])
            }
            None => self.try_next_auth_method(auth, session_id),
        }
    }

    fn after_auth_success(&mut self) -> Result<Vec<Action>, Ssh1Error> {
        if self.config.compression {
            self.state = State::AwaitCompressionReply;
            return Ok(vec![Action::Send(packets::build_request_compression(6))]);
        }
        self.handoff()
    }

    fn on_compression_reply(&mut self, event: Event) -> Result<Vec<Action>, Ssh1Error> {
        let Event::ServerPacket(packet) = event else {
            return Err(Ssh1Error::Protocol("expected SMSG_SUCCESS or SMSG_FAILURE for compression".into()));
        };
        match packet.msg_type {
            packets::SMSG_SUCCESS => {}
            packets::SMSG_FAILURE => warn!("server declined compression request"),
            other => return Err(Ssh1Error::Protocol(format!("unexpected reply {other} to compression request"))),
        }
        self.handoff()
    }

    fn handoff(&mut self) -> Result<Vec<Action>, Ssh1Error> {
        self.state = State::Done;
        Ok(vec![Action::HandoffToConnectionLayer { local_protoflags: self.local_protoflags }])
    }
}

/// Bit positions within `supported_ciphers_mask`/`CMSG_SESSION_KEY`'s `cipher_type`,
/// per the classic SSH-1 cipher numbering (`spec.md` Glossary).
fn cipher_mask_bit(cipher: CipherPref) -> u32 {
    1 << cipher_wire_value(cipher)
}

fn cipher_wire_value(cipher: CipherPref) -> u8 {
    match cipher {
        CipherPref::Des => 1,
        CipherPref::TripleDes => 2,
        CipherPref::Blowfish => 6,
        CipherPref::Aes | CipherPref::Warn => unreachable!("not a real wire cipher"),
    }
}
