//! SSH-1 login-phase packet types and their bodies (`spec.md` §6).
//!
//! The BPP (framing, CRC, bulk cipher) is out of scope (`spec.md` §1 Non-goals); this
//! module only knows how to interpret and build the *decoded* packet body a BPP hands
//! to or takes from [`super::login_machine::Ssh1LoginMachine`].

use crate::wire::{self, Reader};
use rsa::BigUint;

pub const MSG_DISCONNECT: u8 = 1;
pub const SMSG_PUBLIC_KEY: u8 = 2;
pub const CMSG_SESSION_KEY: u8 = 3;
pub const CMSG_USER: u8 = 4;
pub const CMSG_AUTH_RSA: u8 = 6;
pub const CMSG_AUTH_PASSWORD: u8 = 9;
pub const SMSG_SUCCESS: u8 = 14;
pub const SMSG_FAILURE: u8 = 15;
pub const SMSG_AUTH_RSA_CHALLENGE: u8 = 16;
pub const CMSG_AUTH_RSA_RESPONSE: u8 = 19;
pub const MSG_IGNORE: u8 = 32;
pub const MSG_DEBUG: u8 = 36;
pub const CMSG_REQUEST_COMPRESSION: u8 = 37;
pub const CMSG_AUTH_TIS: u8 = 39;
pub const CMSG_AUTH_TIS_RESPONSE: u8 = 40;
pub const SMSG_AUTH_TIS_CHALLENGE: u8 = 34;
pub const CMSG_AUTH_CCARD: u8 = 70;
pub const SMSG_AUTH_CCARD_CHALLENGE: u8 = 70;
pub const CMSG_AUTH_CCARD_RESPONSE: u8 = 71;

/// Bit positions within `supported_auths_mask` (`SMSG_PUBLIC_KEY`), one per legacy
/// SSH-1 auth method number (`spec.md` §4.6 "only if... server mask contains...").
pub const SSH_AUTH_RSA: u32 = 1 << 2;
pub const SSH_AUTH_PASSWORD: u32 = 1 << 3;
pub const SSH_AUTH_TIS: u32 = 1 << 5;
pub const SSH_AUTH_CCARD: u32 = 1 << 16;

/// A decoded SSH-1 packet: type byte plus body, with framing/CRC already stripped by
/// the (out-of-scope) BPP.
#[derive(Debug, Clone)]
pub struct Packet {
    pub msg_type: u8,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(msg_type: u8, body: Vec<u8>) -> Self {
        Packet { msg_type, body }
    }

    pub fn empty(msg_type: u8) -> Self {
        Packet { msg_type, body: Vec::new() }
    }
}

/// Body of `SMSG_PUBLIC_KEY`: cookie, server key, host key (both exponent-first), remote
/// protocol flags, and the two negotiation masks (`spec.md` §4.6 "AWAIT_PUBKEYS").
#[derive(Debug, Clone)]
pub struct PublicKeyPacket {
    pub cookie: [u8; 8],
    pub server_bits: u32,
    pub server_e: BigUint,
    pub server_n: BigUint,
    pub host_bits: u32,
    pub host_e: BigUint,
    pub host_n: BigUint,
    pub remote_protoflags: u32,
    pub supported_ciphers_mask: u32,
    pub supported_auths_mask: u32,
}

pub fn parse_public_key(body: &[u8]) -> Option<PublicKeyPacket> {
    let mut r = Reader::new(body);
    let cookie: [u8; 8] = r.take_bytes(8).ok()?.try_into().ok()?;
    let server_bits = r.take_u32().ok()?;
    let server_e = r.take_mpint1().ok()?;
    let server_n = r.take_mpint1().ok()?;
    let host_bits = r.take_u32().ok()?;
    let host_e = r.take_mpint1().ok()?;
    let host_n = r.take_mpint1().ok()?;
    let remote_protoflags = r.take_u32().ok()?;
    let supported_ciphers_mask = r.take_u32().ok()?;
    let supported_auths_mask = r.take_u32().ok()?;
    Some(PublicKeyPacket {
        cookie,
        server_bits,
        server_e,
        server_n,
        host_bits,
        host_e,
        host_n,
        remote_protoflags,
        supported_ciphers_mask,
        supported_auths_mask,
    })
}

/// Builds `CMSG_SESSION_KEY { cipher_type, cookie, key_bit_length, ciphertext,
/// local_protoflags }` (`spec.md` §4.6 "Session key").
pub fn build_session_key(
    cipher_type: u8,
    cookie: &[u8; 8],
    ciphertext: &[u8],
    local_protoflags: u32,
) -> Packet {
    let mut body = Vec::new();
    body.push(cipher_type);
    body.extend_from_slice(cookie);
    let bitlen = (ciphertext.len() * 8) as u16;
    body.extend_from_slice(&bitlen.to_be_bytes());
    body.extend_from_slice(ciphertext);
    wire::append_u32(&mut body, local_protoflags);
    Packet::new(CMSG_SESSION_KEY, body)
}

pub fn build_user(username: &str) -> Packet {
    let mut body = Vec::new();
    wire::append_string(&mut body, username.as_bytes());
    Packet::new(CMSG_USER, body)
}

/// `CMSG_AUTH_RSA { modulus }` — only the modulus, not the exponent (`spec.md` §4.6
/// "Agent RSA" / "Public-key file").
pub fn build_auth_rsa(n: &BigUint) -> Packet {
    let mut body = Vec::new();
    wire::append_mpint1(&mut body, n);
    Packet::new(CMSG_AUTH_RSA, body)
}

pub fn parse_auth_rsa_challenge(body: &[u8]) -> Option<BigUint> {
    let mut r = Reader::new(body);
    r.take_mpint1().ok()
}

pub fn build_auth_rsa_response(digest: &[u8; 16]) -> Packet {
    Packet::new(CMSG_AUTH_RSA_RESPONSE, digest.to_vec())
}

pub fn build_auth_password(password: &[u8]) -> Packet {
    let mut body = Vec::new();
    wire::append_string(&mut body, password);
    Packet::new(CMSG_AUTH_PASSWORD, body)
}

pub fn build_ignore(padding: &[u8]) -> Packet {
    let mut body = Vec::new();
    wire::append_string(&mut body, padding);
    Packet::new(MSG_IGNORE, body)
}

pub fn build_auth_tis() -> Packet {
    Packet::empty(CMSG_AUTH_TIS)
}

pub fn build_auth_ccard() -> Packet {
    Packet::empty(CMSG_AUTH_CCARD)
}

pub fn build_auth_tis_response(response: &str) -> Packet {
    let mut body = Vec::new();
    wire::append_string(&mut body, response.as_bytes());
    Packet::new(CMSG_AUTH_TIS_RESPONSE, body)
}

pub fn build_auth_ccard_response(response: &str) -> Packet {
    let mut body = Vec::new();
    wire::append_string(&mut body, response.as_bytes());
    Packet::new(CMSG_AUTH_CCARD_RESPONSE, body)
}

/// Both `SMSG_AUTH_TIS_CHALLENGE` and `SMSG_AUTH_CCARD_CHALLENGE` carry a single
/// length-prefixed challenge string (`spec.md` §4.6 "TIS / CryptoCard").
pub fn parse_challenge_string(body: &[u8]) -> Option<String> {
    let mut r = Reader::new(body);
    let s = r.take_string().ok()?;
    Some(String::from_utf8_lossy(s).into_owned())
}

pub fn build_request_compression(level: u8) -> Packet {
    Packet::new(CMSG_REQUEST_COMPRESSION, vec![level])
}

pub fn parse_disconnect_reason(body: &[u8]) -> String {
    let mut r = Reader::new(body);
    r.take_string()
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_packet_round_trips_bit_length() {
        let cookie = [1u8; 8];
        let ciphertext = vec![0xffu8; 64];
        let packet = build_session_key(2, &cookie, &ciphertext, 0);
        assert_eq!(packet.msg_type, CMSG_SESSION_KEY);

        let mut r = Reader::new(&packet.body);
        let cipher_type = r.take_u8().unwrap();
        let read_cookie = r.take_bytes(8).unwrap();
        let bitlen = u16::from_be_bytes(r.take_bytes(2).unwrap().try_into().unwrap());
        let body = r.take_bytes(64).unwrap();

        assert_eq!(cipher_type, 2);
        assert_eq!(read_cookie, cookie);
        assert_eq!(bitlen, 512);
        assert_eq!(body, ciphertext.as_slice());
    }

    #[test]
    fn public_key_packet_parses_exponent_first_layout() {
        let mut body = Vec::new();
        body.extend_from_slice(&[9u8; 8]);
        wire::append_u32(&mut body, 768);
        wire::append_mpint1(&mut body, &BigUint::from(65537u32));
        wire::append_mpint1(&mut body, &BigUint::from(123456789u64));
        wire::append_u32(&mut body, 1024);
        wire::append_mpint1(&mut body, &BigUint::from(65537u32));
        wire::append_mpint1(&mut body, &BigUint::from(987654321u64));
        wire::append_u32(&mut body, 0);
        wire::append_u32(&mut body, 0b110);
        wire::append_u32(&mut body, 0b1);

        let parsed = parse_public_key(&body).unwrap();
        assert_eq!(parsed.cookie, [9u8; 8]);
        assert_eq!(parsed.server_bits, 768);
        assert_eq!(parsed.host_bits, 1024);
        assert_eq!(parsed.supported_ciphers_mask, 0b110);
    }
}
