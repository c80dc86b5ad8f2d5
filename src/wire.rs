//! Byte-level encode/decode helpers shared by the agent wire protocol and the SSH-1
//! login packet layer.
//!
//! SSH-2-style fields use a `uint32` length prefix (`append_string`/`extract_string`).
//! SSH-1 MP-ints use a `uint16` *bit*-length prefix followed by `ceil(bits/8)` bytes
//! (`append_mpint1`/`extract_mpint1`) — the two are not interchangeable and callers must
//! pick the one that matches the packet they are building or parsing.

use crate::error::AgentError;
use rsa::BigUint;

/// A cursor over an immutable byte slice, used while parsing inbound packets.
///
/// Every `take_*` method returns `AgentError::Truncated` rather than panicking when the
/// slice runs out, so malformed input from an untrusted local client never panics the
/// agent.
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], AgentError> {
        if self.buf.len() < n {
            return Err(AgentError::Truncated);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn take_u8(&mut self) -> Result<u8, AgentError> {
        Ok(self.take(1)?[0])
    }

    pub fn take_u32(&mut self) -> Result<u32, AgentError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn take_bytes(&mut self, n: usize) -> Result<&'a [u8], AgentError> {
        self.take(n)
    }

    /// SSH-2 style `string`: `uint32 length` followed by `length` bytes.
    pub fn take_string(&mut self) -> Result<&'a [u8], AgentError> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }

    /// SSH-1 style raw public-key MP-int pair with no outer length: the bit-length
    /// prefixed integer form used for `e`/`n` inside an unwrapped SSH-1 public blob.
    pub fn take_mpint1(&mut self) -> Result<BigUint, AgentError> {
        let bitlen = u16::from_be_bytes(self.take(2)?.try_into().unwrap()) as usize;
        let bytelen = bitlen.div_ceil(8);
        let bytes = self.take(bytelen)?;
        Ok(BigUint::from_bytes_be(bytes))
    }

    /// An optional trailing `uint32`, defaulting to `0` when the packet ends early.
    /// Used for `SSH2_AGENTC_SIGN_REQUEST`'s optional `flags` field.
    pub fn take_u32_or_default(&mut self) -> u32 {
        self.take_u32().unwrap_or(0)
    }
}

/// Appends an SSH-2 style `string` (`uint32 length` then bytes).
pub fn append_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Appends a raw `uint32`.
pub fn append_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Appends an SSH-1 MP-int: `uint16 bit-length` then `ceil(bits/8)` big-endian bytes,
/// with no leading zero byte (unsigned, per `spec.md` §6 Glossary).
pub fn append_mpint1(out: &mut Vec<u8>, n: &BigUint) {
    let bytes = n.to_bytes_be();
    let bytes: &[u8] = if bytes == [0] { &[] } else { &bytes };
    let bitlen = if bytes.is_empty() {
        0u16
    } else {
        (bytes.len() * 8) as u16 - leading_zero_bits(bytes[0])
    };
    out.extend_from_slice(&bitlen.to_be_bytes());
    out.extend_from_slice(bytes);
}

fn leading_zero_bits(byte: u8) -> u16 {
    if byte == 0 {
        8
    } else {
        byte.leading_zeros() as u16
    }
}

/// The classic `name-list`: `uint32 length` then a comma-separated ASCII string.
pub fn append_name_list(out: &mut Vec<u8>, names: &[&str]) {
    let joined = names.join(",");
    append_string(out, joined.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpint1_round_trips_a_nonzero_value() {
        let n = BigUint::from(0x00ABu32);
        let mut buf = Vec::new();
        append_mpint1(&mut buf, &n);
        assert_eq!(&buf, &[0, 8, 0xAB]);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.take_mpint1().unwrap(), n);
    }

    #[test]
    fn mpint1_zero_encodes_as_empty_with_no_underflow() {
        let zero = BigUint::from(0u32);
        let mut buf = Vec::new();
        append_mpint1(&mut buf, &zero);
        assert_eq!(&buf, &[0, 0]);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.take_mpint1().unwrap(), zero);
    }
}
