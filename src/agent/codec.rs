//! Length-prefixed framing for the agent wire protocol (`spec.md` §4.3, §6).
//!
//! A 4-byte big-endian length `L` is followed by `L` bytes of body. If `L >
//! AGENT_MAX_MSGLEN - 4` the message is "overlong": the router must reply
//! `SSH_AGENT_FAILURE` immediately and then drain the body without ever handing it to
//! the handler ("prompt feedback even while the socket is being stuffed", §4.3). This
//! decoder models that directly: it yields [`Frame::Overlong`] as soon as the length
//! is known to be too large, then silently discards exactly that many body bytes
//! across however many `decode` calls it takes, before returning to normal framing.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::protocol::AGENT_MAX_MSGLEN;

const LEN_FIELD: usize = 4;

#[derive(Debug)]
pub enum Frame {
    Body(Vec<u8>),
    Overlong,
}

enum State {
    ReadLength,
    ReadBody(u32),
    Discarding(u32),
}

pub struct AgentCodec {
    state: State,
}

impl Default for AgentCodec {
    fn default() -> Self {
        AgentCodec { state: State::ReadLength }
    }
}

impl Decoder for AgentCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, std::io::Error> {
        loop {
            match self.state {
                State::ReadLength => {
                    if src.len() < LEN_FIELD {
                        return Ok(None);
                    }
                    let len = u32::from_be_bytes(src[..LEN_FIELD].try_into().unwrap());
                    src.advance(LEN_FIELD);
                    if len > AGENT_MAX_MSGLEN - LEN_FIELD as u32 {
                        // Drain whatever of the oversized body has already arrived
                        // before reporting it, so the caller sees an empty buffer
                        // rather than a frame still sitting on bytes we've rejected.
                        let take = (len as usize).min(src.len());
                        src.advance(take);
                        let remaining = len - take as u32;
                        self.state = if remaining == 0 { State::ReadLength } else { State::Discarding(remaining) };
                        return Ok(Some(Frame::Overlong));
                    }
                    self.state = State::ReadBody(len);
                }
                State::ReadBody(len) => {
                    let len = len as usize;
                    if src.len() < len {
                        return Ok(None);
                    }
                    let body = src[..len].to_vec();
                    src.advance(len);
                    self.state = State::ReadLength;
                    return Ok(Some(Frame::Body(body)));
                }
                State::Discarding(remaining) => {
                    let take = (remaining as usize).min(src.len());
                    src.advance(take);
                    let left = remaining - take as u32;
                    if left == 0 {
                        self.state = State::ReadLength;
                        continue;
                    }
                    self.state = State::Discarding(left);
                    return Ok(None);
                }
            }
        }
    }
}

impl Encoder<Vec<u8>> for AgentCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), std::io::Error> {
        dst.extend_from_slice(&(item.len() as u32).to_be_bytes());
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_a_well_formed_message() {
        let mut codec = AgentCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(b"abc");

        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Body(b)) => assert_eq!(b, b"abc"),
            other => panic!("expected Body, got {other:?}"),
        }
    }

    #[test]
    fn overlong_message_drains_without_body() {
        let mut codec = AgentCodec::default();
        let len = AGENT_MAX_MSGLEN; // > AGENT_MAX_MSGLEN - 4
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&vec![0u8; len as usize]);

        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Overlong) => {}
            other => panic!("expected Overlong, got {other:?}"),
        }
        // all body bytes consumed as part of the single decode call (same buffer)
        assert!(buf.is_empty());

        // a well formed message that follows on the same connection still frames.
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(b"xyz");
        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Body(b)) => assert_eq!(b, b"xyz"),
            other => panic!("expected Body, got {other:?}"),
        }
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::ReadLength => write!(f, "ReadLength"),
            State::ReadBody(n) => write!(f, "ReadBody({n})"),
            State::Discarding(n) => write!(f, "Discarding({n})"),
        }
    }
}
