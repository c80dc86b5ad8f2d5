//! `ConnectionRouter`: per-connection framing, request serialization to the handler,
//! and strictly-ordered response delivery (`spec.md` §4.3).

use super::async_op::ResponseQueue;
use super::codec::{AgentCodec, Frame};
use super::handler::AgentCore;
use futures::{SinkExt, StreamExt};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tracing::{info, warn};

/// Monotonic id assigned to each accepted connection by the [`super::listener::Listener`].
pub type ConnIndex = u64;

/// One client connection's state (`spec.md` §3 "Client session").
pub struct ConnectionRouter {
    conn_index: ConnIndex,
    next_req_index: u64,
    responses: ResponseQueue,
    suppress_logging: bool,
}

impl ConnectionRouter {
    pub fn new(conn_index: ConnIndex) -> Self {
        ConnectionRouter {
            conn_index,
            next_req_index: 0,
            responses: ResponseQueue::new(),
            suppress_logging: false,
        }
    }

    pub fn conn_index(&self) -> ConnIndex {
        self.conn_index
    }

    /// Drives one connection to completion: reads frames, dispatches each to
    /// `core.handle_request` (synchronously — §5 "every request is processed
    /// atomically"), and flushes the ordered response queue after each step.
    ///
    /// On socket error or close, every still-pending slot is cancelled without a
    /// response (§4.3 "Teardown") and the error (if any) is logged, never surfaced to
    /// the peer.
    ///
    /// `core` is an `Rc<RefCell<_>>` rather than a lock: every connection's task runs
    /// on the same single-threaded runtime (`spec.md` §5's "exactly one event loop"),
    /// so the `RefCell` borrow is only ever held for the duration of one synchronous
    /// `handle_request` call and can never actually contend.
    pub async fn run(&mut self, stream: UnixStream, core: Rc<RefCell<AgentCore>>) {
        let mut framed = Framed::new(stream, AgentCodec::default());

        loop {
            match framed.next().await {
                Some(Ok(Frame::Body(body))) => {
                    let req_index = self.next_req_index;
                    self.next_req_index += 1;
                    self.responses.push_reserved(req_index);

                    let response = core.borrow_mut().handle_request(&body, self.suppress_logging);
                    self.responses.fulfil(req_index, response);

                    if self.flush(&mut framed).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Frame::Overlong)) => {
                    let req_index = self.next_req_index;
                    self.next_req_index += 1;
                    self.responses.push_reserved(req_index);
                    self.responses.fulfil(req_index, vec![crate::agent::protocol::SSH_AGENT_FAILURE]);

                    if self.flush(&mut framed).await.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!(conn_index = self.conn_index, error = %err, "connection read error");
                    break;
                }
                None => {
                    info!(conn_index = self.conn_index, "connection closed by peer");
                    break;
                }
            }
        }

        self.responses.cancel_all();
    }

    async fn flush(&mut self, framed: &mut Framed<UnixStream, AgentCodec>) -> Result<(), std::io::Error> {
        for response in self.responses.drain_ready() {
            framed.send(response).await?;
        }
        Ok(())
    }

    pub fn set_suppress_logging(&mut self, suppress: bool) {
        self.suppress_logging = suppress;
    }
}
