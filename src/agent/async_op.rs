//! `AsyncOp`: a single in-flight request, tracked so a client teardown can cancel every
//! outstanding op it owns without delivering a response (`spec.md` §3 "Async request",
//! §5 "Cancellation").
//!
//! The current `AgentRequestHandler` completes every request synchronously (§5:
//! "each request is processed atomically"), so in this crate an `AsyncOp` never
//! actually suspends — it exists as an index-based arena so the *queue discipline*
//! (reserve a slot, fill it, flush a filled prefix) is real and testable even though
//! no request currently takes more than one tick to complete. This is the "slot
//! discipline admits future out-of-order completion without breaking clients" note in
//! `spec.md` §4.3.

/// One reserved response slot, keyed by the connection-local `req_index` it belongs to.
#[derive(Debug)]
pub struct AsyncOp {
    pub req_index: u64,
    pub response: Option<Vec<u8>>,
}

impl AsyncOp {
    pub fn new(req_index: u64) -> Self {
        AsyncOp { req_index, response: None }
    }

    pub fn fulfil(&mut self, response: Vec<u8>) {
        self.response = Some(response);
    }

    pub fn is_filled(&self) -> bool {
        self.response.is_some()
    }
}

/// FIFO of reserved-but-maybe-unfilled response slots for one connection.
///
/// `push` reserves a slot before a request is processed (§4.3 "Per-request slot");
/// `drain_ready` pops and returns every filled slot from the front, stopping at the
/// first unfilled one, which is exactly the "flush any prefix of the queue whose slots
/// are all filled" rule.
#[derive(Default)]
pub struct ResponseQueue {
    slots: std::collections::VecDeque<AsyncOp>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reserved(&mut self, req_index: u64) {
        self.slots.push_back(AsyncOp::new(req_index));
    }

    /// Fills the reserved slot matching `req_index`. No-op if the slot was already
    /// removed (e.g. by [`Self::cancel_all`] during teardown).
    pub fn fulfil(&mut self, req_index: u64, response: Vec<u8>) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.req_index == req_index) {
            slot.fulfil(response);
        }
    }

    /// Removes and returns every response ready to be written, in order, stopping as
    /// soon as a reserved-but-unfilled slot is reached.
    pub fn drain_ready(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(front) = self.slots.front() {
            if !front.is_filled() {
                break;
            }
            let op = self.slots.pop_front().unwrap();
            out.push(op.response.unwrap());
        }
        out
    }

    /// Drops every pending (filled or not) slot without producing a response, for
    /// client teardown (`spec.md` §4.3 "Teardown").
    pub fn cancel_all(&mut self) {
        self.slots.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }
}
