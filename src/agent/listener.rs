//! `Listener`: accepts client connections and spawns `ConnectionRouter`s
//! (`spec.md` §4.4).
//!
//! `spec.md` leaves the concrete endpoint (named pipe / Unix socket / Windows message
//! bridge) as a platform detail outside this spec's scope; this crate picks a Unix
//! domain socket, matching `fast-rpc::server::handle_connection`'s
//! `tokio::net::TcpStream` pattern but swapped to `UnixStream` for local-trust-only
//! transport (`spec.md` §1 Non-goals: "no network-exposed agent").

use super::handler::AgentCore;
use super::router::{ConnIndex, ConnectionRouter};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::UnixListener;
use tracing::{error, info};

pub struct Listener {
    inner: UnixListener,
    next_conn_index: AtomicU64,
}

impl Listener {
    /// Binds a Unix domain socket at `path`, removing any stale socket file left over
    /// from a previous run.
    pub fn bind(path: &Path) -> std::io::Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let inner = UnixListener::bind(path)?;
        Ok(Listener { inner, next_conn_index: AtomicU64::new(0) })
    }

    /// Accepts connections forever, spawning one `tokio::task::spawn_local` task per
    /// connection so arbitrarily many clients are served concurrently
    /// ("serving arbitrarily many concurrent local client connections", `spec.md` §1)
    /// while every task still runs on the single worker thread that owns `core`
    /// (`spec.md` §5: "exactly one event loop"). Must be run inside a
    /// `tokio::task::LocalSet` since `Rc<RefCell<_>>` is not `Send`.
    ///
    /// A single connection failing to accept never brings the listener down
    /// ("Listener survives individual connection failures", §4.4).
    pub async fn serve(&self, core: Rc<RefCell<AgentCore>>) {
        loop {
            match self.inner.accept().await {
                Ok((stream, _addr)) => {
                    let conn_index: ConnIndex = self.next_conn_index.fetch_add(1, Ordering::Relaxed);
                    info!(conn_index, "accepted agent connection");
                    let core = Rc::clone(&core);
                    tokio::task::spawn_local(async move {
                        let mut router = ConnectionRouter::new(conn_index);
                        router.run(stream, core).await;
                        info!(conn_index, "agent connection finished");
                    });
                }
                Err(err) => {
                    error!(error = %err, "failed to accept agent connection");
                }
            }
        }
    }
}
