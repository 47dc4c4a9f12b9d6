//! The external request-handler collaborator.
//!
//! The networking core is deliberately ignorant of request semantics: it
//! frames bytes on a caller-chosen terminator and hands the framed (or
//! not-yet-framed) input ring to whatever implements [`RequestHandler`].
//! This mirrors a filter-manager-style boundary — a single long-lived
//! object reachable from every connection, with no per-call locking
//! contract implied by the core itself.

use std::io;
use std::sync::Arc;

use crate::buffer::Ring;
use crate::table::Connection;

/// Implemented by the server-specific business logic layered on top of
/// this crate's connection handling.
pub trait RequestHandler: Send + Sync + 'static {
    /// Called once, before any worker thread enters its leader-follower
    /// loop.
    fn init(&self) {}

    /// Called after every read that added bytes to `handle`'s input ring.
    ///
    /// Implementations typically call [`ConnHandle::with_input`] in a
    /// loop until [`Ring::extract_to_terminator`] returns `None`, and
    /// reply via [`ConnHandle::send_response`]. Returning `Err` closes
    /// the connection, the same as calling [`ConnHandle::close`].
    fn handle_request(&self, handle: &ConnHandle<Self>) -> io::Result<()>;
}

/// A connection as seen from inside [`RequestHandler::handle_request`].
///
/// Exposes the input ring and the two operations a handler needs —
/// sending a response and closing the connection — and nothing else;
/// the raw socket and the write-path state machine stay internal to
/// [`crate::write_path`].
pub struct ConnHandle<H: RequestHandler> {
    pub(crate) conn: Arc<Connection<H>>,
}

impl<H: RequestHandler> ConnHandle<H> {
    pub(crate) fn new(conn: Arc<Connection<H>>) -> ConnHandle<H> {
        ConnHandle { conn }
    }

    /// Run `f` with exclusive access to the connection's input ring.
    ///
    /// The lock is held only for the duration of `f`, never across a
    /// socket syscall.
    pub fn with_input<R>(&self, f: impl FnOnce(&mut Ring) -> R) -> R {
        let mut ring = self.conn.input();
        f(&mut ring)
    }

    /// Deliver `buffers` concatenated, in call order, to the peer.
    pub fn send_response(&self, buffers: &[&[u8]]) -> io::Result<()> {
        crate::write_path::send_response(&self.conn, buffers)
    }

    /// Idempotent: stop the watcher, reset both rings, close the
    /// descriptor.
    pub fn close(&self) {
        self.conn.close_client_connection();
    }
}
