//! The connection record and the table that indexes it by descriptor.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::buffer::Ring;
use crate::context::Inner;
use crate::handler::RequestHandler;
use crate::net::TcpStream;
use crate::sys::SourceFd;
use crate::{Interest, Token};

/// Newtype over the raw descriptor backing a connection.
///
/// Doubles as the connection table's index and, via [`Token::from`], as
/// the [`Token`] the descriptor is registered under — a descriptor
/// number is already unique for as long as it is open, so there is no
/// need for a second identifier space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub(crate) RawFd);

impl ConnId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<ConnId> for Token {
    fn from(id: ConnId) -> Token {
        Token(id.index())
    }
}

impl From<Token> for ConnId {
    fn from(token: Token) -> ConnId {
        ConnId(token.0 as RawFd)
    }
}

/// The output ring plus the write-path state machine's own flag, both
/// covered by [`Connection`]'s single output lock per the data model.
pub(crate) struct OutputState {
    pub(crate) ring: Ring,
    pub(crate) use_buffered_writes: bool,
}

/// One active (or logically closed but not yet released) descriptor.
///
/// The input ring has no lock of its own: the leader-follower pool's
/// watcher-stop discipline already guarantees only one thread ever
/// touches a given connection's read path at a time, so a `Mutex` here
/// exists only to satisfy `Sync`, never to arbitrate real contention.
/// The output ring, by contrast, really is reachable concurrently (a
/// `send_response` call racing a write-watcher drain), so its lock is
/// load-bearing.
pub struct Connection<H: RequestHandler> {
    id: ConnId,
    context: Weak<Inner<H>>,
    stream: TcpStream,
    input: Mutex<Ring>,
    output: Mutex<OutputState>,
    schedulable: AtomicBool,
    needs_register: AtomicBool,
}

impl<H: RequestHandler> Connection<H> {
    pub(crate) fn new(stream: TcpStream, context: Weak<Inner<H>>) -> Arc<Connection<H>> {
        let id = ConnId(stream.as_raw_fd());
        Arc::new(Connection {
            id,
            context,
            stream,
            input: Mutex::new(Ring::new()),
            output: Mutex::new(OutputState {
                ring: Ring::new(),
                use_buffered_writes: false,
            }),
            schedulable: AtomicBool::new(true),
            needs_register: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub(crate) fn token(&self) -> Token {
        Token::from(self.id)
    }

    pub(crate) fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub(crate) fn input(&self) -> MutexGuard<'_, Ring> {
        self.input.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn output(&self) -> MutexGuard<'_, OutputState> {
        self.output.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_schedulable(&self) -> bool {
        self.schedulable.load(Ordering::Acquire)
    }

    /// `true` the first time this is called for a given connection, then
    /// `false` forever after; lets the single command-drain code path
    /// that owns all `register`/`reregister` calls tell which one it
    /// needs to make for this descriptor.
    pub(crate) fn take_needs_register(&self) -> bool {
        self.needs_register.swap(false, Ordering::AcqRel)
    }

    /// The interest the watcher should carry right now: always readable,
    /// plus writable while the write path is buffering output.
    pub(crate) fn desired_interest(&self) -> Interest {
        if self.output().use_buffered_writes {
            Interest::READABLE.add(Interest::WRITABLE)
        } else {
            Interest::READABLE
        }
    }

    /// Ask the event loop to (re-)arm this connection's watcher. Safe to
    /// call from any thread; the actual `register`/`reregister` syscall
    /// happens inside the next loop iteration's command drain.
    pub(crate) fn request_schedule(&self) {
        if let Some(inner) = self.context.upgrade() {
            inner.schedule_watcher(self.token());
        }
    }

    /// Idempotent: stop the watcher, reset both rings, shut the socket
    /// down. Safe to call from handler code, the read path, or the write
    /// path without coordination.
    pub fn close_client_connection(&self) {
        if !self.schedulable.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.context.upgrade() {
            let fd = self.stream.as_raw_fd();
            let mut source = SourceFd(&fd);
            let _ = inner.registry.deregister(&mut source);
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        *self.input() = Ring::new();
        let mut output = self.output();
        output.ring = Ring::new();
        output.use_buffered_writes = false;
    }
}

/// Dense array of connection slots indexed by descriptor number, grown by
/// doubling under a mutex held only across the resize.
///
/// A slot is never removed once occupied; a descriptor reused by the
/// kernel for a fresh `accept` simply gets a fresh [`Connection`] stored
/// over the old one; any handler code still holding a clone of the old
/// `Arc` keeps it alive exactly as long as it needs to, which sidesteps
/// the ABA concern the original array-of-raw-pointers design had to guard
/// against by hand.
pub struct ConnTable<H: RequestHandler> {
    slots: Mutex<Vec<Option<Arc<Connection<H>>>>>,
}

impl<H: RequestHandler> ConnTable<H> {
    pub(crate) fn new() -> ConnTable<H> {
        ConnTable {
            slots: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn insert(&self, conn: Arc<Connection<H>>) {
        let idx = conn.id().index();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if idx >= slots.len() {
            let mut new_len = slots.len().max(1);
            while idx >= new_len {
                new_len *= 2;
            }
            slots.resize(new_len, None);
        }
        slots[idx] = Some(conn);
    }

    pub(crate) fn get(&self, id: ConnId) -> Option<Arc<Connection<H>>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(id.index()).and_then(|slot| slot.clone())
    }

    /// Every occupied slot, for shutdown's final sweep over open
    /// descriptors.
    pub(crate) fn all(&self) -> Vec<Arc<Connection<H>>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.iter().filter_map(|slot| slot.clone()).collect()
    }
}
