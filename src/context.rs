//! Process-wide networking context: init, worker entry point, shutdown.
//!
//! [`Context`] is the handle applications hold. The state every worker
//! thread and every [`Connection`](crate::table::Connection) back-reference
//! actually touches lives in [`Inner`], `Arc`-shared between them; splitting
//! the two lets [`shutdown_networking`] take `&Context` while a worker still
//! mid-dispatch keeps its own clone of `Arc<Inner<H>>` alive.

use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::Config;
use crate::error::{NetError, Result};
use crate::handler::RequestHandler;
use crate::leader;
use crate::net::{TcpListener, UdpSocket};
use crate::queue::{AsyncCommand, AsyncQueue};
use crate::sys::SourceFd;
use crate::table::{ConnId, ConnTable};
use crate::{Interest, Poll, Registry, Token, Waker};

/// Reserved token the async wakeup watcher fires under.
///
/// Connection and listener tokens equal a live fd number (never this
/// large in practice), so `usize::MAX` can never collide with one.
pub(crate) const WAKER_TOKEN: Token = Token(usize::MAX);

/// Process-wide singleton of the networking core.
///
/// Binds listeners at construction ([`init_networking`]); each worker
/// thread runs [`start_worker`] against a clone of this handle;
/// [`shutdown_networking`] requests a graceful stop.
pub struct Context<H: RequestHandler> {
    pub(crate) inner: Arc<Inner<H>>,
}

impl<H: RequestHandler> Clone for Context<H> {
    fn clone(&self) -> Context<H> {
        Context {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct Inner<H: RequestHandler> {
    pub(crate) handler: H,
    poll: Mutex<Poll>,
    pub(crate) registry: Registry,
    pub(crate) table: ConnTable<H>,
    queue: AsyncQueue,
    waker: Waker,
    tcp_listener: TcpListener,
    tcp_token: Token,
    udp_socket: UdpSocket,
    udp_token: Token,
    /// Serializes entry into the demultiplexer; held only around one
    /// `Poll::poll` call, never across handler dispatch.
    leader_mutex: Mutex<()>,
    should_run: AtomicBool,
    /// Instrumentation for the single-leader property: never observed
    /// above 1 by any test, since the leader mutex makes that impossible.
    pub(crate) active_leaders: AtomicUsize,
}

impl<H: RequestHandler> Inner<H> {
    pub(crate) fn poll_lock(&self) -> MutexGuard<'_, Poll> {
        self.poll.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn leader_lock(&self) -> MutexGuard<'_, ()> {
        self.leader_mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn should_run(&self) -> bool {
        self.should_run.load(Ordering::Acquire)
    }

    pub(crate) fn waker_token(&self) -> Token {
        WAKER_TOKEN
    }

    pub(crate) fn tcp_token(&self) -> Token {
        self.tcp_token
    }

    pub(crate) fn udp_token(&self) -> Token {
        self.udp_token
    }

    pub(crate) fn tcp_listener(&self) -> &TcpListener {
        &self.tcp_listener
    }

    pub(crate) fn udp_socket(&self) -> &UdpSocket {
        &self.udp_socket
    }

    /// Ask the event loop to (re-)arm `token`'s watcher. Safe from any
    /// thread; the actual `register`/`reregister` syscall happens inside
    /// the next loop iteration's command drain, never here.
    pub(crate) fn schedule_watcher(&self, token: Token) {
        self.queue.push(AsyncCommand::ScheduleWatcher(token));
        if let Err(e) = self.waker.wake() {
            log::error!("failed to wake event loop: {}", e);
        }
    }

    /// Stop a watcher so it cannot re-fire before the leader that just
    /// observed it hands dispatch off. Idempotent: deregistering an
    /// already-stopped fd is a harmless no-op error we discard.
    pub(crate) fn stop_watcher(&self, token: Token) {
        let fd = token.0 as RawFd;
        let mut source = SourceFd(&fd);
        let _ = self.registry.deregister(&mut source);
    }

    /// Drain and apply every pending [`AsyncCommand`]. Called from inside
    /// a loop iteration only — watcher state must never be mutated from
    /// outside one.
    pub(crate) fn drain_commands(&self) {
        for command in self.queue.drain() {
            match command {
                AsyncCommand::Exit => {
                    self.should_run.store(false, Ordering::Release);
                }
                AsyncCommand::ScheduleWatcher(token) => {
                    self.arm_watcher(token);
                }
            }
        }
    }

    fn arm_watcher(&self, token: Token) {
        if token == self.tcp_token {
            self.reregister_fd(self.tcp_listener.as_raw_fd(), token, Interest::READABLE, "TCP listener");
            return;
        }
        if token == self.udp_token {
            self.reregister_fd(self.udp_socket.as_raw_fd(), token, Interest::READABLE, "UDP socket");
            return;
        }

        let Some(conn) = self.table.get(ConnId::from(token)) else {
            return;
        };
        if !conn.is_schedulable() {
            return;
        }
        let fd = token.0 as RawFd;
        let mut source = SourceFd(&fd);
        let interest = conn.desired_interest();
        let result = if conn.take_needs_register() {
            self.registry.register(&mut source, token, interest)
        } else {
            self.registry.reregister(&mut source, token, interest)
        };
        if let Err(e) = result {
            log::error!("failed to arm watcher for fd {}: {}", fd, e);
        }
    }

    fn reregister_fd(&self, fd: RawFd, token: Token, interest: Interest, what: &str) {
        let mut source = SourceFd(&fd);
        if let Err(e) = self.registry.reregister(&mut source, token, interest) {
            log::error!("failed to re-arm {} watcher: {}", what, e);
        }
    }
}

impl<H: RequestHandler> Drop for Inner<H> {
    /// Final sweep: close every still-open connection and drop the
    /// listener/waker handles, which close their descriptors. Runs once,
    /// when the last `Arc<Inner<H>>` (held by `Context` and every worker
    /// mid-dispatch) goes away — i.e. only after every worker's
    /// `start_worker` call has returned.
    fn drop(&mut self) {
        for conn in self.table.all() {
            conn.close_client_connection();
        }
        self.stop_watcher(self.tcp_token);
        self.stop_watcher(self.udp_token);
    }
}

/// Bind listeners and install the demultiplexer and async wakeup watcher.
///
/// On any failure, everything acquired so far (listener sockets, their
/// registrations) is released before returning; no partial `Context` ever
/// escapes this function.
pub fn init_networking<H: RequestHandler>(config: Config, handler: H) -> Result<Context<H>> {
    let poll = Poll::new().map_err(NetError::PollInit)?;
    let registry = poll.registry().clone();

    let tcp_addr = SocketAddr::from(([0, 0, 0, 0], config.tcp_port));
    let mut tcp_listener = TcpListener::bind(tcp_addr).map_err(|source| NetError::Bind {
        port: config.tcp_port,
        source,
    })?;
    let tcp_token = Token(tcp_listener.as_raw_fd() as usize);
    registry
        .register(&mut tcp_listener, tcp_token, Interest::READABLE)
        .map_err(NetError::Io)?;

    let udp_addr = SocketAddr::from(([0, 0, 0, 0], config.udp_port));
    let mut udp_socket = match UdpSocket::bind(udp_addr) {
        Ok(socket) => socket,
        Err(source) => {
            let _ = registry.deregister(&mut tcp_listener);
            return Err(NetError::Bind {
                port: config.udp_port,
                source,
            });
        }
    };
    let udp_token = Token(udp_socket.as_raw_fd() as usize);
    if let Err(e) = registry.register(&mut udp_socket, udp_token, Interest::READABLE) {
        let _ = registry.deregister(&mut tcp_listener);
        return Err(NetError::Io(e));
    }

    let waker = match Waker::new(&registry, WAKER_TOKEN) {
        Ok(waker) => waker,
        Err(e) => {
            let _ = registry.deregister(&mut tcp_listener);
            let _ = registry.deregister(&mut udp_socket);
            return Err(NetError::PollInit(e));
        }
    };

    handler.init();

    let inner = Arc::new(Inner {
        handler,
        poll: Mutex::new(poll),
        registry,
        table: ConnTable::new(),
        queue: AsyncQueue::new(),
        waker,
        tcp_listener,
        tcp_token,
        udp_socket,
        udp_token,
        leader_mutex: Mutex::new(()),
        should_run: AtomicBool::new(true),
        active_leaders: AtomicUsize::new(0),
    });

    Ok(Context { inner })
}

/// Run the leader-follower loop on the calling thread until shutdown.
///
/// Must be invoked once per worker thread. Returns only after
/// [`shutdown_networking`] has been called and this thread has observed
/// it (either between iterations or having just finished handling the
/// event it was dispatching when shutdown was requested).
pub fn start_worker<H: RequestHandler>(context: &Context<H>) {
    leader::run(&context.inner);
}

/// Request a graceful shutdown.
///
/// Touches only an atomic flag, an already-lock-minimal queue push, and a
/// wakeup — safe to call from a signal-handling thread.
pub fn shutdown_networking<H: RequestHandler>(context: &Context<H>) {
    context.inner.should_run.store(false, Ordering::Release);
    context.inner.queue.push(AsyncCommand::Exit);
    let _ = context.inner.waker.wake();
}
