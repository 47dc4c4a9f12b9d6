//! Listener handlers: accept new TCP clients; drain (never parse) the
//! reserved UDP socket.

use std::io;
use std::sync::Arc;

use crate::context::Inner;
use crate::handler::RequestHandler;
use crate::net::TcpStream;
use crate::table::Connection;

/// Called when the TCP listener's watcher fires.
///
/// Accepts every client the kernel currently has queued (a drain loop
/// required because the underlying registration is edge-triggered, so a
/// single `accept` would leave a second already-pending connection
/// waiting for a wakeup that will never come), configures each accepted
/// socket, installs it in the connection table, and schedules its read
/// watcher. Re-arms the listener itself afterward via the async queue,
/// same as any other watcher.
pub(crate) fn on_acceptable<H: RequestHandler>(inner: &Arc<Inner<H>>) {
    loop {
        match inner.tcp_listener().accept() {
            Ok((stream, _peer_addr)) => accept_one(inner, stream),
            Err(e) if is_transient(&e) => break,
            Err(e) => {
                log::error!("accept failed: {}", e);
                break;
            }
        }
    }
    inner.schedule_watcher(inner.tcp_token());
}

fn accept_one<H: RequestHandler>(inner: &Arc<Inner<H>>, stream: TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        log::error!("failed to set TCP_NODELAY on accepted socket: {}", e);
    }
    if let Err(e) = stream.set_keepalive(true) {
        log::error!("failed to set SO_KEEPALIVE on accepted socket: {}", e);
    }

    let conn = Connection::new(stream, Arc::downgrade(inner));
    inner.table.insert(Arc::clone(&conn));
    conn.request_schedule();
}

/// Called when the reserved UDP socket's watcher fires.
///
/// Drains every pending datagram without interpreting its payload, per
/// the crate's "reserved socket only" non-goal for UDP. Re-arms itself
/// afterward like any other watcher.
pub(crate) fn on_udp_readable<H: RequestHandler>(inner: &Arc<Inner<H>>) {
    let mut scratch = [0u8; 1500];
    loop {
        match inner.udp_socket().recv(&mut scratch) {
            Ok(n) => log::debug!("drained {} bytes from reserved UDP socket (unparsed)", n),
            Err(e) if is_transient(&e) => break,
            Err(e) => {
                log::error!("reserved UDP socket read error: {}", e);
                break;
            }
        }
    }
    inner.schedule_watcher(inner.udp_token());
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
