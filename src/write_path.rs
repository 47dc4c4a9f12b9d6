//! DIRECT/BUFFERED write-path state machine.
//!
//! A connection starts, and spends most of its life, in `DIRECT`: every
//! [`send_response`] call writes straight to the socket and nothing is
//! copied. Only a short write — the peer's receive buffer filling up —
//! switches the connection into `BUFFERED`, where responses are copied
//! into the connection's output ring and drained by the write watcher as
//! the peer catches up. The exact unsent suffix of the call that caused
//! the switch is pushed to the ring before `send_response` returns, so
//! byte order survives the transition untouched.

use std::io::{self, IoSlice, Write};
use std::sync::Arc;

use crate::handler::RequestHandler;
use crate::table::{Connection, OutputState};

fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

/// Copy the unsent suffix of `buffers`, starting `sent` bytes in, into
/// the output ring. Used both for a short `writev` (`sent > 0`) and for a
/// transient error on the first attempt (`sent == 0`, the whole payload
/// is buffered).
fn buffer_remaining(output: &mut OutputState, buffers: &[&[u8]], sent: usize) -> io::Result<()> {
    let mut skip = sent;
    for buf in buffers {
        if skip >= buf.len() {
            skip -= buf.len();
            continue;
        }
        output.ring.write_bytes(&buf[skip..])?;
        skip = 0;
    }
    Ok(())
}

/// Deliver `buffers` concatenated, in order, to `conn`'s peer.
///
/// Called both from [`crate::handler::ConnHandle::send_response`] (the
/// public entry point) and, transitively, nowhere else — the write
/// watcher's drain goes through [`on_writable`] instead, since it is
/// draining already-buffered bytes rather than accepting new ones.
pub(crate) fn send_response<H: RequestHandler>(
    conn: &Connection<H>,
    buffers: &[&[u8]],
) -> io::Result<()> {
    let mut output = conn.output();
    if output.use_buffered_writes {
        for buf in buffers {
            output.ring.write_bytes(buf)?;
        }
        return Ok(());
    }

    let iovecs: Vec<IoSlice<'_>> = buffers.iter().map(|b| IoSlice::new(b)).collect();
    let total: usize = buffers.iter().map(|b| b.len()).sum();
    let mut stream = conn.stream();
    let result = stream.write_vectored(&iovecs);
    drop(iovecs);

    match result {
        Ok(sent) if sent >= total => Ok(()),
        Ok(sent) => {
            buffer_remaining(&mut output, buffers, sent)?;
            output.use_buffered_writes = true;
            drop(output);
            conn.request_schedule();
            Ok(())
        }
        Err(e) if is_transient(&e) => {
            buffer_remaining(&mut output, buffers, 0)?;
            output.use_buffered_writes = true;
            drop(output);
            conn.request_schedule();
            Ok(())
        }
        Err(e) => {
            drop(output);
            conn.close_client_connection();
            Err(e)
        }
    }
}

/// Drain as much of the output ring as the socket will currently accept,
/// called when a connection's write watcher fires.
pub(crate) fn on_writable<H: RequestHandler>(conn: &Arc<Connection<H>>) {
    let mut output = conn.output();
    if !output.use_buffered_writes {
        // Stray writable event (e.g. both interests fired together and
        // the read path already drained the ring); nothing to do.
        return;
    }

    let vecs = output.ring.setup_writev_vectors();
    if vecs.is_empty() {
        output.use_buffered_writes = false;
        return;
    }

    let mut stream = conn.stream();
    let result = stream.write_vectored(&vecs);
    drop(vecs);

    match result {
        Ok(0) => {
            log::debug!("peer closed during buffered write on fd {:?}", conn.id());
            drop(output);
            conn.close_client_connection();
        }
        Ok(n) => {
            output.ring.advance_read(n);
            let drained = output.ring.is_empty();
            output.use_buffered_writes = !drained;
            let schedulable = conn.is_schedulable();
            drop(output);
            if schedulable {
                conn.request_schedule();
            }
        }
        Err(e) if is_transient(&e) => {
            drop(output);
            if conn.is_schedulable() {
                conn.request_schedule();
            }
        }
        Err(e) => {
            log::error!("hard write error on fd {:?}: {}", conn.id(), e);
            drop(output);
            conn.close_client_connection();
        }
    }
}
