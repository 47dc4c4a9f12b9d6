//! Leader-follower worker pool.
//!
//! At most one worker thread is ever inside the demultiplexer: each
//! iteration serializes on [`Inner::leader_lock`] just long enough to run
//! one [`Poll::poll`] call and record which single watcher fired, then
//! releases the lock before dispatching that watcher's handler. Any
//! number of workers may be running handler code concurrently; only
//! entry into the demultiplexer itself is serialized.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::context::Inner;
use crate::event::Events;
use crate::handler::RequestHandler;
use crate::table::ConnId;
use crate::{listener, read_path, write_path};
use crate::Token;

/// One fired watcher, recorded by this thread while it held the leader
/// lock. Stands in for the original design's thread-local "event record":
/// here it is simply a local the loop body owns for one iteration.
struct FiredEvent {
    token: Token,
    readable: bool,
    writable: bool,
}

/// Run the leader-follower loop on the calling thread until shutdown.
///
/// The worker loop's exit condition is checked twice per iteration: once
/// before attempting to acquire the leader lock (so a thread waiting on a
/// contended lock doesn't have to win it just to immediately give it back
/// up), and again immediately after acquiring it (closing the race where
/// `should_run` flips to false while this thread was blocked on the
/// lock).
pub(crate) fn run<H: RequestHandler>(inner: &Arc<Inner<H>>) {
    let mut events = Events::with_capacity(1);

    loop {
        if !inner.should_run() {
            return;
        }

        let fired = {
            let _leader = inner.leader_lock();
            if !inner.should_run() {
                return;
            }

            inner.active_leaders.fetch_add(1, Ordering::SeqCst);
            let result = run_one_iteration(inner, &mut events);
            inner.active_leaders.fetch_sub(1, Ordering::SeqCst);

            // Stop the fired watcher while still holding the leader lock:
            // a second thread must not be able to enter `Poll::poll` and
            // observe the same (edge-triggered) watcher fire again before
            // this one is deregistered, or two threads end up racing each
            // other's `read_vectored` on the same connection.
            if let Some(fired) = &result {
                if fired.token != inner.waker_token() {
                    inner.stop_watcher(fired.token);
                }
            }

            result
        };

        let Some(fired) = fired else { continue };

        dispatch(inner, fired);
    }
}

fn run_one_iteration<H: RequestHandler>(
    inner: &Arc<Inner<H>>,
    events: &mut Events,
) -> Option<FiredEvent> {
    let mut poll = inner.poll_lock();
    match poll.poll(events, None) {
        Ok(_) => events.iter().next().map(|event| FiredEvent {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => None,
        Err(e) => {
            log::error!("demultiplexer iteration failed: {}", e);
            None
        }
    }
}

fn dispatch<H: RequestHandler>(inner: &Arc<Inner<H>>, fired: FiredEvent) {
    log::trace!("dispatching token {:?} (r={} w={})", fired.token, fired.readable, fired.writable);

    if fired.token == inner.waker_token() {
        inner.drain_commands();
        return;
    }
    if fired.token == inner.tcp_token() {
        listener::on_acceptable(inner);
        return;
    }
    if fired.token == inner.udp_token() {
        listener::on_udp_readable(inner);
        return;
    }

    let Some(conn) = inner.table.get(ConnId::from(fired.token)) else {
        return;
    };
    if fired.readable {
        read_path::on_readable(&conn, &inner.handler);
    }
    if fired.writable {
        write_path::on_writable(&conn);
    }
}
