//! Cross-thread control queue for the event loop.
//!
//! Watcher state (starting/stopping interest in [`crate::Registry`]) may
//! only be mutated from inside a loop iteration. Worker threads and
//! handler code that need to re-arm a watcher, or ask the loop to exit,
//! post an [`AsyncCommand`] here instead of touching the demultiplexer
//! directly, then signal the loop's [`crate::Waker`] so it wakes up and
//! drains the queue on its own thread.

use std::sync::Mutex;

use crate::Token;

/// A deferred control operation for the event loop.
///
/// Commands are idempotent intents, not instructions with an ordering
/// requirement: `ScheduleWatcher(t)` means "make sure `t`'s watcher is
/// armed," which is unaffected by how many times it's requested or in
/// what order relative to other tokens' commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncCommand {
    /// Break the leader-follower loop on every worker.
    Exit,
    /// Re-arm the watcher for this token.
    ScheduleWatcher(Token),
}

/// A LIFO queue of pending [`AsyncCommand`]s.
///
/// Backed by a `Mutex<Vec<_>>` standing in for the original
/// spinlock-protected singly linked list: push and drain both hold the
/// lock only across a `Vec` mutation, never across a syscall, matching
/// the locking discipline a spinlock would require.
#[derive(Default)]
pub struct AsyncQueue {
    commands: Mutex<Vec<AsyncCommand>>,
}

impl AsyncQueue {
    pub fn new() -> AsyncQueue {
        AsyncQueue {
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Push a command onto the queue. Callers are expected to follow this
    /// with a `Waker::wake()` call to pull the event loop out of its
    /// blocking wait; that step lives on [`crate::context::Context`]
    /// rather than here so the queue stays a plain data structure with no
    /// dependency on the demultiplexer binding.
    pub fn push(&self, command: AsyncCommand) {
        let mut commands = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        commands.push(command);
    }

    /// Take every pending command, leaving the queue empty. Ordering
    /// among the returned commands is unspecified (LIFO pop order) and,
    /// per the command semantics above, does not need to be.
    pub fn drain(&self) -> Vec<AsyncCommand> {
        let mut commands = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *commands)
    }
}
