//! `kindled` — a leader-follower networking core.
//!
//! The crate is split into two layers:
//!
//! - a thin, unmodified-in-spirit binding over the kernel readiness
//!   facility (epoll on Linux, kqueue on the BSD/Darwin family), exposed
//!   as [`Poll`], [`Registry`], [`Token`], [`Interest`], [`Events`] and
//!   [`Waker`] — this is the "demultiplexer binding" component and is
//!   deliberately narrow, the same five operations a demultiplexer needs
//!   to expose to the rest of the core;
//! - the engine built on top of it: per-connection [`buffer::Ring`]s, a
//!   [`table::ConnTable`], an [`queue::AsyncQueue`] of deferred control
//!   operations, a [`leader`] worker pool, and the [`context::Context`]
//!   that wires init/shutdown and dispatches accept/read/write events to
//!   the handlers in [`listener`], [`read_path`] and [`write_path`].
//!
//! Consumers implement [`handler::RequestHandler`] and call
//! [`context::init_networking`] to obtain a `Context`, spawn one thread
//! per worker running [`context::start_worker`], and call
//! [`context::shutdown_networking`] (safe from a signal handler) to stop.

#![deny(rust_2018_idioms, unused)]

#[macro_use]
mod macros;

mod sys;

cfg_os_poll! {
    mod io_source;
    mod poll;
    mod token;
    mod waker;

    pub use poll::{Poll, Registry};
    pub use token::Token;
}

mod interest;
pub use interest::Interest;

pub mod event;
pub use event::Events;

cfg_net! {
    pub mod net;
}

cfg_any_os_ext! {
    pub use waker::Waker;
}

cfg_io_source! {
    pub(crate) use io_source::IoSource;
}

pub mod buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod leader;
pub mod listener;
pub mod queue;
pub mod read_path;
pub mod table;
pub mod write_path;

pub use buffer::{Extracted, Ring};
pub use config::Config;
pub use context::{init_networking, shutdown_networking, start_worker, Context};
pub use error::{NetError, Result};
pub use handler::RequestHandler;
pub use table::ConnId;
