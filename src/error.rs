use std::io;

/// Errors surfaced across the `init_networking` boundary.
///
/// Per-connection errors (transient I/O, peer close, hard socket errors,
/// ring-growth allocator failure) never reach this type: they are
/// logged and handled inline by closing the connection, per the
/// per-connection-errors-are-contained rule. `NetError` covers only the
/// class of failure that can prevent the core from starting at all.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// A syscall during listener setup failed for reasons other than a
    /// port already being bound (see [`NetError::Bind`]).
    #[error("I/O error initializing networking core: {0}")]
    Io(#[from] io::Error),

    /// Binding a configured TCP or UDP port failed.
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    /// The demultiplexer (`Poll`) failed to initialize.
    #[error("failed to initialize event demultiplexer: {0}")]
    PollInit(io::Error),

    /// The supplied configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias for fallible init-time operations.
pub type Result<T> = std::result::Result<T, NetError>;
