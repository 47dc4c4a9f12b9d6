cfg_os_poll! {
    #[cfg(unix)]
    pub(crate) use self::unix::{event, Event, Events, Selector};

    cfg_any_os_ext! {
        #[cfg(unix)]
        pub(crate) use self::unix::Waker;
    }
}

#[cfg(unix)]
mod unix;

cfg_net! {
    #[cfg(unix)]
    pub(crate) use self::unix::tcp;

    #[cfg(unix)]
    pub(crate) use self::unix::LISTEN_BACKLOG_SIZE;
}

cfg_io_source! {
    #[cfg(unix)]
    pub(crate) use self::unix::IoSourceState;
}

#[cfg(unix)]
pub(crate) use self::unix::source_fd::SourceFd;
