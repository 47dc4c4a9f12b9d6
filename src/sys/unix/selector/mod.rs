#[cfg(any(target_os = "android", target_os = "linux"))]
mod epoll;

#[cfg(any(target_os = "android", target_os = "linux"))]
pub(crate) use self::epoll::{event, Event, Events, Selector};

#[cfg(any(target_os = "freebsd", target_os = "ios", target_os = "macos"))]
mod kqueue;

#[cfg(any(target_os = "freebsd", target_os = "ios", target_os = "macos"))]
pub(crate) use self::kqueue::{event, Event, Events, Selector};

mod stateless_io_source;
cfg_io_source! {
    pub(crate) use self::stateless_io_source::IoSourceState;
}
