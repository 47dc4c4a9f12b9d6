// Linux and Android register an eventfd with the selector and wake by
// writing to it, the same readiness path used for every other source.
#[cfg(any(target_os = "android", target_os = "linux"))]
mod eventfd;

#[cfg(any(target_os = "android", target_os = "linux"))]
mod fdbased {
    use std::io;
    use std::os::fd::AsRawFd;

    use super::eventfd::WakerInternal;
    use crate::sys::Selector;
    use crate::{Interest, Token};

    #[derive(Debug)]
    pub(crate) struct Waker {
        waker: WakerInternal,
    }

    impl Waker {
        pub(crate) fn new(selector: &Selector, token: Token) -> io::Result<Waker> {
            let waker = WakerInternal::new()?;
            selector.register(waker.as_raw_fd(), token, Interest::READABLE)?;
            Ok(Waker { waker })
        }

        pub(crate) fn wake(&self) -> io::Result<()> {
            self.waker.wake()
        }
    }
}

#[cfg(any(target_os = "android", target_os = "linux"))]
pub(crate) use self::fdbased::Waker;

// FreeBSD, iOS and macOS wake through the kqueue itself via EVFILT_USER,
// no extra fd needed.
#[cfg(any(target_os = "freebsd", target_os = "ios", target_os = "macos"))]
mod kqueue;

#[cfg(any(target_os = "freebsd", target_os = "ios", target_os = "macos"))]
pub(crate) use self::kqueue::Waker;

