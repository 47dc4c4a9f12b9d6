//! Networking primitives.
//!
//! The types provided in this module are non-blocking by default and wrap
//! the platform socket APIs used by the rest of the crate: accepted and
//! reserved sockets alike go through [`IoSource`] so they can be registered
//! with [`Poll`] directly.
//!
//! [`IoSource`]: crate::IoSource
//! [`Poll`]: crate::Poll

#[cfg(feature = "net")]
mod tcp;
#[cfg(feature = "net")]
pub use self::tcp::{TcpListener, TcpStream};

#[cfg(feature = "net")]
mod udp;
#[cfg(feature = "net")]
pub use self::udp::UdpSocket;

#[cfg(feature = "net")]
fn convert_address(address: socket2::SockAddr) -> std::io::Result<std::net::SocketAddr> {
    address.as_socket().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "invalid address family, expected IPv4 or IPv6",
        )
    })
}
