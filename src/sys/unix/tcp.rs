use std::io;
use std::mem::size_of;
use std::net::{self, SocketAddr};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use crate::sys::unix::net::new_socket;

pub(crate) fn new_for_addr(address: SocketAddr) -> io::Result<RawFd> {
    let domain = match address {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };
    new_socket(domain, libc::SOCK_STREAM)
}

pub(crate) fn bind(socket: &net::TcpListener, addr: SocketAddr) -> io::Result<()> {
    use socket2::SockAddr;

    let addr = SockAddr::from(addr);
    syscall!(bind(
        socket.as_raw_fd(),
        addr.as_ptr(),
        addr.len() as libc::socklen_t,
    ))
    .map(|_| ())
}

pub(crate) fn listen(socket: &net::TcpListener, backlog: u32) -> io::Result<()> {
    let backlog = backlog.try_into().unwrap_or(i32::MAX);
    syscall!(listen(socket.as_raw_fd(), backlog)).map(|_| ())
}

pub(crate) fn accept(listener: &net::TcpListener) -> io::Result<(net::TcpStream, SocketAddr)> {
    let mut addr: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut length = size_of::<libc::sockaddr_storage>() as libc::socklen_t;

    let stream_fd = syscall!(accept4(
        listener.as_raw_fd(),
        &mut addr as *mut _ as *mut _,
        &mut length,
        libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
    ))?;

    let stream = unsafe { net::TcpStream::from_raw_fd(stream_fd) };
    let socket_addr = unsafe { to_socket_addr(&addr, length)? };
    Ok((stream, socket_addr))
}

pub(crate) fn set_reuseaddr(socket: &net::TcpListener, reuseaddr: bool) -> io::Result<()> {
    let val: libc::c_int = reuseaddr as libc::c_int;
    syscall!(setsockopt(
        socket.as_raw_fd(),
        libc::SOL_SOCKET,
        libc::SO_REUSEADDR,
        &val as *const libc::c_int as *const libc::c_void,
        size_of::<libc::c_int>() as libc::socklen_t,
    ))
    .map(|_| ())
}

unsafe fn to_socket_addr(
    storage: &libc::sockaddr_storage,
    length: libc::socklen_t,
) -> io::Result<SocketAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            assert!(length as usize >= size_of::<libc::sockaddr_in>());
            let addr: libc::sockaddr_in =
                *(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in);
            let ip = std::net::Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);
            Ok(SocketAddr::from((ip, port)))
        }
        libc::AF_INET6 => {
            assert!(length as usize >= size_of::<libc::sockaddr_in6>());
            let addr: libc::sockaddr_in6 =
                *(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in6);
            let ip = std::net::Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);
            Ok(SocketAddr::from((ip, port, addr.sin6_flowinfo, addr.sin6_scope_id)))
        }
        family => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unexpected socket family: {family}"),
        )),
    }
}
