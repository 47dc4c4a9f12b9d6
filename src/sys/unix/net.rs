use std::io;
use std::os::fd::RawFd;

pub(crate) fn new_socket(domain: libc::c_int, socket_type: libc::c_int) -> io::Result<RawFd> {
    #[cfg(any(target_os = "android", target_os = "freebsd", target_os = "linux"))]
    let socket_type = socket_type | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC;

    let socket = syscall!(socket(domain, socket_type, 0))?;

    #[cfg(any(target_os = "ios", target_os = "macos"))]
    {
        syscall!(fcntl(socket, libc::F_SETFD, libc::FD_CLOEXEC))?;
        let flags = syscall!(fcntl(socket, libc::F_GETFL))?;
        syscall!(fcntl(socket, libc::F_SETFL, flags | libc::O_NONBLOCK))?;
    }

    Ok(socket)
}
