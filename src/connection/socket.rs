//! `listen`/`connect`/`accept` and the socket option surface. Address
//! resolution and the accept loop live here; the wire protocol itself lives
//! in [`super::engine`].

use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::BorrowedFd;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::sys::socket::{setsockopt, sockopt, LingerOption};
use nix::sys::time::TimeVal;

use crate::error::Error;

use super::{AcceptMode, Connection, ConnectOptions, IpVersion, Linger, Role, Tunables};

fn borrow(fd: &impl AsRawFd) -> BorrowedFd<'_> {
    unsafe { BorrowedFd::borrow_raw(fd.as_raw_fd()) }
}

fn matches_version(addr: &SocketAddr, version: IpVersion) -> bool {
    match version {
        IpVersion::Any => true,
        IpVersion::V4Only => addr.is_ipv4(),
        IpVersion::V6Only => addr.is_ipv6(),
    }
}

/// Apply the full socket-option surface a `ConnectOptions` can carry:
/// disable-nagle, send/receive buffer sizes, linger, and send/receive
/// timeouts. Applied once at construction; not renegotiated later.
fn apply_connect_options(stream: &TcpStream, opts: &ConnectOptions) -> Result<(), Error> {
    let fd = borrow(stream);
    if opts.disable_nagle {
        setsockopt(&fd, sockopt::TcpNoDelay, &true)?;
    }
    if let Some(n) = opts.send_buffer {
        setsockopt(&fd, sockopt::SndBuf, &n)?;
    }
    if let Some(n) = opts.receive_buffer {
        setsockopt(&fd, sockopt::RcvBuf, &n)?;
    }
    if let Some(linger) = opts.linger {
        let linger = match linger {
            Linger::Off => LingerOption { linger_on: false, linger_time: 0 },
            Linger::On(d) => LingerOption { linger_on: true, linger_time: d.as_secs() as i64 },
        };
        setsockopt(&fd, sockopt::Linger, &linger)?;
    }
    if let Some(timeout) = opts.send_timeout {
        setsockopt(&fd, sockopt::SndTimeo, &TimeVal::from(timeout))?;
    }
    if let Some(timeout) = opts.receive_timeout {
        setsockopt(&fd, sockopt::RcvTimeo, &TimeVal::from(timeout))?;
    }
    Ok(())
}

/// Bind a listener to the first resolved address that accepts
/// `SO_REUSEADDR`.
pub fn listen(
    address: Option<&str>,
    port: u16,
    backlog: i32,
    ip_version: IpVersion,
) -> Result<std::sync::Arc<Connection>, Error> {
    let host = address.unwrap_or("0.0.0.0");
    let candidates = (host, port)
        .to_socket_addrs()
        .map_err(Error::Resolve)?
        .filter(|a| matches_version(a, ip_version))
        .collect::<Vec<_>>();
    if candidates.is_empty() {
        return Err(Error::Resolve(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no address resolved for the requested IP version",
        )));
    }

    let mut last_err = None;
    for addr in candidates {
        match bind_one(addr, backlog) {
            Ok(listener) => {
                let local_addr = listener.local_addr().map_err(Error::Bind)?;
                let conn = Connection::new(
                    None,
                    Some(listener),
                    local_addr,
                    None,
                    Role::Listener,
                    true,
                    None,
                    None,
                    Tunables::default(),
                )?;
                log::info!(target: "threadnet::conn", "listening on {local_addr}");
                return Ok(std::sync::Arc::new(conn));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(Error::Bind(std::io::Error::new(std::io::ErrorKind::Other, "bind failed"))))
}

fn bind_one(addr: SocketAddr, backlog: i32) -> Result<TcpListener, Error> {
    use nix::sys::socket::{bind, listen as nix_listen, socket, AddressFamily, Backlog, SockFlag, SockType, SockaddrStorage};

    let family = if addr.is_ipv4() { AddressFamily::Inet } else { AddressFamily::Inet6 };
    let sock = socket(family, SockType::Stream, SockFlag::empty(), None).map_err(Error::from)?;
    setsockopt(&sock, sockopt::ReuseAddr, &true).map_err(Error::from)?;
    let sockaddr = SockaddrStorage::from(addr);
    bind(sock.as_raw_fd(), &sockaddr).map_err(|e| Error::Bind(std::io::Error::from(e)))?;
    let backlog = Backlog::new(backlog).unwrap_or(Backlog::new(128).unwrap());
    nix_listen(&sock, backlog).map_err(|e| Error::Listen(std::io::Error::from(e)))?;
    Ok(TcpListener::from(sock))
}

/// Try each resolved address in order; return the first that completes
/// `connect()`, closing the rest.
pub fn connect(
    host: &str,
    port: u16,
    ip_version: IpVersion,
    options: ConnectOptions,
) -> Result<std::sync::Arc<Connection>, Error> {
    let candidates = (host, port)
        .to_socket_addrs()
        .map_err(Error::Resolve)?
        .filter(|a| matches_version(a, ip_version))
        .collect::<Vec<_>>();
    if candidates.is_empty() {
        return Err(Error::Resolve(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no address resolved for the requested IP version",
        )));
    }

    let mut last_err = None;
    for addr in candidates {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                apply_connect_options(&stream, &options)?;
                let local_addr = stream.local_addr().map_err(Error::Connect)?;
                let remote_addr = stream.peer_addr().map_err(Error::Connect)?;
                let conn = Connection::new(
                    Some(stream),
                    None,
                    local_addr,
                    Some(remote_addr),
                    Role::Client,
                    true,
                    options.send_queue_limit,
                    options.receive_queue_limit,
                    Tunables::default(),
                )?;
                log::info!(target: "threadnet::conn", "connected to {remote_addr}");
                return Ok(std::sync::Arc::new(conn));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(Error::Connect(last_err.unwrap()))
}

/// Accept one inbound connection from `listener`. The returned connection
/// is always blocking, regardless of `mode`.
pub fn accept(
    listener: &Connection,
    options: ConnectOptions,
    mode: AcceptMode,
) -> Result<Option<std::sync::Arc<Connection>>, Error> {
    let tcp_listener = listener
        .listener
        .as_ref()
        .ok_or(Error::InvalidArgument("accept requires a listener-role connection"))?;

    // `mode` fully determines the behavior of this one call; the listener's
    // own blocking flag is flipped internally as needed rather than being a
    // piece of shared state callers must remember to set before calling.
    match mode {
        AcceptMode::Blocking => {
            tcp_listener.set_nonblocking(false).map_err(Error::Accept)?;
        }
        AcceptMode::NonBlockingPoll => {
            tcp_listener.set_nonblocking(true).map_err(Error::Accept)?;
        }
        AcceptMode::Timeout(timeout) => {
            if !wait_readable(tcp_listener, timeout)? {
                return Ok(None);
            }
            tcp_listener.set_nonblocking(false).map_err(Error::Accept)?;
        }
    }

    match tcp_listener.accept() {
        Ok((stream, remote_addr)) => {
            stream.set_nonblocking(false).map_err(Error::Accept)?;
            apply_connect_options(&stream, &options)?;
            let local_addr = stream.local_addr().map_err(Error::Accept)?;
            let conn = Connection::new(
                Some(stream),
                None,
                local_addr,
                Some(remote_addr),
                Role::ServerAccepted,
                true,
                options.send_queue_limit,
                options.receive_queue_limit,
                Tunables::default(),
            )?;
            log::debug!(target: "threadnet::conn", "accepted {remote_addr}");
            Ok(Some(std::sync::Arc::new(conn)))
        }
        Err(e) if matches!(mode, AcceptMode::NonBlockingPoll) && would_block(&e) => Ok(None),
        Err(e) => Err(Error::Accept(e)),
    }
}

fn would_block(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
}

fn wait_readable(listener: &TcpListener, timeout: Duration) -> Result<bool, Error> {
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    let fd = borrow(listener);
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    let ready = poll(&mut fds, PollTimeout::try_from(ms).unwrap_or(PollTimeout::MAX)).map_err(Error::from)?;
    Ok(ready > 0)
}

/// Read-until-EOF, discarding bytes, as the last step of a graceful close:
/// shutdown-write, then drain whatever the peer still had in flight, then
/// close.
pub fn drain_until_eof(stream: &TcpStream) {
    let mut sink = [0u8; 4096];
    let mut stream = stream;
    loop {
        match Read::read(&mut stream, &mut sink) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}
