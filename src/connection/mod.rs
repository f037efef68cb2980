//! One TCP endpoint with its send queue, receive queue, sender thread,
//! receiver thread, and state machine.
//!
//! A `Connection` is constructed by [`socket::listen`] (listener role),
//! [`socket::connect`] (client role), or [`socket::accept`] (server-accepted
//! role), then optionally handed to [`start_engine`] to spawn its background
//! sender/receiver threads. Applications drive it with
//! [`Connection::enqueue_send`] / [`Connection::try_receive`] /
//! [`Connection::wait_receive`].

pub mod engine;
pub mod queue;
pub mod socket;

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::buffer::Buffer;
use crate::error::Error;
use crate::sem::Semaphore;

use queue::BoundedQueue;

/// Which address families `listen`/`connect` may resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpVersion {
    V4Only,
    V6Only,
    Any,
}

/// How [`socket::accept`] should behave when nothing is pending.
#[derive(Clone, Copy, Debug)]
pub enum AcceptMode {
    /// Block until a connection arrives.
    Blocking,
    /// Return `Ok(None)` immediately if nothing is pending.
    NonBlockingPoll,
    /// Use `select`-with-timeout semantics; give up after the duration.
    Timeout(Duration),
}

/// The role a `Connection` was constructed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    ServerAccepted,
    Listener,
}

/// Connection-lifetime state. Transitions are monotonic within a run:
/// `Run` and `Pause` toggle freely, then `ExitAsked` leads to `Exited`;
/// `Error` is absorbing and nothing transitions out of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ConnState {
    Run = 0,
    Pause = 1,
    ExitAsked = 2,
    Exited = 3,
    Error = 4,
}

impl ConnState {
    fn from_wire(word: u32) -> Option<ConnState> {
        match word {
            0 => Some(ConnState::Run),
            1 => Some(ConnState::Pause),
            2 => Some(ConnState::ExitAsked),
            3 => Some(ConnState::Exited),
            4 => Some(ConnState::Error),
            _ => None,
        }
    }
}

/// Whether the sender/receiver threads have been started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Started,
}

/// `SO_LINGER`: `Off` disables lingering on close, `On(d)` enables it for
/// `d` (truncated to whole seconds).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linger {
    Off,
    On(Duration),
}

/// Options accepted by [`socket::connect`].
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub disable_nagle: bool,
    pub send_buffer: Option<usize>,
    pub receive_buffer: Option<usize>,
    /// `<= 0` (i.e. `None` here) means unbounded.
    pub send_queue_limit: Option<usize>,
    pub receive_queue_limit: Option<usize>,
    /// `None` leaves `SO_LINGER` at its OS default.
    pub linger: Option<Linger>,
    /// `SO_SNDTIMEO`. `None` leaves it at its OS default (no timeout).
    pub send_timeout: Option<Duration>,
    /// `SO_RCVTIMEO`. `None` leaves it at its OS default (no timeout).
    pub receive_timeout: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> ConnectOptions {
        ConnectOptions {
            disable_nagle: true,
            send_buffer: None,
            receive_buffer: None,
            send_queue_limit: None,
            receive_queue_limit: None,
            linger: None,
            send_timeout: None,
            receive_timeout: None,
        }
    }
}

/// Timers tunable per the original's `netw_set_timers`: how eagerly the
/// sender polls its queue and how long the receiver naps while paused.
#[derive(Clone, Copy, Debug)]
pub struct Tunables {
    /// How long the sender sleeps between semaphore posts while the queue is empty.
    pub send_queue_idle_poll: Duration,
    /// Pacing sleep after each successfully sent frame.
    pub send_queue_consecutive_wait: Duration,
    /// How long the receiver naps while `PAUSE`d before re-checking state.
    pub pause_wait: Duration,
}

impl Default for Tunables {
    fn default() -> Tunables {
        Tunables {
            send_queue_idle_poll: Duration::from_millis(20),
            send_queue_consecutive_wait: Duration::from_micros(200),
            pause_wait: Duration::from_millis(20),
        }
    }
}

struct EngineThreads {
    sender: JoinHandle<()>,
    receiver: JoinHandle<()>,
}

/// A weak back-reference to a pool this connection has joined, so closing
/// it can symmetrically remove itself from every pool without the pool and
/// the connection holding strong references to each other.
pub(crate) trait PoolMembership: Send + Sync {
    fn forget_member(&self, key: &str);
}

pub(crate) struct Membership {
    pub(crate) key: String,
    pub(crate) pool: Weak<dyn PoolMembership>,
}

/// One TCP endpoint and its full engine state.
pub struct Connection {
    stream: Option<TcpStream>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    remote_addr: Option<SocketAddr>,
    role: Role,
    blocking: bool,
    state: Mutex<ConnState>,
    engine_state: Mutex<EngineState>,
    send_queue: BoundedQueue,
    recv_queue: BoundedQueue,
    send_sem: Semaphore,
    tunables: Mutex<Tunables>,
    threads: Mutex<Option<EngineThreads>>,
    memberships: Mutex<Vec<Membership>>,
}

impl Connection {
    pub(crate) fn new(
        stream: Option<TcpStream>,
        listener: Option<TcpListener>,
        local_addr: SocketAddr,
        remote_addr: Option<SocketAddr>,
        role: Role,
        blocking: bool,
        send_limit: Option<usize>,
        recv_limit: Option<usize>,
        tunables: Tunables,
    ) -> Result<Connection, Error> {
        Ok(Connection {
            stream,
            listener,
            local_addr,
            remote_addr,
            role,
            blocking,
            state: Mutex::new(ConnState::Run),
            engine_state: Mutex::new(EngineState::Stopped),
            send_queue: BoundedQueue::new(send_limit),
            recv_queue: BoundedQueue::new(recv_limit),
            send_sem: Semaphore::new(0)?,
            tunables: Mutex::new(tunables),
            threads: Mutex::new(None),
            memberships: Mutex::new(Vec::new()),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// A stable string key identifying this socket, suitable as a
    /// [`crate::pool::ConnectionPool`] map key.
    pub fn id(&self) -> String {
        match &self.stream {
            Some(s) => s.as_raw_fd().to_string(),
            None => self
                .listener
                .as_ref()
                .map(|l| l.as_raw_fd().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn state(&self) -> ConnState {
        *self.state.lock().expect("state mutex poisoned")
    }

    pub fn engine_state(&self) -> EngineState {
        *self.engine_state.lock().expect("engine state mutex poisoned")
    }

    pub fn tunables(&self) -> Tunables {
        *self.tunables.lock().expect("tunables mutex poisoned")
    }

    pub fn set_timers(&self, tunables: Tunables) {
        *self.tunables.lock().expect("tunables mutex poisoned") = tunables;
    }

    /// Request a state transition (`Run` / `Pause` / `ExitAsked`). Always
    /// posts the sender's semaphore so a paused or exit-asked sender
    /// observes the change promptly.
    pub fn set_state(&self, new_state: ConnState) {
        {
            let mut s = self.state.lock().expect("state mutex poisoned");
            // ERROR is absorbing; nothing can transition out of it.
            if *s != ConnState::Error {
                *s = new_state;
            }
        }
        self.send_sem.post();
    }

    fn set_error(&self) {
        *self.state.lock().expect("state mutex poisoned") = ConnState::Error;
        self.send_sem.post();
    }

    /// Move `buf` onto the send queue and wake the sender. Fails with
    /// [`Error::QueueFull`] if a limit is set and exceeded, or
    /// [`Error::InvalidArgument`] if `buf` is empty.
    pub fn enqueue_send(&self, buf: Buffer) -> Result<(), Error> {
        if buf.is_empty() {
            return Err(Error::InvalidArgument("send payload must not be empty"));
        }
        self.send_queue.push(buf)?;
        self.send_sem.post();
        Ok(())
    }

    /// The oldest received buffer, or `None` if the receive queue is empty.
    /// Never blocks.
    pub fn try_receive(&self) -> Option<Buffer> {
        self.recv_queue.pop()
    }

    /// Poll [`Connection::try_receive`] at `poll_interval` until it succeeds,
    /// the connection leaves `RUN`, or `timeout` elapses (`timeout <= 0`
    /// disables the deadline).
    pub fn wait_receive(&self, poll_interval: Duration, timeout: Duration) -> Option<Buffer> {
        let deadline = if timeout.is_zero() { None } else { Some(std::time::Instant::now() + timeout) };
        loop {
            if let Some(buf) = self.try_receive() {
                return Some(buf);
            }
            if self.state() != ConnState::Run {
                return None;
            }
            if let Some(deadline) = deadline {
                if std::time::Instant::now() >= deadline {
                    return None;
                }
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Push a buffer the receiver thread just read onto the receive queue.
    /// Only the receiver thread ever calls this.
    pub(crate) fn push_received(&self, buf: Buffer) -> Result<(), Error> {
        self.recv_queue.push(buf)
    }

    /// `(send-pending, receive-pending)`.
    pub fn queue_depths(&self) -> (usize, usize) {
        (self.send_queue.len(), self.recv_queue.len())
    }

    /// Empty the send queue without sending its contents.
    pub fn clear_send_queue(&self) {
        self.send_queue.clear();
    }

    /// Empty the receive queue without surfacing its contents.
    pub fn clear_recv_queue(&self) {
        self.recv_queue.clear();
    }

    pub(crate) fn record_membership(&self, key: String, pool: Weak<dyn PoolMembership>) {
        self.memberships.lock().expect("memberships mutex poisoned").push(Membership { key, pool });
    }

    pub(crate) fn forget_membership(&self, key: &str) {
        self.memberships.lock().expect("memberships mutex poisoned").retain(|m| m.key != key);
    }

    /// Remove this connection from every pool it has joined (called by
    /// `close`/`wait_close`, and by a pool's own `remove`).
    fn leave_all_pools(&self) {
        let members = std::mem::take(&mut *self.memberships.lock().expect("memberships mutex poisoned"));
        for m in members {
            if let Some(pool) = m.pool.upgrade() {
                pool.forget_member(&m.key);
            }
        }
    }

    /// Spawn the sender and receiver threads. A second call fails with
    /// [`Error::AlreadyStarted`]: engine start is once per connection
    /// lifetime.
    pub fn start_engine(self: &Arc<Connection>) -> Result<(), Error> {
        let mut engine_state = self.engine_state.lock().expect("engine state mutex poisoned");
        if *engine_state == EngineState::Started {
            return Err(Error::AlreadyStarted);
        }
        let stream = self
            .stream
            .as_ref()
            .ok_or(Error::InvalidArgument("listener connections have no engine"))?
            .try_clone()
            .map_err(|e| Error::Transport(crate::error::classify_io_error(e)))?;
        let sender_stream = stream.try_clone().map_err(|e| Error::Transport(crate::error::classify_io_error(e)))?;

        let conn_for_sender = self.clone();
        let conn_for_receiver = self.clone();
        let sender = std::thread::Builder::new()
            .name("threadnet-sender".into())
            .spawn(move || engine::sender_loop(conn_for_sender, sender_stream))
            .expect("failed to spawn sender thread");
        let receiver = std::thread::Builder::new()
            .name("threadnet-receiver".into())
            .spawn(move || engine::receiver_loop(conn_for_receiver, stream))
            .expect("failed to spawn receiver thread");

        *self.threads.lock().expect("threads mutex poisoned") = Some(EngineThreads { sender, receiver });
        *engine_state = EngineState::Started;
        log::info!(target: "threadnet::conn", "engine started for {}", self.id());
        Ok(())
    }

    /// Ask the engine to exit and join both threads.
    pub fn stop_engine(&self) -> Result<(), Error> {
        if self.engine_state() != EngineState::Started {
            return Err(Error::NotStarted);
        }
        self.set_state(ConnState::ExitAsked);
        let threads = self.threads.lock().expect("threads mutex poisoned").take();
        if let Some(EngineThreads { sender, receiver }) = threads {
            let _ = sender.join();
            let _ = receiver.join();
        }
        *self.engine_state.lock().expect("engine state mutex poisoned") = EngineState::Stopped;
        log::info!(target: "threadnet::conn", "engine stopped for {}", self.id());
        Ok(())
    }

    /// Close the socket immediately: leave every pool, shut the socket down
    /// in both directions, and return. No graceful handshake and no waiting
    /// for the peer — if the engine is still running its threads are left to
    /// notice the closed socket on their own and exit asynchronously; they
    /// are not joined here. A no-op if already closed. Use [`Connection::wait_close`]
    /// for the version that waits.
    pub fn close(&self) {
        self.leave_all_pools();
        if let Some(stream) = &self.stream {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    /// Stop the engine (if running), then drain gracefully: shutdown-write,
    /// read until the peer reaches EOF, and close. Safe to call on an
    /// already-closed connection.
    pub fn wait_close(self: &Arc<Connection>) {
        if self.engine_state() == EngineState::Started {
            let _ = self.stop_engine();
        }
        if let Some(stream) = &self.stream {
            let _ = stream.shutdown(std::net::Shutdown::Write);
            socket::drain_until_eof(stream);
        }
        self.close();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.leave_all_pools();
    }
}

pub(crate) fn state_to_wire(state: ConnState) -> u32 {
    state as u32
}

pub(crate) fn state_from_wire(word: u32) -> Option<ConnState> {
    ConnState::from_wire(word)
}
