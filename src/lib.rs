//! A length-prefixed, duplex, threaded messaging runtime over TCP, with a
//! companion worker-pool scheduler.
//!
//! Five pieces, leaves first: [`buffer`] (an owning byte buffer), [`codec`]
//! (a typed-message encoder/decoder over it, plus [`messages`]'s pre-defined
//! application shapes), [`connection`] (one TCP endpoint with its own sender
//! and receiver thread), [`pool`] (a key→connection map with broadcast), and
//! [`workers`] (a fixed-size worker-thread pool with a bounded overflow
//! queue). [`sem`] is the counting semaphore the last two build on.
//!
//! A typical server: [`connection::socket::listen`] for a listener,
//! [`connection::socket::accept`] in a loop, [`connection::Connection::start_engine`]
//! on each accepted connection, then drive it with
//! [`connection::Connection::try_receive`]/[`connection::Connection::enqueue_send`].
//! See `demos/server.rs` and `demos/client.rs` for a worked example.

pub mod buffer;
pub mod codec;
pub mod connection;
pub mod error;
pub mod messages;
pub mod pool;
pub mod sem;
pub mod workers;

pub use buffer::Buffer;
pub use connection::Connection;
pub use error::Error;
pub use pool::ConnectionPool;
pub use workers::WorkerPool;
