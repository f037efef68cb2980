//! The sender and receiver threads that make up a connection's "engine".
//! Exactly one of each is spawned per connection by
//! [`super::Connection::start_engine`].

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::buffer::Buffer;
use crate::error::{classify_io_error, TransportError};

use super::{state_from_wire, state_to_wire, ConnState, Connection};

/// Write one full frame: state word + payload length + payload bytes,
/// retrying partial writes via `write_all`.
fn send_frame(stream: &mut TcpStream, state: ConnState, payload: &Buffer) -> Result<(), TransportError> {
    let mut wire = Vec::with_capacity(8 + payload.written());
    wire.write_u32::<BigEndian>(state_to_wire(state)).unwrap();
    wire.write_u32::<BigEndian>(payload.written() as u32).unwrap();
    wire.extend_from_slice(payload.as_bytes());
    stream.write_all(&wire).map_err(classify_io_error)
}

/// Write the bare shutdown-sentinel frame: the `EXIT_ASKED` state word with
/// no trailing length field.
fn send_shutdown_sentinel(stream: &mut TcpStream) -> Result<(), TransportError> {
    let mut wire = [0u8; 4];
    (&mut wire[..]).write_u32::<BigEndian>(state_to_wire(ConnState::ExitAsked)).unwrap();
    stream.write_all(&wire).map_err(classify_io_error)
}

/// Sender thread body: waits for queued sends, frames and writes each one.
pub(super) fn sender_loop(conn: Arc<Connection>, mut stream: TcpStream) {
    loop {
        // Block on the wake semaphore, but never longer than the idle-poll
        // tunable, so a state change that raced the semaphore post is still
        // noticed promptly.
        conn.send_sem.wait_timeout(conn.tunables().send_queue_idle_poll);

        match conn.state() {
            ConnState::Error | ConnState::Exited => {
                log::debug!(target: "threadnet::engine", "sender exiting on state {:?}", conn.state());
                return;
            }
            ConnState::ExitAsked => {
                if send_shutdown_sentinel(&mut stream).is_err() {
                    conn.set_error();
                }
                log::info!(target: "threadnet::engine", "sender sent shutdown sentinel");
                return;
            }
            ConnState::Pause => continue,
            ConnState::Run => {
                if let Some(buf) = conn.send_queue.pop() {
                    if let Err(e) = send_frame(&mut stream, ConnState::Run, &buf) {
                        log::warn!(target: "threadnet::engine", "send failed: {e}");
                        conn.set_error();
                        return;
                    }
                    std::thread::sleep(conn.tunables().send_queue_consecutive_wait);
                }
            }
        }
    }
}

/// Receiver thread body: reads frames off the wire and pushes them onto the
/// receive queue.
pub(super) fn receiver_loop(conn: Arc<Connection>, mut stream: TcpStream) {
    loop {
        match conn.state() {
            ConnState::ExitAsked | ConnState::Exited => {
                log::debug!(target: "threadnet::engine", "receiver exiting on state {:?}", conn.state());
                return;
            }
            ConnState::Error => return,
            ConnState::Pause => {
                std::thread::sleep(conn.tunables().pause_wait);
                continue;
            }
            ConnState::Run => {}
        }

        let mut state_word = [0u8; 4];
        if let Err(e) = stream.read_exact(&mut state_word) {
            // A clean peer shutdown looks like EOF right at the frame
            // boundary; that is a short read from our point of view only if
            // we expected more frames. Either way the connection is done.
            log::debug!(target: "threadnet::engine", "receiver read failed: {e}");
            conn.set_error();
            return;
        }
        let word = (&state_word[..]).read_u32::<BigEndian>().unwrap();
        if state_from_wire(word) == Some(ConnState::ExitAsked) {
            conn.set_state(ConnState::ExitAsked);
            log::info!(target: "threadnet::engine", "receiver observed shutdown sentinel");
            return;
        }

        let mut len_word = [0u8; 4];
        if let Err(e) = stream.read_exact(&mut len_word) {
            log::warn!(target: "threadnet::engine", "short read of payload length: {e}");
            conn.set_error();
            return;
        }
        let n = (&len_word[..]).read_u32::<BigEndian>().unwrap() as usize;

        let mut payload = vec![0u8; n];
        if n > 0 {
            if let Err(e) = Read::read_exact(&mut stream, &mut payload) {
                log::warn!(target: "threadnet::engine", "short read of payload body: {e}");
                conn.set_error();
                return;
            }
        }
        if let Err(e) = conn.push_received(Buffer::from_vec(payload)) {
            log::warn!(target: "threadnet::engine", "receive queue rejected frame: {e}");
            conn.set_error();
            return;
        }
    }
}
