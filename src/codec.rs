//! The typed-message wire codec.
//!
//! A logical message is an ordered tuple split into three independently
//! ordered sub-sequences: signed 32-bit integers, `f64` doubles, and
//! byte-buffers. Producers build one with [`MessageBuilder`], appending to
//! the three sub-sequences in whatever order is convenient; [`encode`] lays
//! them out on the wire counts-first. Consumers get a [`DecodedMessage`]
//! back from [`decode`] and pop each sub-sequence FIFO-independently with
//! [`DecodedMessage::pop_int`] etc.
//!
//! All multi-byte scalars are big-endian on the wire, including doubles:
//! `byteorder`'s `write_f64::<BigEndian>`/`read_f64::<BigEndian>` already do
//! the to-bits-then-byte-reverse dance, which is the one place a systems
//! language needs to be careful, since `htonl`-family helpers only cover
//! 32-bit words.

use std::collections::VecDeque;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::buffer::Buffer;
use crate::error::ProtocolError;

/// Builds a logical message: three append-only sub-sequences, populated in
/// whatever interleaving the caller likes.
#[derive(Clone, Debug, Default)]
pub struct MessageBuilder {
    ints: Vec<i32>,
    doubles: Vec<f64>,
    buffers: Vec<Buffer>,
}

impl MessageBuilder {
    pub fn new() -> MessageBuilder {
        MessageBuilder::default()
    }

    pub fn push_int(&mut self, value: i32) -> &mut Self {
        self.ints.push(value);
        self
    }

    pub fn push_double(&mut self, value: f64) -> &mut Self {
        self.doubles.push(value);
        self
    }

    pub fn push_buffer(&mut self, value: Buffer) -> &mut Self {
        self.buffers.push(value);
        self
    }

    pub fn push_str(&mut self, value: &str) -> &mut Self {
        self.push_buffer(Buffer::from(value))
    }
}

/// A decoded message: three independent FIFOs, consumed in whatever order
/// matches the application-level message shape.
#[derive(Debug)]
pub struct DecodedMessage {
    ints: VecDeque<i32>,
    doubles: VecDeque<f64>,
    buffers: VecDeque<Buffer>,
}

impl DecodedMessage {
    pub fn int_count(&self) -> usize {
        self.ints.len()
    }

    pub fn double_count(&self) -> usize {
        self.doubles.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn pop_int(&mut self) -> Result<i32, ProtocolError> {
        self.ints.pop_front().ok_or(ProtocolError::Underflow)
    }

    pub fn pop_double(&mut self) -> Result<f64, ProtocolError> {
        self.doubles.pop_front().ok_or(ProtocolError::Underflow)
    }

    pub fn pop_buffer(&mut self) -> Result<Buffer, ProtocolError> {
        self.buffers.pop_front().ok_or(ProtocolError::Underflow)
    }
}

/// Encode a logical message into a single wire-ready [`Buffer`]. Pure: does
/// not consume `msg`.
pub fn encode(msg: &MessageBuilder) -> Buffer {
    let mut out = Vec::new();
    out.write_u32::<BigEndian>(msg.ints.len() as u32).unwrap();
    out.write_u32::<BigEndian>(msg.doubles.len() as u32).unwrap();
    out.write_u32::<BigEndian>(msg.buffers.len() as u32).unwrap();
    for &i in &msg.ints {
        out.write_i32::<BigEndian>(i).unwrap();
    }
    for &d in &msg.doubles {
        out.write_f64::<BigEndian>(d).unwrap();
    }
    for buf in &msg.buffers {
        out.write_u32::<BigEndian>(buf.capacity() as u32).unwrap();
        out.write_u32::<BigEndian>(buf.written() as u32).unwrap();
        out.extend_from_slice(buf.as_bytes());
    }
    Buffer::from_vec(out)
}

/// Decode a wire-laid-out payload into independently pop-able FIFOs.
pub fn decode(payload: &Buffer) -> Result<DecodedMessage, ProtocolError> {
    let mut cur = payload.as_bytes();

    let n_int = read_u32(&mut cur)? as usize;
    let n_flt = read_u32(&mut cur)? as usize;
    let n_buf = read_u32(&mut cur)? as usize;

    let mut ints = VecDeque::with_capacity(n_int);
    for _ in 0..n_int {
        ints.push_back(cur.read_i32::<BigEndian>().map_err(|_| ProtocolError::Truncated)?);
    }

    let mut doubles = VecDeque::with_capacity(n_flt);
    for _ in 0..n_flt {
        doubles.push_back(cur.read_f64::<BigEndian>().map_err(|_| ProtocolError::Truncated)?);
    }

    let mut buffers = VecDeque::with_capacity(n_buf);
    for _ in 0..n_buf {
        let _capacity = read_u32(&mut cur)?;
        let written = read_u32(&mut cur)? as usize;
        if written > cur.len() {
            return Err(ProtocolError::CountExceedsPayload);
        }
        let (bytes, rest) = cur.split_at(written);
        buffers.push_back(Buffer::from_slice(bytes));
        cur = rest;
    }

    Ok(DecodedMessage { ints, doubles, buffers })
}

fn read_u32(cur: &mut &[u8]) -> Result<u32, ProtocolError> {
    cur.read_u32::<BigEndian>().map_err(|_| ProtocolError::Truncated)
}

/// Return the first integer of an encoded message without consuming it, by
/// skipping the three count words. Conventionally the message's `type` tag,
/// used to dispatch on receipt.
pub fn peek_first_int(payload: &Buffer) -> Result<i32, ProtocolError> {
    let mut cur = payload.as_bytes();
    let n_int = read_u32(&mut cur)?;
    let _n_flt = read_u32(&mut cur)?;
    let _n_buf = read_u32(&mut cur)?;
    if n_int == 0 {
        return Err(ProtocolError::Underflow);
    }
    cur.read_i32::<BigEndian>().map_err(|_| ProtocolError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_interleaved_fields_in_push_order() {
        let mut m = MessageBuilder::new();
        m.push_int(1).push_str("alice").push_double(2.5).push_int(2).push_str("secret");
        let wire = encode(&m);
        let mut d = decode(&wire).unwrap();
        assert_eq!(d.int_count(), 2);
        assert_eq!(d.double_count(), 1);
        assert_eq!(d.buffer_count(), 2);
        assert_eq!(d.pop_int().unwrap(), 1);
        assert_eq!(d.pop_int().unwrap(), 2);
        assert_eq!(d.pop_double().unwrap(), 2.5);
        assert_eq!(d.pop_buffer().unwrap().to_string_lossy(), "alice");
        assert_eq!(d.pop_buffer().unwrap().to_string_lossy(), "secret");
    }

    #[test]
    fn popping_past_the_end_of_a_sub_sequence_underflows() {
        let m = MessageBuilder::new();
        let wire = encode(&m);
        let mut d = decode(&wire).unwrap();
        assert!(matches!(d.pop_int(), Err(ProtocolError::Underflow)));
        assert!(matches!(d.pop_double(), Err(ProtocolError::Underflow)));
        assert!(matches!(d.pop_buffer(), Err(ProtocolError::Underflow)));
    }

    #[test]
    fn peek_first_int_does_not_consume() {
        let mut m = MessageBuilder::new();
        m.push_int(42).push_int(7);
        let wire = encode(&m);
        assert_eq!(peek_first_int(&wire).unwrap(), 42);
        let mut d = decode(&wire).unwrap();
        assert_eq!(d.pop_int().unwrap(), 42);
        assert_eq!(d.pop_int().unwrap(), 7);
    }

    #[test]
    fn doubles_are_bit_exact_across_extreme_values() {
        let mut m = MessageBuilder::new();
        let values = [1.0, -2.5, 3.14159265358979, 0.0, 1e-300, 1e300, -0.0, f64::NAN];
        for &v in &values {
            m.push_double(v);
        }
        let wire = encode(&m);
        let mut d = decode(&wire).unwrap();
        for &v in &values {
            let got = d.pop_double().unwrap();
            if v.is_nan() {
                assert!(got.is_nan());
            } else {
                assert_eq!(got.to_bits(), v.to_bits());
            }
        }
    }

    #[test]
    fn truncated_payload_is_a_protocol_error_not_a_panic() {
        let bad = Buffer::from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]); // n_int=1, no data follows
        assert!(matches!(decode(&bad), Err(ProtocolError::Truncated)));
    }

    #[test]
    fn buffer_count_header_exceeding_payload_is_rejected() {
        // n_int=0, n_flt=0, n_buf=1, capacity=10, written=10, but no bytes follow
        let bad = Buffer::from_slice(&[
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 10, 0, 0, 0, 10,
        ]);
        assert!(matches!(decode(&bad), Err(ProtocolError::CountExceedsPayload)));
    }
}
