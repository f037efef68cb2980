//! The owning byte-buffer that carries every payload in this crate: send and
//! receive queues hold them, the codec serializes into and out of them, and
//! the wire format embeds them directly as `capacity:u32, written:u32,
//! bytes:written B`.
//!
//! `Vec<u8>` already tracks a capacity and a length and already enforces
//! `len <= capacity`, so `Buffer` is a thin wrapper rather than a hand-rolled
//! allocation — but the `written` field is surfaced explicitly because the
//! wire format transmits it separately from `capacity`, and because the
//! original C library's `N_STR` made the same distinction (an over-allocated
//! buffer that is only partially full).

/// An owning, growable byte buffer with an explicit written length.
///
/// Invariant: `written() <= capacity()`. An empty buffer has
/// `capacity() == 0`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// An empty buffer (`capacity == 0`).
    pub fn empty() -> Buffer {
        Buffer { data: Vec::new() }
    }

    /// A buffer with room for `capacity` bytes but nothing written yet.
    pub fn with_capacity(capacity: usize) -> Buffer {
        Buffer { data: Vec::with_capacity(capacity) }
    }

    /// Take ownership of an existing byte vector as a buffer.
    pub fn from_vec(data: Vec<u8>) -> Buffer {
        Buffer { data }
    }

    /// Copy a byte slice into a new buffer.
    pub fn from_slice(bytes: &[u8]) -> Buffer {
        Buffer { data: bytes.to_vec() }
    }

    /// Number of bytes actually written.
    pub fn written(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes allocated (`written() <= capacity()`).
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Append bytes, growing the buffer as needed.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Consume the buffer, yielding the underlying byte vector.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Build a printable (null-terminated at `written`) `String`, replacing
    /// any invalid UTF-8 — mirrors the original's printable-string use of
    /// `N_STR`, which null-terminates at `written` rather than `capacity`.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl From<&str> for Buffer {
    fn from(s: &str) -> Buffer {
        Buffer::from_slice(s.as_bytes())
    }
}

impl From<String> for Buffer {
    fn from(s: String) -> Buffer {
        Buffer::from_vec(s.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_has_zero_capacity_and_length() {
        let b = Buffer::empty();
        assert_eq!(b.written(), 0);
        assert_eq!(b.capacity(), 0);
        assert!(b.is_empty());
    }

    #[test]
    fn push_bytes_grows_written_not_beyond_capacity_invariant() {
        let mut b = Buffer::with_capacity(4);
        b.push_bytes(b"ab");
        assert_eq!(b.written(), 2);
        assert!(b.written() <= b.capacity());
        b.push_bytes(b"cdef");
        assert_eq!(b.as_bytes(), b"abcdef");
        assert!(b.written() <= b.capacity());
    }

    #[test]
    fn round_trips_through_string() {
        let b: Buffer = "alice".into();
        assert_eq!(b.to_string_lossy(), "alice");
    }
}
