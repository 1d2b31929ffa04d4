//! The per-connection framed read buffer.
//!
//! Represented as `{data, filled_len, consumed_len}` rather than the
//! original implementation's raw start/end pointers into a malloc'd
//! block: `data[consumed_len..filled_len]` is the unread region, and a
//! `read_into` call that finds no room left compacts that region down to
//! offset 0 before issuing its underlying read.

use std::io;

use crate::consts::READ_BUF_SIZE;
use crate::protocol::{self, Decoded, Msg};

pub struct Buf {
    data: [u8; READ_BUF_SIZE],
    filled_len: usize,
    consumed_len: usize,
}

impl Buf {
    pub fn new() -> Buf {
        Buf { data: [0; READ_BUF_SIZE], filled_len: 0, consumed_len: 0 }
    }

    /// The unread bytes currently held: `decode_next` scans this slice.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.consumed_len..self.filled_len]
    }

    /// Marks the first `n` unread bytes as consumed. Panics if `n`
    /// exceeds the unread length, since that would indicate a caller bug
    /// rather than a malformed stream.
    pub fn consume(&mut self, n: usize) {
        assert!(self.consumed_len + n <= self.filled_len, "consume past filled_len");
        self.consumed_len += n;
        if self.consumed_len == self.filled_len {
            self.consumed_len = 0;
            self.filled_len = 0;
        }
    }

    fn compact(&mut self) {
        if self.consumed_len == 0 {
            return;
        }
        // Move exactly the unread region, not one byte past it: the
        // original C's `end - start + 1` copied one byte too many here.
        let unread_len = self.filled_len - self.consumed_len;
        self.data.copy_within(self.consumed_len..self.filled_len, 0);
        for b in &mut self.data[unread_len..self.filled_len] {
            *b = 0;
        }
        self.filled_len = unread_len;
        self.consumed_len = 0;
    }

    /// Reads more bytes into the free tail of the buffer via `reader`,
    /// which is handed the writable slice and returns how many bytes it
    /// filled. Compacts first if the unread region isn't already at
    /// offset 0. Returns `Ok(0)` (never an error) if the buffer is full
    /// of unconsumed data with nowhere left to read into.
    pub fn read_into<F>(&mut self, reader: F) -> io::Result<usize>
    where
        F: FnOnce(&mut [u8]) -> io::Result<usize>,
    {
        self.compact();
        if self.filled_len == self.data.len() {
            return Ok(0);
        }
        let n = reader(&mut self.data[self.filled_len..])?;
        self.filled_len += n;
        Ok(n)
    }

    /// Decodes every complete frame currently available, appending each
    /// to `sink` in order, regardless of how the underlying reads were
    /// chunked.
    pub fn decode_all(&mut self, sink: &mut Vec<Msg>) {
        loop {
            match protocol::decode_next(self) {
                Decoded::Msg(m) => sink.push(m),
                Decoded::Partial => break,
            }
        }
    }

    /// Whether the buffer has no room left for a fresh read and still has
    /// no decodable frame in it: the session handler treats this as an
    /// oversized-message protocol fault rather than waiting forever.
    pub fn is_saturated(&self) -> bool {
        self.filled_len == self.data.len() && self.consumed_len == 0
    }
}

impl Default for Buf {
    fn default() -> Buf {
        Buf::new()
    }
}
