//! A reusable, heap-backed read buffer.
//!
//! Replaces the teacher's unsafe raw-pointer ring buffer (`examples/ryanseipp-rask-old/src/first/buffer.rs`)
//! with a plain `Vec<u8>`: a `Connection` only ever needs to hold the most recent read's worth of
//! bytes long enough to hand them to the parser, so there is no need for the teacher's
//! unsafe growable-ring design here. Default capacity is 1024 bytes per spec §3.

use std::io::{self, Read};

/// Holds the bytes from the most recent `fill_from` call.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    filled: usize,
}

impl Buffer {
    /// Creates a buffer with at least `capacity` bytes of backing storage.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            filled: 0,
        }
    }

    /// The backing storage size.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Reads once from `source` into the backing storage, recording how much was filled.
    /// Returns `Ok(0)` on EOF, same as `Read::read`.
    pub fn fill_from(&mut self, source: &mut impl Read) -> io::Result<usize> {
        let n = source.read(&mut self.data)?;
        self.filled = n;
        Ok(n)
    }

    /// Copies out the bytes filled by the last `fill_from` call.
    pub fn take_filled(&self) -> Vec<u8> {
        self.data[..self.filled].to_vec()
    }

    /// The bytes filled by the last `fill_from` call, borrowed.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }
}
