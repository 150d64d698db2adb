//! Sliding byte buffer over the input stream
//!
//! The window retains the raw bytes of the input stream between the oldest
//! position a splitter may still request and the newest position fed by the
//! reader. Splitters cut chunk payloads out of it by absolute byte range and
//! release the prefix once a chunk has been emitted, keeping peak memory
//! bounded by the largest chunk plus the reader's lookahead.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{GeoRocketError, Result};

/// A sliding byte buffer addressed by absolute stream offsets
#[derive(Debug, Default)]
pub struct Window {
    buf: BytesMut,
    /// Absolute offset of the first retained byte
    released: u64,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the input stream
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Absolute offset of the first byte that can still be requested
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Absolute offset one past the last byte fed so far
    pub fn fed(&self) -> u64 {
        self.released + self.buf.len() as u64
    }

    /// Copy out the bytes in the absolute range `[start, end)`
    ///
    /// Fails with [`GeoRocketError::WindowRange`] if part of the range has
    /// already been released or has not been fed yet.
    pub fn substring(&self, start: u64, end: u64) -> Result<Bytes> {
        if start < self.released || end > self.fed() || start > end {
            return Err(GeoRocketError::WindowRange { start, end });
        }
        let lo = (start - self.released) as usize;
        let hi = (end - self.released) as usize;
        Ok(Bytes::copy_from_slice(&self.buf[lo..hi]))
    }

    /// Declare that no substring starting before `pos` will be requested
    ///
    /// Bytes before `pos` may be dropped. Advancing backwards is a no-op.
    pub fn advance_to(&mut self, pos: u64) {
        if pos <= self.released {
            return;
        }
        let n = ((pos - self.released) as usize).min(self.buf.len());
        self.buf.advance(n);
        self.released += n as u64;
    }
}
