//! In-memory buffer implementations
//!
//! Same trait surface as the ring buffers but backed by a `Vec<u8>`;
//! nothing ever suspends. Used by the codec tests and for encoding a
//! frame off-line. End of input reads as a peer close.

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{NetError, NetResult};

/// Read side over an owned byte slice.
pub struct MemReadBuffer {
    data: Vec<u8>,
    read: u64,
    commit: u64,
}

impl MemReadBuffer {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            read: 0,
            commit: 0,
        }
    }

    /// Bytes left between the position and the end.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read as usize
    }
}

impl ReadBuffer for MemReadBuffer {
    fn pos(&self) -> u64 {
        self.read
    }

    fn get_char(&mut self) -> NetResult<u8> {
        match self.data.get(self.read as usize) {
            Some(&b) => {
                self.read += 1;
                Ok(b)
            }
            None => Err(NetError::PeerClosed),
        }
    }

    fn peek_char(&mut self) -> NetResult<u8> {
        self.data
            .get(self.read as usize)
            .copied()
            .ok_or(NetError::PeerClosed)
    }

    fn forward(&mut self, n: usize) -> NetResult<()> {
        if self.remaining() < n {
            return Err(NetError::PeerClosed);
        }
        self.read += n as u64;
        Ok(())
    }

    fn backward(&mut self, n: usize) {
        assert!(
            self.read - self.commit >= n as u64,
            "rewind across the commit point"
        );
        self.read -= n as u64;
    }

    fn peek_string(&mut self, n: usize) -> NetResult<String> {
        if self.remaining() < n {
            return Err(NetError::PeerClosed);
        }
        let start = self.read as usize;
        Ok(String::from_utf8_lossy(&self.data[start..start + n]).into_owned())
    }

    fn commit(&mut self) {
        self.commit = self.read;
    }
}

/// Write side into an owned, growable byte vector.
#[derive(Default)]
pub struct MemWriteBuffer {
    data: Vec<u8>,
    commit: u64,
}

impl MemWriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.data).expect("buffer holds valid utf-8")
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl WriteBuffer for MemWriteBuffer {
    fn append(&mut self, bytes: &[u8]) -> NetResult<()> {
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn append_byte(&mut self, b: u8) -> NetResult<()> {
        self.data.push(b);
        Ok(())
    }

    fn backward(&mut self, n: usize) {
        assert!(
            self.data.len() as u64 - self.commit >= n as u64,
            "rewind across the commit point"
        );
        self.data.truncate(self.data.len() - n);
    }

    fn commit(&mut self) -> NetResult<()> {
        self.commit = self.data.len() as u64;
        Ok(())
    }
}
