//! Streaming buffer abstractions
//!
//! A `ReadBuffer` is a byte source with an uncommitted read position:
//! peeks and bounded rewinds move within the span since the last
//! commit, and committing makes everything before the position
//! unreachable. `WriteBuffer` is the mirror image for sinks; its
//! `backward` exists so encoders can erase a trailing separator.

use crate::error::NetResult;

/// Streaming byte source with position, peek, rewind and commit.
pub trait ReadBuffer {
    /// Current uncommitted read position (absolute, monotonic).
    fn pos(&self) -> u64;

    /// Next byte, advancing the position.
    fn get_char(&mut self) -> NetResult<u8>;

    /// Next byte without advancing.
    fn peek_char(&mut self) -> NetResult<u8>;

    /// Advance the position by `n` bytes.
    fn forward(&mut self, n: usize) -> NetResult<()>;

    /// Rewind the position by `n` bytes.
    ///
    /// Panics if the rewind would cross the commit point; that is an
    /// invariant violation, not a recoverable condition.
    fn backward(&mut self, n: usize);

    /// The next `n` bytes as a string, without advancing.
    fn peek_string(&mut self, n: usize) -> NetResult<String>;

    /// Discard everything before the current position; later rewinds
    /// stop here.
    fn commit(&mut self);

    /// Next byte that is not whitespace (space, tab, newline, carriage
    /// return), advancing past it.
    fn get_char_f(&mut self) -> NetResult<u8> {
        loop {
            let c = self.get_char()?;
            if !matches!(c, b' ' | b'\t' | b'\n' | b'\r') {
                return Ok(c);
            }
        }
    }

    /// Next non-whitespace byte, with the position left just before it
    /// (the whitespace itself is consumed).
    fn peek_char_f(&mut self) -> NetResult<u8> {
        let c = self.get_char_f()?;
        self.backward(1);
        Ok(c)
    }

    /// Collect bytes into `out` until one of `terminators` appears.
    /// The terminator is not consumed: the next `get_char` returns it.
    ///
    /// Transactional: if the source fails mid-scan, the read position
    /// is restored to its value on entry and the error is returned
    /// unchanged.
    fn read_until(&mut self, terminators: &[u8], out: &mut Vec<u8>) -> NetResult<()> {
        let start = self.pos();
        out.clear();
        loop {
            match self.get_char() {
                Ok(c) if terminators.contains(&c) => {
                    self.backward(1);
                    return Ok(());
                }
                Ok(c) => out.push(c),
                Err(e) => {
                    let scanned = (self.pos() - start) as usize;
                    self.backward(scanned);
                    out.clear();
                    return Err(e);
                }
            }
        }
    }
}

/// Streaming byte sink with bounded rewind and commit.
pub trait WriteBuffer {
    /// Append a byte slice.
    fn append(&mut self, bytes: &[u8]) -> NetResult<()>;

    /// Append a single byte.
    fn append_byte(&mut self, b: u8) -> NetResult<()>;

    /// Erase the last `n` uncommitted bytes.
    ///
    /// Panics if the rewind would cross the commit point.
    fn backward(&mut self, n: usize);

    /// Mark everything written so far as final; later rewinds stop
    /// here, and flushing may push it toward the sink.
    fn commit(&mut self) -> NetResult<()>;
}
