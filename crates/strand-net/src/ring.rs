//! Socket-backed ring buffers
//!
//! Fixed-capacity rings coupling the streaming buffer traits to a
//! non-blocking socket with a per-operation timeout. Positions are
//! absolute byte offsets; the ring index is the offset modulo capacity.
//!
//! Read side invariant: commit ≤ read ≤ tail ≤ commit + capacity.
//! Bytes before the commit point are unreachable and their space is
//! reusable; the span [commit, tail) stays addressable for peeks and
//! bounded rewinds, so the ring must exceed the longest look-behind the
//! parser needs (any single key or scalar token in practice).

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{NetError, NetResult};
use crate::socket::TcpSocket;
use std::sync::Arc;
use std::time::Duration;

/// Streaming reads off a socket through a fixed ring.
pub struct ReadRingBuffer {
    buf: Box<[u8]>,
    sock: Arc<TcpSocket>,
    timeout: Option<Duration>,
    /// Rewind floor; space before it is reusable.
    commit: u64,
    /// Uncommitted read position.
    read: u64,
    /// End of buffered data.
    tail: u64,
}

impl ReadRingBuffer {
    pub fn new(sock: Arc<TcpSocket>, capacity: usize, timeout: Option<Duration>) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            sock,
            timeout,
            commit: 0,
            read: 0,
            tail: 0,
        }
    }

    #[inline]
    fn cap(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Pull more bytes from the socket into the free span. Suspends the
    /// fiber while the socket is empty; the read position is untouched
    /// on failure.
    fn fill(&mut self) -> NetResult<()> {
        let used = self.tail - self.commit;
        if used >= self.cap() {
            return Err(NetError::BufferFull);
        }
        let start = (self.tail % self.cap()) as usize;
        let free = (self.cap() - used) as usize;
        let contig = free.min(self.buf.len() - start);
        let n = self
            .sock
            .recv_timeout(&mut self.buf[start..start + contig], self.timeout)?;
        self.tail += n as u64;
        Ok(())
    }

    /// Buffer at least `n` bytes past the read position.
    fn ensure(&mut self, n: usize) -> NetResult<()> {
        if n as u64 > self.cap() {
            return Err(NetError::BufferFull);
        }
        while self.tail - self.read < n as u64 {
            self.fill()?;
        }
        Ok(())
    }

    #[inline]
    fn at(&self, pos: u64) -> u8 {
        self.buf[(pos % self.cap()) as usize]
    }
}

impl ReadBuffer for ReadRingBuffer {
    fn pos(&self) -> u64 {
        self.read
    }

    fn get_char(&mut self) -> NetResult<u8> {
        self.ensure(1)?;
        let b = self.at(self.read);
        self.read += 1;
        Ok(b)
    }

    fn peek_char(&mut self) -> NetResult<u8> {
        self.ensure(1)?;
        Ok(self.at(self.read))
    }

    fn forward(&mut self, n: usize) -> NetResult<()> {
        self.ensure(n)?;
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
        self.ensure(n)?;
        let mut out = Vec::with_capacity(n);
        for i in 0..n as u64 {
            out.push(self.at(self.read + i));
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn commit(&mut self) {
        self.commit = self.read;
    }
}

/// Streaming writes to a socket through a fixed ring.
///
/// `append` spills to the socket only when the ring would overflow, and
/// only up to the commit point; `flush` drains everything committed.
pub struct WriteRingBuffer {
    buf: Box<[u8]>,
    sock: Arc<TcpSocket>,
    /// Already flushed to the socket.
    head: u64,
    /// Committed (flushable) boundary and rewind floor.
    commit: u64,
    /// Write position.
    tail: u64,
}

impl WriteRingBuffer {
    pub fn new(sock: Arc<TcpSocket>, capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            sock,
            head: 0,
            commit: 0,
            tail: 0,
        }
    }

    #[inline]
    fn cap(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Send everything up to the commit point. Suspends the fiber while
    /// the socket is congested.
    pub fn flush(&mut self) -> NetResult<()> {
        while self.head < self.commit {
            let start = (self.head % self.cap()) as usize;
            let contig = ((self.commit - self.head) as usize).min(self.buf.len() - start);
            self.sock.send_all(&self.buf[start..start + contig])?;
            self.head += contig as u64;
        }
        Ok(())
    }

    /// Free space for one more byte, flushing committed data if needed.
    fn make_room(&mut self) -> NetResult<()> {
        if self.tail - self.head < self.cap() {
            return Ok(());
        }
        self.flush()?;
        if self.tail - self.head >= self.cap() {
            // Nothing committed to flush; the uncommitted span fills
            // the ring.
            return Err(NetError::BufferFull);
        }
        Ok(())
    }
}

impl WriteBuffer for WriteRingBuffer {
    fn append(&mut self, bytes: &[u8]) -> NetResult<()> {
        let mut rest = bytes;
        while !rest.is_empty() {
            self.make_room()?;
            let start = (self.tail % self.cap()) as usize;
            let free = (self.cap() - (self.tail - self.head)) as usize;
            let contig = free.min(self.buf.len() - start).min(rest.len());
            self.buf[start..start + contig].copy_from_slice(&rest[..contig]);
            self.tail += contig as u64;
            rest = &rest[contig..];
        }
        Ok(())
    }

    fn append_byte(&mut self, b: u8) -> NetResult<()> {
        self.make_room()?;
        let start = (self.tail % self.cap()) as usize;
        self.buf[start] = b;
        self.tail += 1;
        Ok(())
    }

    fn backward(&mut self, n: usize) {
        assert!(
            self.tail - self.commit >= n as u64,
            "rewind across the commit point"
        );
        self.tail -= n as u64;
    }

    fn commit(&mut self) -> NetResult<()> {
        self.commit = self.tail;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Arc<TcpSocket>, Arc<TcpSocket>) {
        let (a, b) = TcpSocket::pair().unwrap();
        (Arc::new(a), Arc::new(b))
    }

    /// Raw write on the peer socket; small enough never to block.
    fn peer_write(sock: &TcpSocket, data: &[u8]) {
        let n = unsafe {
            libc::write(
                sock.fd(),
                data.as_ptr() as *const libc::c_void,
                data.len(),
            )
        };
        assert_eq!(n, data.len() as isize);
    }

    fn peer_read(sock: &TcpSocket, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        let n = unsafe {
            libc::read(sock.fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len())
        };
        assert!(n >= 0);
        buf.truncate(n as usize);
        buf
    }

    #[test]
    fn test_get_char_streams_across_fills() {
        let (ours, peer) = pair();
        peer_write(&peer, b"abc");
        let mut rd = ReadRingBuffer::new(ours, 4, None);
        assert_eq!(rd.get_char().unwrap(), b'a');
        assert_eq!(rd.get_char().unwrap(), b'b');
        peer_write(&peer, b"de");
        assert_eq!(rd.get_char().unwrap(), b'c');
        assert_eq!(rd.get_char().unwrap(), b'd');
        assert_eq!(rd.get_char().unwrap(), b'e');
    }

    #[test]
    fn test_backward_restores_exactly() {
        let (ours, peer) = pair();
        peer_write(&peer, b"wxyz");
        let mut rd = ReadRingBuffer::new(ours, 8, None);
        let k = 3;
        let before = rd.pos();
        for _ in 0..k {
            rd.get_char().unwrap();
        }
        rd.backward(k);
        assert_eq!(rd.pos(), before);
        assert_eq!(rd.get_char().unwrap(), b'w');
    }

    #[test]
    fn test_peek_string_does_not_advance() {
        let (ours, peer) = pair();
        peer_write(&peer, b"\"key\":1");
        let mut rd = ReadRingBuffer::new(ours, 16, None);
        assert_eq!(rd.peek_string(5).unwrap(), "\"key\"");
        assert_eq!(rd.pos(), 0);
        rd.forward(5).unwrap();
        assert_eq!(rd.get_char().unwrap(), b':');
    }

    #[test]
    fn test_commit_reclaims_ring_space() {
        let (ours, peer) = pair();
        let mut rd = ReadRingBuffer::new(ours, 4, None);
        peer_write(&peer, b"abcd");
        for _ in 0..4 {
            rd.get_char().unwrap();
        }
        // The ring is full of history; committing frees it.
        rd.commit();
        peer_write(&peer, b"efgh");
        assert_eq!(rd.get_char().unwrap(), b'e');
    }

    #[test]
    fn test_read_until_wraps_terminator_rule() {
        let (ours, peer) = pair();
        peer_write(&peer, b"-323]");
        let mut rd = ReadRingBuffer::new(ours, 16, None);
        let mut out = Vec::new();
        rd.read_until(b",}]", &mut out).unwrap();
        assert_eq!(out, b"-323");
        assert_eq!(rd.get_char().unwrap(), b']');
    }

    #[test]
    fn test_peek_larger_than_ring_is_rejected() {
        let (ours, _peer) = pair();
        let mut rd = ReadRingBuffer::new(ours, 4, None);
        assert_eq!(rd.peek_string(5), Err(NetError::BufferFull));
    }

    #[test]
    fn test_write_flush_reaches_socket() {
        let (ours, peer) = pair();
        let mut wr = WriteRingBuffer::new(ours, 8);
        wr.append(b"[1,2]").unwrap();
        wr.commit().unwrap();
        wr.flush().unwrap();
        assert_eq!(peer_read(&peer, 16), b"[1,2]");
    }

    #[test]
    fn test_write_overflow_flushes_committed() {
        let (ours, peer) = pair();
        let mut wr = WriteRingBuffer::new(ours, 4);
        wr.append(b"abcd").unwrap();
        wr.commit().unwrap();
        // Overflow: the committed span spills to the socket first.
        wr.append(b"ef").unwrap();
        wr.commit().unwrap();
        wr.flush().unwrap();
        assert_eq!(peer_read(&peer, 16), b"abcdef");
    }

    #[test]
    fn test_write_overflow_without_commit_fails() {
        let (ours, _peer) = pair();
        let mut wr = WriteRingBuffer::new(ours, 4);
        wr.append(b"abcd").unwrap();
        assert_eq!(wr.append_byte(b'e'), Err(NetError::BufferFull));
    }

    #[test]
    fn test_write_backward_erases_separator() {
        let (ours, peer) = pair();
        let mut wr = WriteRingBuffer::new(ours, 16);
        wr.append(b"1,2,3,").unwrap();
        wr.backward(1);
        wr.append_byte(b']').unwrap();
        wr.commit().unwrap();
        wr.flush().unwrap();
        assert_eq!(peer_read(&peer, 16), b"1,2,3]");
    }
}
