//! JSON serializer
//!
//! Containers are emitted with the emit-then-trim pattern: every
//! element is followed by a comma, and one `backward(1)` erases the
//! trailing one when the container was non-empty. That trades a
//! branch per element for one rewind per container, which is why
//! `WriteBuffer::backward` exists.

use super::{CodecResult, Encode};
use strand_net::WriteBuffer;

pub struct JsonSerializer<'a, W: WriteBuffer> {
    out: &'a mut W,
}

impl<'a, W: WriteBuffer> JsonSerializer<'a, W> {
    pub fn new(out: &'a mut W) -> Self {
        Self { out }
    }

    /// Serialize any encodable value.
    pub fn save<T: Encode + ?Sized>(&mut self, value: &T) -> CodecResult<()> {
        value.encode(self)
    }

    /// Append raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.out.append(bytes)?;
        Ok(())
    }

    /// Append one byte.
    pub fn byte(&mut self, b: u8) -> CodecResult<()> {
        self.out.append_byte(b)?;
        Ok(())
    }

    /// Erase the last `n` bytes (separator trimming).
    pub fn backward(&mut self, n: usize) {
        self.out.backward(n);
    }

    /// A double-quoted string; bytes pass through unescaped.
    pub fn save_str(&mut self, s: &str) -> CodecResult<()> {
        self.byte(b'"')?;
        self.raw(s.as_bytes())?;
        self.byte(b'"')
    }

    // Field-visitor operations for records. A record implementation
    // (usually the derive) opens the braces, emits each field, and
    // closes with the trailing-comma cleanup.

    pub fn begin_record(&mut self) -> CodecResult<()> {
        self.byte(b'{')
    }

    /// Emit one `"name":value,` member.
    pub fn field<T: Encode + ?Sized>(&mut self, name: &str, value: &T) -> CodecResult<()> {
        self.save_str(name)?;
        self.byte(b':')?;
        value.encode(self)?;
        self.byte(b',')
    }

    /// Close the record; `fields` is the number of members emitted.
    pub fn end_record(&mut self, fields: usize) -> CodecResult<()> {
        if fields > 0 {
            self.backward(1);
        }
        self.byte(b'}')
    }
}
