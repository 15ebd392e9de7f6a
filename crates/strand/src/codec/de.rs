//! JSON deserializer
//!
//! Pull parser over a `ReadBuffer`. Container decoding peeks for the
//! closing bracket to exit, decodes an element, and consumes one comma
//! if present; scalar decoding scans up to the next `,`, `}` or `]`
//! exclusive. Every mismatch reports the buffer position it was
//! detected at.

use super::{CodecError, CodecResult, Decode};
use strand_net::ReadBuffer;

pub struct JsonDeserializer<'a, R: ReadBuffer> {
    buf: &'a mut R,
}

impl<'a, R: ReadBuffer> JsonDeserializer<'a, R> {
    pub fn new(buf: &'a mut R) -> Self {
        Self { buf }
    }

    /// Deserialize any decodable value.
    pub fn load<T: Decode>(&mut self) -> CodecResult<T> {
        T::decode(self)
    }

    /// Current read position (for error reports).
    pub fn pos(&self) -> u64 {
        self.buf.pos()
    }

    /// A syntax error at the current position.
    pub fn syntax_err<T>(&self) -> CodecResult<T> {
        Err(CodecError::Syntax {
            pos: self.buf.pos(),
        })
    }

    pub fn get_char(&mut self) -> CodecResult<u8> {
        Ok(self.buf.get_char()?)
    }

    /// Next non-whitespace byte, consumed.
    pub fn get_char_f(&mut self) -> CodecResult<u8> {
        Ok(self.buf.get_char_f()?)
    }

    /// Next non-whitespace byte, not consumed (leading whitespace is).
    pub fn peek_char_f(&mut self) -> CodecResult<u8> {
        Ok(self.buf.peek_char_f()?)
    }

    /// Consume one non-whitespace byte and require it to be `want`.
    pub fn expect_f(&mut self, want: u8) -> CodecResult<()> {
        if self.buf.get_char_f()? != want {
            return self.syntax_err();
        }
        Ok(())
    }

    /// Scalar token: everything up to the next `,`, `}` or `]`.
    pub fn load_scalar(&mut self) -> CodecResult<String> {
        let mut out = Vec::new();
        self.buf.read_until(b",}]", &mut out)?;
        String::from_utf8(out).or_else(|_| self.syntax_err())
    }

    /// A double-quoted string; bytes pass through unescaped.
    pub fn load_string(&mut self) -> CodecResult<String> {
        self.expect_f(b'"')?;
        let mut out = Vec::new();
        self.buf.read_until(b"\"", &mut out)?;
        self.buf.get_char()?; // closing quote
        String::from_utf8(out).or_else(|_| self.syntax_err())
    }

    /// Consume a `null` literal if one is next. Only the leading `n`
    /// is peeked first, so short non-null inputs are not over-read.
    pub fn take_null(&mut self) -> CodecResult<bool> {
        if self.buf.peek_char_f()? != b'n' {
            return Ok(false);
        }
        if self.buf.peek_string(4)? != "null" {
            return self.syntax_err();
        }
        self.buf.forward(4)?;
        Ok(true)
    }

    /// One `{"key":K,"value":V}` entry (the non-string-key map form).
    pub fn load_entry<K: Decode, V: Decode>(&mut self) -> CodecResult<(K, V)> {
        self.expect_f(b'{')?;
        self.buf.peek_char_f()?;
        if self.buf.peek_string(5)? != "\"key\"" {
            return self.syntax_err();
        }
        self.buf.forward(5)?;
        self.expect_f(b':')?;
        let key = K::decode(self)?;
        self.expect_f(b',')?;
        self.buf.peek_char_f()?;
        if self.buf.peek_string(7)? != "\"value\"" {
            return self.syntax_err();
        }
        self.buf.forward(7)?;
        self.expect_f(b':')?;
        let value = V::decode(self)?;
        self.expect_f(b'}')?;
        Ok((key, value))
    }

    // Field-visitor operations for records, mirroring the serializer.

    pub fn begin_record(&mut self) -> CodecResult<()> {
        self.expect_f(b'{')
    }

    /// One `"name":value` member. Verifies the key matches `name` and
    /// that the member ends with `,` or `}` (both consumed).
    pub fn field<T: Decode>(&mut self, name: &str) -> CodecResult<T> {
        let key = self.load_string()?;
        if key != name {
            return self.syntax_err();
        }
        self.expect_f(b':')?;
        let value = T::decode(self)?;
        let sep = self.buf.get_char_f()?;
        if sep != b',' && sep != b'}' {
            return self.syntax_err();
        }
        Ok(value)
    }

    /// Close a record whose last field already consumed the brace.
    pub fn end_record(&mut self) -> CodecResult<()> {
        Ok(())
    }

    /// Close a record with no fields at all.
    pub fn end_empty_record(&mut self) -> CodecResult<()> {
        self.expect_f(b'}')
    }
}
