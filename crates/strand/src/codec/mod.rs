//! Type-directed streaming JSON codec
//!
//! Values encode and decode recursively, dispatching on their static
//! shape, directly against a streaming buffer; nothing materializes a
//! DOM or a whole message first. The wire forms:
//!
//! | Shape | Form |
//! |-------|------|
//! | integers / floats | decimal text |
//! | bool | `true` / `false` |
//! | String | double-quoted raw bytes, no escape processing |
//! | sequences, sets, arrays | `[a,b,c]` |
//! | tuples | `[a,b,c]` (heterogeneous) |
//! | map with string keys | `{"k":v,...}` |
//! | map with other keys | `[{"key":k,"value":v},...]` |
//! | `Pair<K, V>` | single-entry map form |
//! | `Option::None` | `null` |
//! | `Option::Some(v)` / `Box<T>` | the inner form |
//! | records | `{"field":v,...}` via the field visitor |
//!
//! Decoding is whitespace-tolerant and accepts either bracket style for
//! map-shaped values. Scalars scan up to the next `,`, `}` or `]`
//! exclusive, so a bare top-level scalar needs a terminator after it —
//! inside a frame one is always present.

mod de;
mod impls;
mod ser;

pub use de::JsonDeserializer;
pub use ser::JsonSerializer;

use core::fmt;
use strand_net::{NetError, ReadBuffer, WriteBuffer};

pub type CodecResult<T> = Result<T, CodecError>;

/// Codec failure.
///
/// A syntax error carries the buffer position at which decoding gave
/// up; the buffer state there is unrecoverable for this message and
/// the caller must drop the rest of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Syntax { pos: u64 },
    Net(NetError),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Syntax { pos } => write!(f, "json syntax error at byte {}", pos),
            CodecError::Net(e) => write!(f, "network error during codec: {}", e),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<NetError> for CodecError {
    fn from(e: NetError) -> Self {
        CodecError::Net(e)
    }
}

/// A value that can serialize itself onto a write buffer.
pub trait Encode {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> CodecResult<()>;
}

/// A value that can parse itself off a read buffer.
pub trait Decode: Sized {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> CodecResult<Self>;
}

/// Marker for types usable as map keys, deciding between the string
/// object form and the key/value entry form.
pub trait Key: Encode + Decode {
    const STRING: bool;
}

/// An explicit key/value pair, wire-compatible with a single-entry map.
///
/// Rust tuples always use the array form; this type exists for the
/// `{"key":k,"value":v}` (or `{"k":v}` for string keys) shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pair<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Pair<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}
