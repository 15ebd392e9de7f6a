//! Request/response framing
//!
//! `Proto` drives one request/response exchange over a buffer pair.
//! The header parse is streaming: `parse_method` consumes the envelope
//! only up to and including the method name, so the server can look up
//! the handler before the argument tuple is decoded with the handler's
//! types. A frame whose parse stopped partway poisons the connection;
//! only a timeout with zero bytes consumed is safe to retry.

use super::error::RpcError;
use crate::codec::{CodecError, Decode, Encode, JsonDeserializer, JsonSerializer};
use crate::{Decode as DeriveDecode, Encode as DeriveEncode};
use strand_net::{NetError, ReadBuffer, WriteBuffer};

/// Protocol version written and required in every frame.
pub const VERSION: &str = "2.0";

/// Request identity: echoed from request to response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Id {
    Int(i64),
    Str(String),
}

impl Encode for Id {
    fn encode<W: WriteBuffer>(&self, s: &mut JsonSerializer<'_, W>) -> crate::codec::CodecResult<()> {
        match self {
            Id::Int(v) => v.encode(s),
            Id::Str(v) => v.encode(s),
        }
    }
}

impl Decode for Id {
    fn decode<R: ReadBuffer>(d: &mut JsonDeserializer<'_, R>) -> crate::codec::CodecResult<Self> {
        if d.peek_char_f()? == b'"' {
            Ok(Id::Str(String::decode(d)?))
        } else {
            Ok(Id::Int(i64::decode(d)?))
        }
    }
}

#[derive(DeriveEncode, DeriveDecode)]
struct ErrorBody {
    code: i32,
    message: String,
}

/// One in-flight exchange over a read/write buffer pair.
pub struct Proto<'a, R: ReadBuffer, W: WriteBuffer> {
    rd: &'a mut R,
    wr: &'a mut W,
    method: String,
    id: Option<Id>,
}

impl<'a, R: ReadBuffer, W: WriteBuffer> Proto<'a, R, W> {
    pub fn new(rd: &'a mut R, wr: &'a mut W) -> Self {
        Self {
            rd,
            wr,
            method: String::new(),
            id: None,
        }
    }

    /// Parse the envelope through the method name.
    ///
    /// Returns `Err(Timeout)` only when nothing of the frame was
    /// consumed, in which case the caller may simply call again. A
    /// timeout mid-header is a fatal `Net` error instead, because the
    /// stream position is no longer at a frame boundary.
    pub fn parse_method(&mut self) -> Result<&str, RpcError> {
        self.method.clear();
        self.id = None;
        let start = self.rd.pos();

        match read_envelope_head(self.rd) {
            Ok(method) => {
                self.method = method;
                Ok(self.method.as_str())
            }
            Err(RpcError::Net(NetError::Timeout)) if self.rd.pos() == start => {
                Err(RpcError::Timeout)
            }
            Err(e) => Err(e),
        }
    }

    /// Method name from the last successful `parse_method`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request id once `parse_request` has run.
    pub fn request_id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    /// Decode the id and the argument tuple, consuming the rest of the
    /// request frame.
    pub fn parse_request<Args: Decode>(&mut self) -> Result<Args, RpcError> {
        let (id, args) = read_request_tail::<R, Args>(self.rd)?;
        self.id = Some(id);
        Ok(args)
    }

    /// Encode a success response and commit it to the write buffer.
    pub fn send_response<Res: Encode>(&mut self, result: &Res) -> Result<(), RpcError> {
        let mut s = JsonSerializer::new(&mut *self.wr);
        s.begin_record()?;
        s.field("jsonrpc", VERSION)?;
        s.field("id", &self.id)?;
        s.field("result", result)?;
        s.end_record(3)?;
        self.wr.commit()?;
        Ok(())
    }

    /// Encode an error response, if this kind has a wire code. The id
    /// is `null` when the failure came before the id was parsed.
    pub fn send_error(&mut self, err: &RpcError) -> Result<(), RpcError> {
        let Some(code) = err.code() else {
            return Ok(());
        };
        let body = ErrorBody {
            code,
            message: err.message(),
        };
        let mut s = JsonSerializer::new(&mut *self.wr);
        s.begin_record()?;
        s.field("jsonrpc", VERSION)?;
        s.field("id", &self.id)?;
        s.field("error", &body)?;
        s.end_record(3)?;
        self.wr.commit()?;
        Ok(())
    }
}

fn read_envelope_head<R: ReadBuffer>(rd: &mut R) -> Result<String, RpcError> {
    let mut d = JsonDeserializer::new(rd);
    d.begin_record()?;
    let version: String = d.field("jsonrpc")?;
    if version != VERSION {
        return Err(RpcError::InvalidRequest);
    }
    let method: String = d.field("method")?;
    Ok(method)
}

fn read_request_tail<R: ReadBuffer, Args: Decode>(rd: &mut R) -> Result<(Id, Args), RpcError> {
    let mut d = JsonDeserializer::new(rd);
    let id: Id = d.field("id")?;
    let args: Args = d.field("params").map_err(|e| match e {
        CodecError::Syntax { .. } => RpcError::InvalidParams,
        other => other.into(),
    })?;
    // The params member is last; its separator check consumed the
    // closing brace of the envelope.
    Ok((id, args))
}
