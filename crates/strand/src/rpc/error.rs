//! JSON-RPC error taxonomy
//!
//! The first five kinds carry conventional wire codes. The rest only
//! drive the connection loop: a frame-boundary timeout is retried, a
//! client close or network failure exits, and neither is written on
//! the wire.

use crate::codec::CodecError;
use core::fmt;
use strand_net::NetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// Malformed JSON. Code -32700.
    Parse,

    /// Structurally valid but not a proper request envelope
    /// (e.g. wrong protocol version). Code -32600.
    InvalidRequest,

    /// No handler registered for the method. Code -32601.
    MethodNotFound,

    /// The params member did not decode as the handler's argument
    /// tuple. Code -32602.
    InvalidParams,

    /// The handler itself failed. Code -32603.
    Internal(String),

    /// Nothing arrived at a frame boundary. Recoverable; retry.
    Timeout,

    /// The client closed the connection.
    ClientClosed,

    /// Any other network failure.
    Net(NetError),
}

impl RpcError {
    /// Wire code, when this kind is written on the wire.
    pub fn code(&self) -> Option<i32> {
        match self {
            RpcError::Parse => Some(-32700),
            RpcError::InvalidRequest => Some(-32600),
            RpcError::MethodNotFound => Some(-32601),
            RpcError::InvalidParams => Some(-32602),
            RpcError::Internal(_) => Some(-32603),
            _ => None,
        }
    }

    /// Wire message.
    pub fn message(&self) -> String {
        match self {
            RpcError::Parse => "parse error".into(),
            RpcError::InvalidRequest => "invalid request".into(),
            RpcError::MethodNotFound => "method not found".into(),
            RpcError::InvalidParams => "invalid params".into(),
            RpcError::Internal(msg) if msg.is_empty() => "internal error".into(),
            RpcError::Internal(msg) => msg.clone(),
            RpcError::Timeout => "timeout".into(),
            RpcError::ClientClosed => "client closed".into(),
            RpcError::Net(e) => e.to_string(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "rpc error {}: {}", code, self.message()),
            None => write!(f, "rpc: {}", self.message()),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<NetError> for RpcError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::PeerClosed => RpcError::ClientClosed,
            other => RpcError::Net(other),
        }
    }
}

impl From<CodecError> for RpcError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Syntax { .. } => RpcError::Parse,
            CodecError::Net(net) => net.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(RpcError::Parse.code(), Some(-32700));
        assert_eq!(RpcError::InvalidRequest.code(), Some(-32600));
        assert_eq!(RpcError::MethodNotFound.code(), Some(-32601));
        assert_eq!(RpcError::InvalidParams.code(), Some(-32602));
        assert_eq!(RpcError::Internal(String::new()).code(), Some(-32603));
        assert_eq!(RpcError::ClientClosed.code(), None);
        assert_eq!(RpcError::Timeout.code(), None);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(
            RpcError::from(NetError::PeerClosed),
            RpcError::ClientClosed
        );
        assert_eq!(
            RpcError::from(CodecError::Syntax { pos: 12 }),
            RpcError::Parse
        );
        assert_eq!(
            RpcError::from(NetError::Timeout),
            RpcError::Net(NetError::Timeout)
        );
    }
}
