//! JSON-RPC framing over the streaming codec
//!
//! Request frames are `{"jsonrpc":"2.0","method":m,"id":i,"params":p}`
//! and responses echo the id with either a `result` or an
//! `error:{code,message}` member. Frames carry no length prefix; the
//! parser consumes exactly one object per request by structural
//! matching, and a connection serves frames strictly one at a time.

mod error;
mod proto;
mod router;
mod server;

pub use error::RpcError;
pub use proto::{Id, Proto, VERSION};
pub use router::{Handler, Router};
pub use server::{RpcServer, ServerConfig, ServerRouter};
