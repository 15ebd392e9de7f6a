//! Method dispatch
//!
//! A name-to-handler map. How method names map to callables is the
//! host application's concern; the typed `add_method` adapter covers
//! the common case of a function over a decodable argument tuple.

use super::error::RpcError;
use super::proto::Proto;
use crate::codec::{Decode, Encode};
use std::collections::HashMap;
use strand_net::{ReadBuffer, WriteBuffer};

/// A registered handler: parses its own params off the proto and
/// writes its own response.
pub type Handler<R, W> =
    Box<dyn Fn(&mut Proto<'_, R, W>) -> Result<(), RpcError> + Send + Sync + 'static>;

pub struct Router<R: ReadBuffer, W: WriteBuffer> {
    methods: HashMap<String, Handler<R, W>>,
}

impl<R: ReadBuffer, W: WriteBuffer> Router<R, W> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Register a typed handler: params decode as `Args`, the return
    /// value encodes as the result. A handler error becomes an
    /// internal-error response and the connection survives it.
    pub fn add_method<Args, Res, F>(&mut self, name: &str, f: F)
    where
        Args: Decode,
        Res: Encode,
        F: Fn(Args) -> Result<Res, RpcError> + Send + Sync + 'static,
    {
        self.add_raw(
            name,
            Box::new(move |proto| {
                let args: Args = proto.parse_request()?;
                let result = f(args)?;
                proto.send_response(&result)
            }),
        );
    }

    /// Register a handler that works the proto directly.
    pub fn add_raw(&mut self, name: &str, handler: Handler<R, W>) {
        self.methods.insert(name.to_string(), handler);
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Run the handler for `method`, or fail with method-not-found.
    pub fn dispatch(&self, method: &str, proto: &mut Proto<'_, R, W>) -> Result<(), RpcError> {
        match self.methods.get(method) {
            Some(handler) => handler(proto),
            None => Err(RpcError::MethodNotFound),
        }
    }
}

impl<R: ReadBuffer, W: WriteBuffer> Default for Router<R, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ReadBuffer, W: WriteBuffer> std::fmt::Debug for Router<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
