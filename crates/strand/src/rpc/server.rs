//! Connection serving
//!
//! One acceptor fiber spawns one handler fiber per connection. Each
//! handler owns a ring-buffer pair over its socket and loops: parse
//! the method, dispatch, flush, commit the read side, repeat. Frames
//! are served strictly one at a time.
//!
//! Exit matrix per the error taxonomy: a frame-boundary timeout
//! retries; client close and network errors exit silently; a handler
//! failure answers with internal-error and keeps the connection;
//! protocol failures (parse, bad version, unknown method, bad params)
//! answer when possible and then close, because partial reads may have
//! consumed trailing bytes of the stream.

use super::error::RpcError;
use super::proto::Proto;
use super::router::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use strand_core::{log_debug, log_error, log_info, CancelToken, FiberId, SchedResult};
use strand_net::{
    NetError, NetResult, ReadBuffer, ReadRingBuffer, TcpListener, TcpSocket, WriteRingBuffer,
};
use strand_runtime::scheduler;

/// Router specialized to the ring buffers the server uses.
pub type ServerRouter = Router<ReadRingBuffer, WriteRingBuffer>;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Per-read timeout on each connection; hit at a frame boundary it
    /// just re-arms the wait.
    pub read_timeout: Option<Duration>,
    /// Ring capacity per direction per connection.
    pub ring_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(Duration::from_secs(5)),
            ring_capacity: 4096,
        }
    }
}

pub struct RpcServer {
    listener: TcpListener,
    router: Arc<ServerRouter>,
    config: ServerConfig,
}

impl RpcServer {
    pub fn bind(
        addr: SocketAddr,
        router: Arc<ServerRouter>,
        config: ServerConfig,
    ) -> NetResult<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            router,
            config,
        })
    }

    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the acceptor fiber. Cancel it to stop accepting.
    pub fn start(self) -> SchedResult<FiberId> {
        scheduler::spawn(move |token| self.accept_loop(token))
    }

    fn accept_loop(self, token: &CancelToken) {
        log_info!(
            "rpc server listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".into())
        );
        loop {
            if token.is_cancelled() {
                return;
            }
            match self.listener.accept() {
                Ok(sock) => {
                    let router = self.router.clone();
                    let config = self.config.clone();
                    if let Err(e) =
                        scheduler::spawn(move |_| handle_connection(sock, router, config))
                    {
                        log_error!("failed to spawn connection fiber: {}", e);
                    }
                }
                Err(NetError::Cancelled) => return,
                Err(e) => {
                    log_error!("accept failed: {}", e);
                    return;
                }
            }
        }
    }
}

/// Serve one connection until it closes or poisons itself.
fn handle_connection(sock: TcpSocket, router: Arc<ServerRouter>, config: ServerConfig) {
    let peer_fd = sock.fd();
    let sock = Arc::new(sock);
    let mut rd = ReadRingBuffer::new(sock.clone(), config.ring_capacity, config.read_timeout);
    let mut wr = WriteRingBuffer::new(sock, config.ring_capacity);
    log_debug!("connection fd {} open", peer_fd);

    loop {
        let mut proto = Proto::new(&mut rd, &mut wr);
        let outcome = match proto.parse_method().map(str::to_owned) {
            Ok(method) => router.dispatch(&method, &mut proto),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = wr.flush() {
                    log_debug!("fd {} flush failed: {}", peer_fd, e);
                    return;
                }
                rd.commit();
            }
            Err(RpcError::Timeout) => continue,
            Err(RpcError::ClientClosed) => {
                log_debug!("fd {} client closed", peer_fd);
                return;
            }
            Err(RpcError::Net(e)) => {
                log_debug!("fd {} network error: {}", peer_fd, e);
                return;
            }
            Err(err @ RpcError::Internal(_)) => {
                if proto.send_error(&err).is_err() || wr.flush().is_err() {
                    return;
                }
                rd.commit();
            }
            Err(err) => {
                log_debug!("fd {} protocol error: {}", peer_fd, err);
                let _ = proto.send_error(&err);
                let _ = wr.flush();
                return;
            }
        }
    }
}
