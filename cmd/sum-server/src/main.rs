//! Demo JSON-RPC server: one `sum` method over fiber-served TCP.
//!
//! Usage:
//!     cargo run -p sum-server            # listens on 127.0.0.1:9998
//!     STRAND_RPC_ADDR=0.0.0.0:9000 cargo run -p sum-server
//!
//! Try it:
//!     printf '{"jsonrpc":"2.0","method":"sum","id":1,"params":[[1,2,3,4]]}' \
//!         | nc 127.0.0.1 9998

use std::net::SocketAddr;
use std::sync::Arc;
use strand::rpc::{RpcServer, ServerConfig, ServerRouter};
use strand::{log_error, log_info, Runtime, RuntimeConfig};

fn main() {
    let addr: SocketAddr = std::env::var("STRAND_RPC_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:9998".to_string())
        .parse()
        .expect("STRAND_RPC_ADDR must be host:port");

    let runtime = match Runtime::new(RuntimeConfig::from_env()) {
        Ok(rt) => rt,
        Err(e) => {
            log_error!("runtime init failed: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.start() {
        log_error!("runtime start failed: {}", e);
        std::process::exit(1);
    }

    let mut router = ServerRouter::new();
    router.add_method("sum", |(values,): (Vec<i64>,)| {
        Ok(values.into_iter().sum::<i64>())
    });

    let server = match RpcServer::bind(addr, Arc::new(router), ServerConfig::default()) {
        Ok(server) => server,
        Err(e) => {
            log_error!("bind {} failed: {}", addr, e);
            std::process::exit(1);
        }
    };
    log_info!("sum-server on {}", addr);

    if let Err(e) = server.start() {
        log_error!("server start failed: {}", e);
        std::process::exit(1);
    }

    loop {
        std::thread::park();
    }
}
