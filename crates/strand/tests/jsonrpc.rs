//! JSON-RPC framing and server behavior: the echo path returns the
//! computed result, unknown methods answer method-not-found and then
//! the server closes the connection.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use strand::rpc::{Id, Proto, Router, RpcError, RpcServer, ServerConfig, ServerRouter};
use strand::{MemReadBuffer, MemWriteBuffer, Runtime, RuntimeConfig};

fn rt() -> &'static Runtime {
    static RT: OnceLock<Runtime> = OnceLock::new();
    RT.get_or_init(|| {
        let runtime = Runtime::new(RuntimeConfig::new().workers(2)).unwrap();
        runtime.start().unwrap();
        runtime
    })
}

fn sum_router() -> ServerRouter {
    let mut router = ServerRouter::new();
    router.add_method("sum", |(values,): (Vec<i64>,)| {
        Ok(values.into_iter().sum::<i64>())
    });
    router.add_method("fail", |_: ()| -> Result<i64, RpcError> {
        Err(RpcError::Internal("boom".into()))
    });
    router
}

/// Read exactly one JSON object off the stream by brace matching.
fn read_frame(stream: &mut std::net::TcpStream) -> String {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut started = false;
    let mut in_string = false;
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).unwrap();
        assert!(n == 1, "connection closed mid-frame");
        let b = byte[0];
        out.push(b);
        match b {
            b'"' => in_string = !in_string,
            b'{' | b'[' if !in_string => {
                depth += 1;
                started = true;
            }
            b'}' | b']' if !in_string => depth -= 1,
            _ => {}
        }
        if started && depth == 0 {
            return String::from_utf8(out).unwrap();
        }
    }
}

#[test]
fn test_proto_exchange_over_memory_buffers() {
    let request = b"{\"jsonrpc\":\"2.0\",\"method\":\"sum\",\"id\":7,\"params\":[[1,2,3,4]]}";
    let mut rd = MemReadBuffer::new(request.to_vec());
    let mut wr = MemWriteBuffer::new();
    let mut proto = Proto::new(&mut rd, &mut wr);

    assert_eq!(proto.parse_method().unwrap(), "sum");
    let (values,): (Vec<i64>,) = proto.parse_request().unwrap();
    assert_eq!(values, vec![1, 2, 3, 4]);
    assert_eq!(proto.request_id(), Some(&Id::Int(7)));

    let total: i64 = values.into_iter().sum();
    proto.send_response(&total).unwrap();
    assert_eq!(wr.as_str(), "{\"jsonrpc\":\"2.0\",\"id\":7,\"result\":10}");
}

#[test]
fn test_proto_string_id_is_echoed() {
    let request = b"{\"jsonrpc\":\"2.0\",\"method\":\"sum\",\"id\":\"req-1\",\"params\":[[5]]}";
    let mut rd = MemReadBuffer::new(request.to_vec());
    let mut wr = MemWriteBuffer::new();
    let mut proto = Proto::new(&mut rd, &mut wr);

    proto.parse_method().unwrap();
    let _: (Vec<i64>,) = proto.parse_request().unwrap();
    proto.send_response(&5i64).unwrap();
    assert_eq!(
        wr.as_str(),
        "{\"jsonrpc\":\"2.0\",\"id\":\"req-1\",\"result\":5}"
    );
}

#[test]
fn test_proto_rejects_wrong_version() {
    let request = b"{\"jsonrpc\":\"1.0\",\"method\":\"sum\",\"id\":1,\"params\":[[]]}";
    let mut rd = MemReadBuffer::new(request.to_vec());
    let mut wr = MemWriteBuffer::new();
    let mut proto = Proto::new(&mut rd, &mut wr);
    assert_eq!(proto.parse_method(), Err(RpcError::InvalidRequest));
}

#[test]
fn test_proto_bad_params_is_invalid_params() {
    let request = b"{\"jsonrpc\":\"2.0\",\"method\":\"sum\",\"id\":1,\"params\":[\"zap\"]}";
    let mut rd = MemReadBuffer::new(request.to_vec());
    let mut wr = MemWriteBuffer::new();
    let mut proto = Proto::new(&mut rd, &mut wr);
    proto.parse_method().unwrap();
    let res: Result<(Vec<i64>,), _> = proto.parse_request();
    assert_eq!(res.unwrap_err(), RpcError::InvalidParams);
}

#[test]
fn test_error_response_without_id_is_null() {
    let mut rd = MemReadBuffer::new(Vec::new());
    let mut wr = MemWriteBuffer::new();
    let mut proto = Proto::new(&mut rd, &mut wr);
    proto.send_error(&RpcError::MethodNotFound).unwrap();
    assert_eq!(
        wr.as_str(),
        "{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{\"code\":-32601,\"message\":\"method not found\"}}"
    );
}

fn start_server() -> SocketAddr {
    rt();
    let server = RpcServer::bind(
        SocketAddr::from_str("127.0.0.1:0").unwrap(),
        Arc::new(sum_router()),
        ServerConfig {
            read_timeout: Some(Duration::from_millis(200)),
            ring_capacity: 4096,
        },
    )
    .unwrap();
    let addr = server.local_addr().unwrap();
    server.start().unwrap();
    addr
}

#[test]
fn test_server_sum_roundtrip() {
    let addr = start_server();
    let mut client = std::net::TcpStream::connect(addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    client
        .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"sum\",\"id\":1,\"params\":[[1,2,3,4]]}")
        .unwrap();
    let response = read_frame(&mut client);
    assert_eq!(response, "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":10}");

    // Frames are served one at a time on a live connection.
    client
        .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"sum\",\"id\":2,\"params\":[[10,-4]]}")
        .unwrap();
    let response = read_frame(&mut client);
    assert_eq!(response, "{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":6}");
}

#[test]
fn test_server_unknown_method_errors_and_closes() {
    let addr = start_server();
    let mut client = std::net::TcpStream::connect(addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    client
        .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"nope\",\"id\":3,\"params\":[]}")
        .unwrap();
    let response = read_frame(&mut client);
    assert!(response.contains("\"code\":-32601"));
    assert!(response.contains("method not found"));

    // The connection is closed after the error response.
    let mut rest = Vec::new();
    let n = client.read_to_end(&mut rest).unwrap();
    assert_eq!(n, 0);
}

#[test]
fn test_server_handler_error_keeps_connection() {
    let addr = start_server();
    let mut client = std::net::TcpStream::connect(addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    client
        .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"fail\",\"id\":4,\"params\":[]}")
        .unwrap();
    let response = read_frame(&mut client);
    assert!(response.contains("\"code\":-32603"));
    assert!(response.contains("boom"));

    // A handler failure does not poison the connection.
    client
        .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"sum\",\"id\":5,\"params\":[[2,2]]}")
        .unwrap();
    let response = read_frame(&mut client);
    assert_eq!(response, "{\"jsonrpc\":\"2.0\",\"id\":5,\"result\":4}");
}

#[test]
fn test_router_dispatch_unknown() {
    let mut rd = MemReadBuffer::new(Vec::new());
    let mut wr = MemWriteBuffer::new();
    let mut proto = Proto::new(&mut rd, &mut wr);
    let router: Router<MemReadBuffer, MemWriteBuffer> = Router::new();
    assert_eq!(
        router.dispatch("nope", &mut proto),
        Err(RpcError::MethodNotFound)
    );
}
