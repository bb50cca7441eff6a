//! Tests for the HTTP server implementation.

#[cfg(test)]
mod server_tests {
    use std::collections::VecDeque;
    use std::io::{self, Write as _};
    use std::net::{Ipv4Addr, SocketAddr};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use serde::Serialize;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::{JoinHandle, JoinSet};
    use tokio::time;

    use crate::parser::HttpRequest;
    use crate::server::{
        ActiveConnections, Connection, ConnectionId, Error, HttpServer, ResponseBuilder, Router,
        ServerConfig, ServerState, ShutdownHandle, Socket, StatusCode,
    };

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // Mock TcpStream that hands out its input one chunk per read
    struct MockTcpStream {
        chunks: VecDeque<Vec<u8>>,
        write_data: Vec<u8>,
    }

    impl MockTcpStream {
        fn new(read_data: &[u8]) -> Self {
            Self::chunked(vec![read_data.to_vec()])
        }

        fn chunked(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into_iter().filter(|c| !c.is_empty()).collect(),
                write_data: Vec::new(),
            }
        }

        fn written_data(&self) -> &[u8] {
            &self.write_data
        }
    }

    impl AsyncRead for MockTcpStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            if let Some(mut chunk) = this.chunks.pop_front() {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    this.chunks.push_front(chunk.split_off(n));
                }
            }
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockTcpStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.write_data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn test_router() -> Router {
        let mut router = Router::new();
        router.handle_fn("/", |response: &mut ResponseBuilder, _request: &HttpRequest| {
            response.write_header(StatusCode::Ok);
            response.write(b"home page");
        });
        router.handle_fn("/echo", |response: &mut ResponseBuilder, request: &HttpRequest| {
            response.add_header("X-Method", request.method.to_string());
            response.write(&request.body);
        });
        router.handle_fn("/whoami", |response: &mut ResponseBuilder, request: &HttpRequest| {
            response.write(request.remote_addr.as_bytes());
        });
        router
    }

    async fn exchange(stream: MockTcpStream, config: &ServerConfig) -> (Result<(), Error>, Vec<u8>) {
        let router = test_router();
        let mut conn = Connection::new(ConnectionId::from(1), stream);
        let result = HttpServer::exchange(&mut conn, &router, "10.0.0.7".to_string(), config).await;
        (result, conn.get_ref().written_data().to_vec())
    }

    #[tokio::test]
    async fn test_exchange_with_valid_request() {
        let stream = MockTcpStream::new(b"GET / HTTP/1.1\r\nhost: localhost\r\n\r\n");
        let (result, written) = exchange(stream, &ServerConfig::default()).await;

        assert!(result.is_ok());
        assert_eq!(written, b"HTTP/1.1 200\r\n\r\nhome page");
    }

    #[tokio::test]
    async fn test_exchange_with_not_found() {
        let stream = MockTcpStream::new(b"GET /nonexistent HTTP/1.1\r\n\r\n");
        let (result, written) = exchange(stream, &ServerConfig::default()).await;

        assert!(result.is_ok());
        assert_eq!(written, b"HTTP/1.1 404\r\n\r\n");
    }

    #[tokio::test]
    async fn test_routing_ignores_method() {
        for method in ["GET", "POST", "DELETE", "BREW"] {
            let raw = format!("{method} /echo HTTP/1.1\r\n\r\n");
            let (_, written) = exchange(MockTcpStream::new(raw.as_bytes()), &ServerConfig::default()).await;
            let expected = format!("HTTP/1.1 200\r\nX-Method:{method}\r\n\r\n");
            assert_eq!(written, expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_routing_is_exact() {
        for path in ["/echo/", "/ECHO", "/echo?x=1", "/ec"] {
            let raw = format!("GET {path} HTTP/1.1\r\n\r\n");
            let (_, written) = exchange(MockTcpStream::new(raw.as_bytes()), &ServerConfig::default()).await;
            assert_eq!(written, b"HTTP/1.1 404\r\n\r\n", "path {path}");
        }
    }

    #[tokio::test]
    async fn test_response_echoes_request_version() {
        let stream = MockTcpStream::new(b"GET / HTTP/1.0\r\n\r\n");
        let (_, written) = exchange(stream, &ServerConfig::default()).await;
        assert!(written.starts_with(b"HTTP/1.0 200\r\n"));

        let stream = MockTcpStream::new(b"GET / HTTP/0.9-custom\r\n\r\n");
        let (_, written) = exchange(stream, &ServerConfig::default()).await;
        assert!(written.starts_with(b"HTTP/0.9-custom 200\r\n"));
    }

    #[tokio::test]
    async fn test_exchange_with_malformed_request_writes_nothing() {
        let stream = MockTcpStream::new(b"GARBAGE\r\n\r\n");
        let (result, written) = exchange(stream, &ServerConfig::default()).await;

        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_exchange_with_empty_input_writes_nothing() {
        let stream = MockTcpStream::new(b"");
        let (result, written) = exchange(stream, &ServerConfig::default()).await;

        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_exchange_reads_fragmented_request() {
        let stream = MockTcpStream::chunked(vec![
            b"POST /echo HTT".to_vec(),
            b"P/1.1\r\nContent-Len".to_vec(),
            b"gth: 11\r\n\r\nhello".to_vec(),
            b" world".to_vec(),
        ]);
        let (result, written) = exchange(stream, &ServerConfig::default()).await;

        assert!(result.is_ok());
        assert_eq!(written, b"HTTP/1.1 200\r\nX-Method:POST\r\n\r\nhello world");
    }

    #[tokio::test]
    async fn test_exchange_reads_body_larger_than_buffer() {
        let body = "x".repeat(300);
        let raw = format!("POST /echo HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}", body.len());
        let config = ServerConfig::default().with_read_buffer_size(16);
        let (result, written) = exchange(MockTcpStream::new(raw.as_bytes()), &config).await;

        assert!(result.is_ok());
        assert!(written.ends_with(body.as_bytes()));
    }

    #[tokio::test]
    async fn test_exchange_stops_reading_once_request_is_complete() {
        let mut conn = Connection::new(
            ConnectionId::from(1),
            MockTcpStream::chunked(vec![
                b"GET / HTTP/1.1\r\n\r\n".to_vec(),
                b"never read".to_vec(),
            ]),
        );
        let data = conn.read_request(1024, 1024).await.unwrap();
        assert_eq!(data, b"GET / HTTP/1.1\r\n\r\n");

        let mut rest = [0u8; 32];
        let n = conn.read(&mut rest).await.unwrap();
        assert_eq!(&rest[..n], b"never read");
    }

    #[tokio::test]
    async fn test_exchange_stops_reading_after_bad_request_line() {
        let mut conn = Connection::new(
            ConnectionId::from(1),
            MockTcpStream::chunked(vec![
                b"GARBAGE\r\n".to_vec(),
                b"Host: never read\r\n\r\n".to_vec(),
            ]),
        );
        let result = HttpServer::exchange(&mut conn, &test_router(), String::new(), &ServerConfig::default()).await;
        assert!(matches!(result, Err(Error::ParseError(_))));
        assert!(conn.get_ref().written_data().is_empty());

        let mut rest = [0u8; 32];
        let n = conn.read(&mut rest).await.unwrap();
        assert_eq!(&rest[..n], b"Host: never read\r\n\r\n");
    }

    #[tokio::test]
    async fn test_exchange_rejects_oversized_request() {
        let raw = format!("POST /echo HTTP/1.1\r\nContent-Length: 500\r\n\r\n{}", "y".repeat(500));
        let config = ServerConfig::default()
            .with_read_buffer_size(64)
            .with_max_request_size(256);
        let (result, written) = exchange(MockTcpStream::new(raw.as_bytes()), &config).await;

        assert!(matches!(result, Err(Error::RequestTooLarge(256))));
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_exchange_passes_remote_address() {
        let stream = MockTcpStream::new(b"GET /whoami HTTP/1.1\r\n\r\n");
        let (_, written) = exchange(stream, &ServerConfig::default()).await;
        assert_eq!(written, b"HTTP/1.1 200\r\n\r\n10.0.0.7");
    }

    #[test]
    fn test_marshal_exact_bytes() {
        let mut response = ResponseBuilder::new();
        response.version("HTTP/1.1");
        response.write_header(200u16);
        response
            .header()
            .insert("X".to_string(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(response.write(b"ok"), 2);

        assert_eq!(response.marshal(), b"HTTP/1.1 200\r\nX:a,b\r\n\r\nok");
    }

    #[test]
    fn test_marshal_does_not_add_content_length() {
        let mut response = ResponseBuilder::new();
        response.write(b"some body");
        let bytes = String::from_utf8(response.marshal()).unwrap();
        assert!(!bytes.to_ascii_lowercase().contains("content-length"));
    }

    #[test]
    fn test_write_header_last_call_wins() {
        let mut response = ResponseBuilder::new();
        assert_eq!(response.status(), 200);
        response.write_header(StatusCode::Created);
        response.write_header(418u16);
        assert_eq!(response.status(), 418);
        assert_eq!(response.marshal(), b"HTTP/1.1 418\r\n\r\n");
    }

    #[test]
    fn test_status_message() {
        let mut response = ResponseBuilder::new();
        response.version("HTTP/1.0");
        response.write_status(StatusCode::NotFound);
        assert_eq!(response.marshal(), b"HTTP/1.0 404 Not Found\r\n\r\n");

        response.set_message(None);
        assert_eq!(response.marshal(), b"HTTP/1.0 404\r\n\r\n");

        // The message follows the code directly.
        response.set_message(Some(" Gone Fishing".to_string()));
        assert_eq!(response.marshal(), b"HTTP/1.0 404 Gone Fishing\r\n\r\n");
        response.set_message(Some("x".to_string()));
        assert_eq!(response.marshal(), b"HTTP/1.0 404x\r\n\r\n");
    }

    #[test]
    fn test_body_is_appended_incrementally() {
        let mut response = ResponseBuilder::new();
        response.write(b"one ");
        write!(response, "{} {}", "two", 3).unwrap();
        assert_eq!(response.body(), b"one two 3");
    }

    #[test]
    fn test_add_header_appends_values() {
        let mut response = ResponseBuilder::new();
        response.add_header("Vary", "Accept");
        response.add_header("Vary", "Origin");
        assert_eq!(response.marshal(), b"HTTP/1.1 200\r\nVary:Accept,Origin\r\n\r\n");
    }

    #[test]
    fn test_write_json() {
        #[derive(Serialize)]
        struct Status {
            ok: bool,
        }

        let mut response = ResponseBuilder::new();
        response.write_json(&Status { ok: true }).unwrap();
        assert_eq!(
            response.marshal(),
            b"HTTP/1.1 200\r\nContent-Type:application/json\r\n\r\n{\"ok\":true}"
        );
    }

    #[test]
    fn test_config_host_port() {
        let config = ServerConfig::new("0.0.0.0:8080");
        assert_eq!(config.host_port().unwrap(), ("0.0.0.0", 8080));

        for addr in ["127.0.0.1", "127.0.0.1:", "127.0.0.1:http", "127.0.0.1:70000", "1:2:3", ""] {
            let config = ServerConfig::new(addr);
            let result = config.host_port();
            assert!(matches!(result, Err(Error::InvalidAddress(_))), "address {addr:?}");
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.backlog, 20);
        assert_eq!(config.read_buffer_size, 5 * 1024);
    }

    #[tokio::test]
    async fn test_socket_bind_rejects_invalid_addresses() {
        for address in ["", "localhost", "::1", "256.1.1.1", "10.0.0", " 127.0.0.1"] {
            let result = Socket::bind(address, 0);
            assert!(matches!(result, Err(Error::InvalidAddress(_))), "address {address:?}");
        }
    }

    #[tokio::test]
    async fn test_listener_close_is_not_idempotent() {
        let socket = Socket::bind("127.0.0.1", 0).unwrap();
        assert_eq!(*socket.addr().ip(), Ipv4Addr::LOCALHOST);
        let listener = socket.listen(20).unwrap();
        let closer = listener.closer();
        assert!(!closer.is_closed());
        assert!(closer.close().is_ok());
        assert!(closer.is_closed());
        assert!(matches!(closer.close(), Err(Error::ListenerClosed)));
    }

    #[tokio::test]
    async fn test_pending_accept_observes_close() {
        let mut listener = Socket::bind("127.0.0.1", 0).unwrap().listen(20).unwrap();
        let closer = listener.closer();

        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
        time::sleep(Duration::from_millis(20)).await;
        closer.close().unwrap();

        let result = time::timeout(Duration::from_secs(5), accept).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::ListenerClosed)));
    }

    #[tokio::test]
    async fn test_accept_resolves_remote_address() {
        let mut listener = Socket::bind("127.0.0.1", 0).unwrap().listen(20).unwrap();
        let addr = listener.local_addr();

        let _client = TcpStream::connect(addr).await.unwrap();
        let conn = listener.accept().await.unwrap();
        assert_eq!(conn.remote_address().unwrap(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_active_connections_track_task_lifetime() {
        let active = ActiveConnections::new();
        let mut tasks = JoinSet::new();
        let (tx, rx) = oneshot::channel::<()>();

        active.spawn(&mut tasks, ConnectionId::from(1), async move {
            let _ = rx.await;
        });
        assert!(active.contains(ConnectionId::from(1)));
        assert_eq!(active.len(), 1);

        tx.send(()).unwrap();
        tasks.join_next().await.unwrap().unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_active_connections_abort_all() {
        let active = ActiveConnections::new();
        let mut tasks = JoinSet::new();
        active.spawn(&mut tasks, ConnectionId::from(1), std::future::pending());
        active.spawn(&mut tasks, ConnectionId::from(2), std::future::pending());

        assert_eq!(active.abort_all(), 2);
        while let Some(joined) = tasks.join_next().await {
            assert!(joined.unwrap_err().is_cancelled());
        }
        assert!(active.is_empty());
    }

    async fn start_server(router: Router) -> (SocketAddr, ShutdownHandle, JoinHandle<Result<(), Error>>) {
        init_logger();
        let server = HttpServer::bind(ServerConfig::new("127.0.0.1:0"), router).unwrap();
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.serve());
        (addr, handle, task)
    }

    async fn send(addr: SocketAddr, raw: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    async fn stop(handle: &ShutdownHandle, task: JoinHandle<Result<(), Error>>) {
        handle.shutdown().unwrap();
        let result = time::timeout(Duration::from_secs(5), task)
            .await
            .expect("serve did not return after shutdown")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_server_end_to_end() {
        let (addr, handle, task) = start_server(test_router()).await;
        assert_eq!(handle.local_addr(), addr);
        assert_eq!(handle.state(), ServerState::Listening);

        let response = send(addr, b"GET / HTTP/1.1\r\nhost: localhost\r\n\r\n").await;
        assert_eq!(response, b"HTTP/1.1 200\r\n\r\nhome page");

        let response = send(addr, b"GET /missing HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, b"HTTP/1.1 404\r\n\r\n");

        let response = send(addr, b"GET /whoami HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, b"HTTP/1.1 200\r\n\r\n127.0.0.1");

        wait_until(|| handle.active_connections() == 0).await;
        stop(&handle, task).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_malformed_request_is_dropped_silently() {
        let (addr, handle, task) = start_server(test_router()).await;

        let response = send(addr, b"NOT A VALID REQUEST LINE\r\n\r\n").await;
        assert!(response.is_empty());

        // The server keeps serving other connections.
        let response = send(addr, b"GET / HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, b"HTTP/1.1 200\r\n\r\nhome page");

        stop(&handle, task).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bad_request_line_closes_connection_without_blank_line() {
        let (addr, handle, task) = start_server(test_router()).await;

        for raw in [&b"GARBAGE\r\n"[..], &b"\r\n"[..], &b"GET / HTTP/1.1 extra\n"[..]] {
            // The write half stays open: only the server can end the exchange.
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(raw).await.unwrap();

            let mut response = Vec::new();
            let read = time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
                .await
                .expect("connection left open after a bad request line");
            match read {
                Ok(n) => assert_eq!(n, 0),
                Err(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            }
            assert!(response.is_empty());
        }

        wait_until(|| handle.active_connections() == 0).await;
        stop(&handle, task).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connections_get_their_own_response() {
        let (addr, handle, task) = start_server(test_router()).await;

        let mut clients = JoinSet::new();
        for i in 0..16 {
            clients.spawn(async move {
                let body = format!("client-{i}-{}", "z".repeat(i * 97));
                let raw = format!("POST /echo HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}", body.len());
                let response = send(addr, raw.as_bytes()).await;
                (body, response)
            });
        }

        while let Some(joined) = clients.join_next().await {
            let (body, response) = joined.unwrap();
            let expected = format!("HTTP/1.1 200\r\nX-Method:POST\r\n\r\n{body}");
            assert_eq!(String::from_utf8(response).unwrap(), expected);
        }

        stop(&handle, task).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_closes_connections_and_listener() {
        let (addr, handle, task) = start_server(test_router()).await;

        // Clients that connect and never send a request.
        let mut idle = Vec::new();
        for _ in 0..3 {
            idle.push(TcpStream::connect(addr).await.unwrap());
        }
        wait_until(|| handle.active_connections() == 3).await;

        stop(&handle, task).await;
        assert_eq!(handle.state(), ServerState::Closed);
        assert_eq!(handle.active_connections(), 0);

        for mut stream in idle {
            let mut buf = Vec::new();
            match stream.read_to_end(&mut buf).await {
                Ok(n) => assert_eq!(n, 0),
                Err(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            }
        }

        assert!(TcpStream::connect(addr).await.is_err());
        assert!(matches!(handle.shutdown(), Err(Error::NotListening)));
    }

    #[tokio::test]
    async fn test_bind_errors() {
        let result = HttpServer::bind(ServerConfig::new("localhost:8080"), Router::new());
        assert!(matches!(result, Err(Error::InvalidAddress(_))));

        let result = HttpServer::bind(ServerConfig::new(":8080"), Router::new());
        assert!(matches!(result, Err(Error::InvalidAddress(_))));

        let first = HttpServer::bind(ServerConfig::new("127.0.0.1:0"), Router::new()).unwrap();
        let taken = first.local_addr().to_string();
        let result = HttpServer::bind(ServerConfig::new(taken), Router::new());
        assert!(matches!(result, Err(Error::BindError { .. })));
    }
}
