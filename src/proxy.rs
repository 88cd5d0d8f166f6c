//! Forward proxy pipeline.
//!
//! An inbound request names its destination in an absolute target
//! (`GET http://example.com/page HTTP/1.1`) and in `Host`. The request is
//! rewritten to origin form, sent over a fresh outbound connection, and the
//! origin's reply is reassembled with [`ResponseStreamParser`] before being
//! relayed. The outbound connection never outlives one exchange.

use crate::http_request::{HttpMethod, HttpRequest};
use crate::http_response::{HttpResponse, StatusCode};
use crate::server::{access_log, ConnectionHandler};
use crate::stream_parser::{ResponseStreamParser, StreamError};

use std::io::{self, Read, Write};
use std::net::TcpStream;

pub const DEFAULT_PORT: u16 = 80;
const READ_CHUNK: usize = 1024;

/// Opens outbound connections to origin servers.
pub trait Connector: Send + Sync + 'static {
    type Stream: Read + Write;

    /// # Errors
    ///
    /// Returns the I/O error of the failed connect.
    fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        TcpStream::connect((host, port))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("request body without content-length")]
    LengthRequired,
    #[error("request has no host header")]
    MissingHost,
    #[error("invalid host header: {0}")]
    InvalidHost(String),
    #[error("connecting to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("talking to origin: {0}")]
    Io(#[from] io::Error),
    #[error("origin closed the connection before a complete response")]
    UnexpectedEof,
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ProxyError {
    /// Status relayed to the client for this failure.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::LengthRequired | ProxyError::Stream(StreamError::LengthRequired) => {
                StatusCode::LengthRequired
            }
            ProxyError::MissingHost | ProxyError::InvalidHost(_) => StatusCode::BadRequest,
            ProxyError::Connect { .. }
            | ProxyError::Io(_)
            | ProxyError::UnexpectedEof
            | ProxyError::Stream(_) => StatusCode::InternalServerError,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProxyHandler<C = TcpConnector> {
    connector: C,
}

impl ProxyHandler<TcpConnector> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(TcpConnector)
    }
}

impl<C: Connector> ProxyHandler<C> {
    #[must_use]
    pub fn with_connector(connector: C) -> Self {
        ProxyHandler { connector }
    }

    /// Relays one raw inbound message and returns the response for the
    /// client: the origin's reply, or an error status.
    #[must_use]
    pub fn handle_request(&self, raw: &[u8]) -> HttpResponse {
        let mut request = match HttpRequest::parse(raw) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "rejecting malformed proxy request");
                let response = HttpResponse::new(StatusCode::BadRequest);
                access_log(response.status_code(), None);
                return response;
            }
        };

        let response = match self.forward(&mut request) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, url = %request.request_target, "proxying failed");
                HttpResponse::new(e.status_code())
            }
        };

        access_log(response.status_code(), Some(&request));
        response
    }

    fn forward(&self, request: &mut HttpRequest) -> Result<HttpResponse, ProxyError> {
        if matches!(request.http_method, HttpMethod::Post | HttpMethod::Put)
            && !request.headers.contains("content-length")
        {
            return Err(ProxyError::LengthRequired);
        }

        let host = request.host().ok_or(ProxyError::MissingHost)?.to_string();
        let (hostname, port) = split_host(&host)?;
        request.request_target = origin_form(&request.request_target, &host);

        tracing::debug!(hostname, port, url = %request.request_target, "forwarding request");
        // `upstream` is dropped, and so closed, on every return below
        let mut upstream = self
            .connector
            .connect(hostname, port)
            .map_err(|source| ProxyError::Connect {
                host: hostname.to_string(),
                port,
                source,
            })?;
        request.write_to(&mut upstream)?;

        read_response(&mut upstream)
    }
}

impl<C: Connector> ConnectionHandler for ProxyHandler<C> {
    fn handle(&self, raw: &[u8]) -> HttpResponse {
        self.handle_request(raw)
    }
}

/// Reads from `stream` until the stream parser yields a full response.
fn read_response<R: Read>(stream: &mut R) -> Result<HttpResponse, ProxyError> {
    let mut parser = ResponseStreamParser::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Err(ProxyError::UnexpectedEof),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if let Some(response) = parser.feed(&buf[..n])? {
            tracing::debug!(bytes = parser.bytes_received(), "origin response complete");
            return Ok(response);
        }
    }
}

/// Splits a `Host` value into name and port, defaulting to port 80.
fn split_host(host: &str) -> Result<(&str, u16), ProxyError> {
    let invalid = || ProxyError::InvalidHost(host.to_string());

    // [v6]:port
    if let Some(rest) = host.strip_prefix('[') {
        let (name, after) = rest.split_once(']').ok_or_else(invalid)?;
        return match after.strip_prefix(':') {
            Some(port) => Ok((name, port.parse().map_err(|_| invalid())?)),
            None if after.is_empty() => Ok((name, DEFAULT_PORT)),
            None => Err(invalid()),
        };
    }

    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) => (name, port.parse().map_err(|_| invalid())?),
        None => (host, DEFAULT_PORT),
    };
    if name.is_empty() {
        return Err(invalid());
    }
    Ok((name, port))
}

/// Strips the scheme and host off an absolute target, leaving the path the
/// origin expects.
fn origin_form(target: &str, host: &str) -> String {
    let without_scheme = target.split_once("://").map(|(_, rest)| rest);
    let path = match without_scheme {
        Some(rest) => rest.find('/').map_or("", |idx| &rest[idx..]),
        None => target.strip_prefix(host).unwrap_or(target),
    };

    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Recorder {
        written: Arc<Mutex<Vec<u8>>>,
        targets: Arc<Mutex<Vec<(String, u16)>>>,
        closed: Arc<AtomicUsize>,
    }

    struct MockStream {
        reads: VecDeque<Vec<u8>>,
        recorder: Recorder,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.recorder.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            self.recorder.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockConnector {
        chunks: Vec<Vec<u8>>,
        recorder: Recorder,
        refuse: bool,
    }

    impl MockConnector {
        fn replying(chunks: Vec<Vec<u8>>) -> (Self, Recorder) {
            let recorder = Recorder::default();
            let connector = MockConnector {
                chunks,
                recorder: recorder.clone(),
                refuse: false,
            };
            (connector, recorder)
        }
    }

    impl Connector for MockConnector {
        type Stream = MockStream;

        fn connect(&self, host: &str, port: u16) -> io::Result<MockStream> {
            if self.refuse {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            self.recorder
                .targets
                .lock()
                .unwrap()
                .push((host.to_string(), port));
            Ok(MockStream {
                reads: self.chunks.iter().cloned().collect(),
                recorder: self.recorder.clone(),
            })
        }
    }

    fn origin_reply() -> HttpResponse {
        HttpResponse::new(StatusCode::Ok).with_body("<h1>origin</h1>")
    }

    fn chunked(bytes: &[u8], size: usize) -> Vec<Vec<u8>> {
        bytes.chunks(size).map(<[u8]>::to_vec).collect()
    }

    #[test]
    fn test_relays_reassembled_response() {
        let reply = origin_reply();
        let (connector, recorder) = MockConnector::replying(chunked(&reply.to_bytes(), 7));
        let proxy = ProxyHandler::with_connector(connector);

        let response = proxy.handle_request(
            b"GET http://example.com/index.html HTTP/1.1\r\nHost: example.com\r\n\r\n",
        );

        assert_eq!(response, reply);
        assert_eq!(
            *recorder.targets.lock().unwrap(),
            vec![("example.com".to_string(), 80)]
        );
        let sent = recorder.written.lock().unwrap().clone();
        let sent = HttpRequest::parse(&sent).unwrap();
        assert_eq!(sent.request_target, "/index.html");
        assert_eq!(sent.host(), Some("example.com"));
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_forwards_body_and_explicit_port() {
        let (connector, recorder) = MockConnector::replying(vec![origin_reply().to_bytes().to_vec()]);
        let proxy = ProxyHandler::with_connector(connector);

        let response = proxy.handle_request(
            b"POST http://localhost:8080/submit HTTP/1.1\r\nHost: localhost:8080\r\nContent-Length: 3\r\n\r\nabc",
        );

        assert_eq!(response.status_code(), StatusCode::Ok);
        assert_eq!(
            *recorder.targets.lock().unwrap(),
            vec![("localhost".to_string(), 8080)]
        );
        let sent = recorder.written.lock().unwrap().clone();
        assert!(sent.starts_with(b"POST /submit HTTP/1.1\r\n"));
        assert!(sent.ends_with(b"\r\n\r\nabc"));
    }

    #[test]
    fn test_origin_without_length_is_411() {
        let (connector, recorder) =
            MockConnector::replying(vec![b"HTTP/1.1 200 OK\r\nserver: old\r\n\r\nbody".to_vec()]);
        let proxy = ProxyHandler::with_connector(connector);

        let response =
            proxy.handle_request(b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n");

        assert_eq!(response.status_code(), StatusCode::LengthRequired);
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_and_put_need_length() {
        let (connector, recorder) = MockConnector::replying(vec![]);
        let proxy = ProxyHandler::with_connector(connector);

        for method in ["POST", "PUT"] {
            let raw = format!("{method} http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n");
            let response = proxy.handle_request(raw.as_bytes());
            assert_eq!(response.status_code(), StatusCode::LengthRequired, "{method}");
        }
        assert!(recorder.targets.lock().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_request_is_400() {
        let (connector, recorder) = MockConnector::replying(vec![]);
        let proxy = ProxyHandler::with_connector(connector);

        let response = proxy.handle_request(b"JPS http://example.com/ HTTP/1.1\r\n\r\n");
        assert_eq!(response.status_code(), StatusCode::BadRequest);

        let response = proxy.handle_request(b"GET http://example.com/ HTTP/1.1\r\n\r\n");
        assert_eq!(response.status_code(), StatusCode::BadRequest);
        assert!(recorder.targets.lock().unwrap().is_empty());
    }

    #[test]
    fn test_truncated_origin_reply_is_500_and_closed() {
        let wire = origin_reply().to_bytes();
        let (connector, recorder) = MockConnector::replying(vec![wire[..wire.len() - 3].to_vec()]);
        let proxy = ProxyHandler::with_connector(connector);

        let response =
            proxy.handle_request(b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n");

        assert_eq!(response.status_code(), StatusCode::InternalServerError);
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unreachable_origin_is_500() {
        let proxy = ProxyHandler::with_connector(MockConnector {
            chunks: vec![],
            recorder: Recorder::default(),
            refuse: true,
        });

        let response =
            proxy.handle_request(b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(response.status_code(), StatusCode::InternalServerError);
    }

    #[test]
    fn test_origin_form() {
        assert_eq!(origin_form("http://example.com/a/b?c=d", "example.com"), "/a/b?c=d");
        assert_eq!(origin_form("http://example.com", "example.com"), "/");
        assert_eq!(origin_form("example.com/a", "example.com"), "/a");
        assert_eq!(origin_form("/already", "example.com"), "/already");
    }

    #[test]
    fn test_split_host() {
        assert_eq!(split_host("example.com").unwrap(), ("example.com", 80));
        assert_eq!(split_host("example.com:8080").unwrap(), ("example.com", 8080));
        assert_eq!(split_host("[::1]:81").unwrap(), ("::1", 81));
        assert_eq!(split_host("[::1]").unwrap(), ("::1", 80));
        assert!(split_host("example.com:http").is_err());
        assert!(split_host(":80").is_err());
    }
}
