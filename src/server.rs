use crate::http_commons::find_header_end;
use crate::http_request::HttpRequest;
use crate::http_response::{HttpResponse, StatusCode};
use crate::thread_pool::ThreadPool;

use bytes::BytesMut;
use std::error::Error;
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

const READ_CHUNK: usize = 1024;

/// Turns the raw bytes of one inbound request into the response to send.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn handle(&self, raw: &[u8]) -> HttpResponse;
}

/// One line per exchange: host, request line and final status.
pub(crate) fn access_log(status_code: StatusCode, request: Option<&HttpRequest>) {
    match request {
        Some(request) => tracing::info!(
            host = request.host().unwrap_or("-"),
            "\"{} {} {}\" {}",
            request.http_method,
            request.request_target,
            request.protocol_version,
            status_code,
        ),
        None => tracing::info!("{status_code}"),
    }
}

pub struct Server<H> {
    pub address: SocketAddr,
    pub thread_pool: ThreadPool,
    pub handler: Arc<H>,
}

impl<H: ConnectionHandler> Server<H> {
    #[must_use]
    pub fn new(address: &SocketAddr, pool_size: usize, handler: H) -> Self {
        Server {
            address: *address,
            thread_pool: ThreadPool::new(pool_size),
            handler: Arc::new(handler),
        }
    }

    /// Binds the configured address and serves it.
    ///
    /// # Errors
    ///
    /// Returns an error when binding fails or an incoming TCP connection
    /// can't be accepted
    pub fn run(&self) -> Result<(), Box<dyn Error>> {
        let listener = TcpListener::bind(self.address)?;
        self.serve(listener)
    }

    /// Serves connections accepted on `listener`, one request each.
    ///
    /// # Errors
    ///
    /// Returns an error when an incoming TCP connection can't be accepted
    pub fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn Error>> {
        tracing::info!(address = %listener.local_addr()?, "running...");

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let handler = Arc::clone(&self.handler);
                    self.thread_pool.execute(move || {
                        if let Err(e) = Self::handle_stream(stream, handler.as_ref()) {
                            tracing::warn!(error = %e, "error handling the stream");
                        }
                    });
                }
                Err(e) => {
                    return Err(format!("Error accepting the connection: {e}").into());
                }
            }
        }
        Ok(())
    }

    /// Exactly one request read, one response written, then close.
    fn handle_stream(mut stream: TcpStream, handler: &H) -> io::Result<()> {
        tracing::debug!(peer = ?stream.peer_addr().ok(), "accepted new connection");

        let raw = read_message(&mut stream)?;
        let response = handler.handle(&raw);
        response.write_to(&mut stream)?;

        // the peer may already be gone; nothing left to do either way
        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }
}

/// Reads one inbound message off `reader`.
///
/// Reads until the header terminator, then until the declared
/// `Content-Length` of body has arrived. Without a declared length, whatever
/// came in with the headers is returned as is so the caller can still see an
/// unframed body. EOF ends the message early.
///
/// # Errors
///
/// Returns the underlying I/O error.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    let header_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(buf),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    };

    let Some(content_length) = declared_length(&buf[..header_end]) else {
        return Ok(buf);
    };
    let Some(message_end) = header_end.checked_add(content_length) else {
        tracing::debug!(content_length, "declared length can't be framed; not reading a body");
        return Ok(buf);
    };

    while buf.len() < message_end {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(buf)
}

fn declared_length(head: &[u8]) -> Option<usize> {
    let head = std::str::from_utf8(head).ok()?;
    head.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
