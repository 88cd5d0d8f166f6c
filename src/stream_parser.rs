//! Incremental response reassembly.
//!
//! A socket hands out bytes in arbitrary pieces: the header terminator or the
//! end of the body can land anywhere, including across reads.
//! [`ResponseStreamParser`] buffers what it is fed and yields the response
//! once the header block and `Content-Length` bytes of body have arrived.
//! Timeouts and abandoning a stalled peer are the caller's business.

use crate::http_commons::find_header_end;
use crate::http_response::{HttpResponse, ResponseError};

use bytes::BytesMut;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("response carries no content-length")]
    LengthRequired,
    #[error("invalid content-length: {0}")]
    ContentLength(String),
    #[error(transparent)]
    Malformed(#[from] ResponseError),
}

#[derive(Debug)]
enum State {
    AwaitingHeaders,
    AwaitingBody {
        response: HttpResponse,
        header_len: usize,
        content_length: usize,
    },
    Complete,
}

#[derive(Debug)]
pub struct ResponseStreamParser {
    buffer: BytesMut,
    bytes_received: usize,
    state: State,
}

impl Default for ResponseStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseStreamParser {
    #[must_use]
    pub fn new() -> Self {
        ResponseStreamParser {
            buffer: BytesMut::new(),
            bytes_received: 0,
            state: State::AwaitingHeaders,
        }
    }

    #[must_use]
    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::Complete)
    }

    /// Feeds the next chunk read off the connection.
    ///
    /// Returns `Ok(Some(response))` exactly once, on the chunk that completes
    /// the message, and `Ok(None)` before that. Both the header and the body
    /// transition are evaluated within one call. Chunks fed after completion
    /// are ignored.
    ///
    /// # Errors
    ///
    /// `StreamError::LengthRequired` when the header block has no
    /// `content-length`, other variants when the head is malformed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<HttpResponse>, StreamError> {
        if self.is_complete() {
            tracing::trace!(len = chunk.len(), "ignoring bytes after complete response");
            return Ok(None);
        }

        self.bytes_received += chunk.len();
        self.buffer.extend_from_slice(chunk);

        if let State::AwaitingHeaders = self.state {
            let Some(header_len) = find_header_end(&self.buffer) else {
                return Ok(None);
            };

            let response = HttpResponse::parse_head(&self.buffer[..header_len])?;
            let content_length = match response.header("content-length") {
                None => return Err(StreamError::LengthRequired),
                Some(len) => len
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| StreamError::ContentLength(len.to_string()))?,
            };
            tracing::debug!(header_len, content_length, "response headers received");

            self.state = State::AwaitingBody {
                response,
                header_len,
                content_length,
            };
        }

        if let State::AwaitingBody {
            header_len,
            content_length,
            ..
        } = self.state
        {
            if self.bytes_received - header_len < content_length {
                return Ok(None);
            }
        }

        match std::mem::replace(&mut self.state, State::Complete) {
            State::AwaitingBody {
                mut response,
                header_len,
                content_length,
            } => {
                let mut body = self.buffer.split_off(header_len);
                body.truncate(content_length);
                response.set_body(body.freeze());
                self.buffer.clear();
                Ok(Some(response))
            }
            other => {
                self.state = other;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_response::StatusCode;

    fn sample() -> HttpResponse {
        HttpResponse::new(StatusCode::Ok).with_body("<h1>hello, stream</h1>")
    }

    #[test]
    fn test_single_chunk_completes_both_transitions() {
        let response = sample();
        let mut parser = ResponseStreamParser::new();

        let parsed = parser.feed(&response.to_bytes()).unwrap();
        assert_eq!(parsed, Some(response));
        assert!(parser.is_complete());
    }

    #[test]
    fn test_every_split_point() {
        let response = sample();
        let wire = response.to_bytes();

        for split in 1..wire.len() {
            let mut parser = ResponseStreamParser::new();
            assert_eq!(parser.feed(&wire[..split]).unwrap(), None, "split at {split}");
            assert_eq!(
                parser.feed(&wire[split..]).unwrap(),
                Some(response.clone()),
                "split at {split}"
            );
        }
    }

    #[test]
    fn test_byte_by_byte() {
        let response = sample();
        let wire = response.to_bytes();
        let mut parser = ResponseStreamParser::new();

        let (last, prefix) = wire.split_last().unwrap();
        for byte in prefix {
            assert_eq!(parser.feed(&[*byte]).unwrap(), None);
        }
        assert_eq!(parser.feed(&[*last]).unwrap(), Some(response));
        assert_eq!(parser.bytes_received(), wire.len());
    }

    #[test]
    fn test_empty_chunks_are_harmless() {
        let wire = sample().to_bytes();
        let mut parser = ResponseStreamParser::new();

        assert_eq!(parser.feed(b"").unwrap(), None);
        assert_eq!(parser.feed(&wire[..10]).unwrap(), None);
        assert_eq!(parser.feed(b"").unwrap(), None);
        assert!(parser.feed(&wire[10..]).unwrap().is_some());
        assert_eq!(parser.feed(b"trailing").unwrap(), None);
    }

    #[test]
    fn test_zero_length_body() {
        let mut parser = ResponseStreamParser::new();
        let parsed = parser
            .feed(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.body().map(|b| b.len()), Some(0));
    }

    #[test]
    fn test_surplus_bytes_are_dropped() {
        let mut parser = ResponseStreamParser::new();
        let parsed = parser
            .feed(b"HTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\nabcdef")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.body().map(|b| b.as_ref()), Some(&b"abc"[..]));
    }

    #[test]
    fn test_missing_content_length() {
        let mut parser = ResponseStreamParser::new();
        assert_eq!(parser.feed(b"HTTP/1.1 200 OK\r\nserver: x\r\n").unwrap(), None);
        assert!(matches!(
            parser.feed(b"\r\nbody").unwrap_err(),
            StreamError::LengthRequired
        ));
    }

    #[test]
    fn test_malformed_head() {
        let mut parser = ResponseStreamParser::new();
        assert!(matches!(
            parser.feed(b"HTTP/1.1 299 Odd\r\ncontent-length: 0\r\n\r\n").unwrap_err(),
            StreamError::Malformed(_)
        ));

        let mut parser = ResponseStreamParser::new();
        assert!(matches!(
            parser.feed(b"HTTP/1.1 200 OK\r\ncontent-length: ten\r\n\r\n").unwrap_err(),
            StreamError::ContentLength(_)
        ));
    }
}
