use crate::http_commons::{find_header_end, Headers, HttpVersion, HttpVersionParseError, CRLF};

use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub http_method: HttpMethod,
    pub request_target: String,
    pub protocol_version: HttpVersion,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request has no header terminator")]
    Incomplete,
    #[error("request head is not valid UTF-8")]
    HeadUtf8,
    #[error("malformed request line: {0}")]
    RequestLine(String),
    #[error("unsupported HTTP method: {0}")]
    Method(String),
    #[error("unsupported HTTP protocol version: {0}")]
    ProtocolVersion(String),
    #[error("invalid header: {0}")]
    Header(String),
}

impl From<HttpMethodParseError> for RequestError {
    fn from(e: HttpMethodParseError) -> RequestError {
        RequestError::Method(e.found)
    }
}
impl From<HttpVersionParseError> for RequestError {
    fn from(e: HttpVersionParseError) -> RequestError {
        RequestError::ProtocolVersion(e.found)
    }
}

#[allow(clippy::module_name_repetitions)]
pub struct HttpRequestBuilder {
    http_request: HttpRequest,
}

impl HttpRequestBuilder {
    fn new() -> Self {
        // request with default values
        Self {
            http_request: HttpRequest {
                http_method: HttpMethod::Get,
                request_target: String::new(),
                protocol_version: HttpVersion::Http11,
                headers: Headers::new(),
                body: None,
            },
        }
    }

    #[must_use]
    pub fn build(self) -> HttpRequest {
        self.http_request
    }

    pub fn with_method(&mut self, method: HttpMethod) -> &mut Self {
        self.http_request.http_method = method;
        self
    }
    pub fn with_target(&mut self, request_target: &str) -> &mut Self {
        self.http_request.request_target = request_target.to_string();
        self
    }
    pub fn with_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.http_request.headers.insert(name, value);
        self
    }
    pub fn with_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.http_request.body = Some(body.into());
        self
    }
}

impl HttpRequest {
    #[must_use]
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::new()
    }

    /// Parses a complete HTTP request: request-line, headers, blank line and
    /// whatever follows as body.
    ///
    /// # Errors
    ///
    /// Returns a `RequestError` variant when the message is malformed.
    pub fn parse(raw: &[u8]) -> Result<HttpRequest, RequestError> {
        let head_end = find_header_end(raw).ok_or(RequestError::Incomplete)?;
        let head = std::str::from_utf8(&raw[..head_end]).map_err(|_| RequestError::HeadUtf8)?;
        let mut lines = head.split(CRLF).filter(|line| !line.is_empty());

        let request_line = lines.next().unwrap_or_default();
        let [http_method, request_target, protocol_version]: [&str; 3] = request_line
            .split_whitespace()
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| RequestError::RequestLine(request_line.to_string()))?;

        let mut builder = HttpRequest::builder();
        builder
            .with_method(http_method.parse::<HttpMethod>()?)
            .with_target(request_target);
        builder.http_request.protocol_version = protocol_version.parse::<HttpVersion>()?;

        for line in lines {
            let (name, value) =
                Headers::parse_line(line).ok_or_else(|| RequestError::Header(line.to_string()))?;
            builder.with_header(name, value);
        }

        let body = &raw[head_end..];
        if !body.is_empty() {
            builder.with_body(Bytes::copy_from_slice(body));
        }

        Ok(builder.build())
    }

    /// Whether the request carries a body that is not framed by a
    /// `Content-Length` header.
    #[must_use]
    pub fn has_unframed_body(&self) -> bool {
        let has_body = self.body.as_ref().is_some_and(|body| !body.is_empty());
        has_body && !self.headers.contains("content-length")
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.headers.get("host")
    }

    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut head = format!(
            "{} {} {}{CRLF}",
            self.http_method, self.request_target, self.protocol_version
        );
        self.headers.write_into(&mut head);
        head.push_str(CRLF);

        let body_len = self.body.as_ref().map_or(0, Bytes::len);
        let mut buf = BytesMut::with_capacity(head.len() + body_len);
        buf.extend_from_slice(head.as_bytes());
        if let Some(body) = &self.body {
            buf.extend_from_slice(body);
        }
        buf.freeze()
    }

    /// Serializes the request onto `writer`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HttpMethod {
    Get,
    Post,
    Head,
    Put,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct HttpMethodParseError {
    pub found: String,
}

impl std::str::FromStr for HttpMethod {
    type Err = HttpMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "HEAD" => Ok(Self::Head),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(HttpMethodParseError { found: s.into() }),
        }
    }
}
