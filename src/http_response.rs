use crate::http_commons::{find_header_end, Headers, HttpVersion, CRLF};

use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io::Write;
use std::time::SystemTime;

pub const SERVER_NAME: &str = concat!("relay-http/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    protocol_version: HttpVersion,
    status_code: StatusCode,
    headers: Headers,
    body: Option<Bytes>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    NotModified,
    BadRequest,
    Forbidden,
    NotFound,
    LengthRequired,
    InternalServerError,
}

impl StatusCode {
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::LengthRequired => 411,
            StatusCode::InternalServerError => 500,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::LengthRequired => "Length Required",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status code: {0}")]
pub struct UnknownStatusCode(pub u16);

impl TryFrom<u16> for StatusCode {
    type Error = UnknownStatusCode;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            200 => Ok(StatusCode::Ok),
            304 => Ok(StatusCode::NotModified),
            400 => Ok(StatusCode::BadRequest),
            403 => Ok(StatusCode::Forbidden),
            404 => Ok(StatusCode::NotFound),
            411 => Ok(StatusCode::LengthRequired),
            500 => Ok(StatusCode::InternalServerError),
            other => Err(UnknownStatusCode(other)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContentType {
    Html,
    Css,
    JavaScript,
    Json,
    TextPlain,
    Png,
    Jpeg,
    Gif,
    Svg,
    Icon,
    OctetStream,
}

impl ContentType {
    /// Content type for a file extension, `OctetStream` when unknown.
    #[must_use]
    pub fn from_extension(ext: &str) -> ContentType {
        match ext.to_ascii_lowercase().as_str() {
            "html" | "htm" => ContentType::Html,
            "css" => ContentType::Css,
            "js" | "mjs" => ContentType::JavaScript,
            "json" => ContentType::Json,
            "txt" => ContentType::TextPlain,
            "png" => ContentType::Png,
            "jpg" | "jpeg" => ContentType::Jpeg,
            "gif" => ContentType::Gif,
            "svg" => ContentType::Svg,
            "ico" => ContentType::Icon,
            _ => ContentType::OctetStream,
        }
    }

    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Html => "text/html; charset=utf-8",
            ContentType::Css => "text/css; charset=utf-8",
            ContentType::JavaScript => "text/javascript; charset=utf-8",
            ContentType::Json => "application/json",
            ContentType::TextPlain => "text/plain; charset=utf-8",
            ContentType::Png => "image/png",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Gif => "image/gif",
            ContentType::Svg => "image/svg+xml",
            ContentType::Icon => "image/x-icon",
            ContentType::OctetStream => "application/octet-stream",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("response has no header terminator")]
    Incomplete,
    #[error("response head is not valid UTF-8")]
    HeadUtf8,
    #[error("malformed status line: {0}")]
    StatusLine(String),
    #[error("unsupported HTTP protocol version: {0}")]
    ProtocolVersion(String),
    #[error(transparent)]
    Status(#[from] UnknownStatusCode),
    #[error("invalid header: {0}")]
    Header(String),
}

impl HttpResponse {
    /// New response with the default `date`, `server` and `content-type`
    /// headers and no body.
    #[must_use]
    pub fn new(status_code: StatusCode) -> Self {
        let mut headers = Headers::new();
        headers.insert("date", httpdate::fmt_http_date(SystemTime::now()));
        headers.insert("server", SERVER_NAME);
        headers.insert("content-type", ContentType::Html.mime());

        HttpResponse {
            protocol_version: HttpVersion::Http11,
            status_code,
            headers,
            body: None,
        }
    }

    /// Response carrying exactly `headers`, as read off the wire.
    #[must_use]
    pub fn from_parts(status_code: StatusCode, headers: Headers) -> Self {
        HttpResponse {
            protocol_version: HttpVersion::Http11,
            status_code,
            headers,
            body: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.set_body(body);
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.set_header("content-type", content_type.mime());
        self
    }

    /// Attaches `body`; `content-length` follows its byte length.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        let body = body.into();
        self.headers.insert("content-length", body.len().to_string());
        self.body = Some(body);
    }

    /// Detaches the body together with its `content-length`.
    pub fn take_body(&mut self) -> Option<Bytes> {
        self.headers.remove("content-length");
        self.body.take()
    }

    /// Sets a header. `content-length` is owned by [`HttpResponse::set_body`]
    /// and is left untouched here.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        if name.eq_ignore_ascii_case("content-length") {
            tracing::warn!("ignoring hand-set content-length, it follows the body");
            return;
        }
        self.headers.insert(name, value);
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    #[must_use]
    pub fn protocol_version(&self) -> HttpVersion {
        self.protocol_version
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Parses the head of a response (status line and headers), ignoring
    /// anything after the header terminator.
    ///
    /// # Errors
    ///
    /// Returns a `ResponseError` variant when the head is malformed.
    pub fn parse_head(head: &[u8]) -> Result<HttpResponse, ResponseError> {
        let head = std::str::from_utf8(head).map_err(|_| ResponseError::HeadUtf8)?;
        let mut lines = head.split(CRLF).filter(|line| !line.is_empty());

        // <version> SP <code> SP <reason>
        let status_line = lines.next().unwrap_or_default();
        let (version, status) = status_line
            .split_once(' ')
            .ok_or_else(|| ResponseError::StatusLine(status_line.to_string()))?;
        let code = status.trim().split_once(' ').map_or(status, |(code, _)| code);

        if version.trim().parse::<HttpVersion>().is_err() {
            return Err(ResponseError::ProtocolVersion(version.to_string()));
        }
        let code = code
            .trim()
            .parse::<u16>()
            .map_err(|_| ResponseError::StatusLine(status_line.to_string()))?;
        let status_code = StatusCode::try_from(code)?;

        let mut headers = Headers::new();
        for line in lines {
            let (name, value) =
                Headers::parse_line(line).ok_or_else(|| ResponseError::Header(line.to_string()))?;
            headers.insert(name, value);
        }

        Ok(HttpResponse::from_parts(status_code, headers))
    }

    /// Parses a complete response; everything after the blank line is the
    /// body.
    ///
    /// # Errors
    ///
    /// Returns a `ResponseError` variant when the message is malformed.
    pub fn parse(raw: &[u8]) -> Result<HttpResponse, ResponseError> {
        let head_end = find_header_end(raw).ok_or(ResponseError::Incomplete)?;
        let mut response = Self::parse_head(&raw[..head_end])?;

        let body = &raw[head_end..];
        if !body.is_empty() {
            // keep the wire content-length as sent
            response.body = Some(Bytes::copy_from_slice(body));
        }
        Ok(response)
    }

    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut head = format!("{} {}{CRLF}", self.protocol_version, self.status_code);
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

    /// Writes the serialized response onto `writer`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()
    }
}
