use std::fmt;

pub const CRLF: &str = "\r\n";
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Index of the first byte after the blank line ending the header block.
#[must_use]
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HttpVersion {
    Http11,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HttpVersion::Http11 => write!(f, "HTTP/1.1"),
        }
    }
}

#[derive(Debug)]
pub struct HttpVersionParseError {
    pub found: String,
}

impl std::str::FromStr for HttpVersion {
    type Err = HttpVersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.1" => Ok(Self::Http11),
            _ => Err(HttpVersionParseError { found: s.into() }),
        }
    }
}

/// Header map with case-insensitive keys.
///
/// Keys are stored lower-cased; insertion order is kept so a message
/// serializes its headers in the order they were set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets `name` to `value`, replacing any previous value for that key.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        let idx = self.entries.iter().position(|(key, _)| *key == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses one `key: value` line, splitting on the first `": "`.
    pub(crate) fn parse_line(line: &str) -> Option<(&str, &str)> {
        let (key, value) = line.split_once(": ")?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some((key, value.trim()))
    }

    pub(crate) fn write_into(&self, out: &mut String) {
        for (key, value) in self.iter() {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push_str(CRLF);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain");
        headers.insert("HOST", "example.com");

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.get("Host"), Some("example.com"));
        assert_eq!(
            headers.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["content-type", "host"]
        );
    }

    #[test]
    fn test_headers_insert_replaces() {
        let mut headers = Headers::new();
        headers.insert("Server", "a");
        headers.insert("server", "b");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Server"), Some("b"));
        assert_eq!(headers.remove("SERVER"), Some("b".to_string()));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(18));
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(find_header_end(b""), None);
    }

    #[test]
    fn test_parse_header_line() {
        assert_eq!(Headers::parse_line("Host: x"), Some(("Host", "x")));
        assert_eq!(
            Headers::parse_line("Referer: http://a: b"),
            Some(("Referer", "http://a: b"))
        );
        assert_eq!(Headers::parse_line("Host:x"), None);
        assert_eq!(Headers::parse_line(": x"), None);
    }

    #[test]
    fn test_version_parse() {
        assert_eq!("HTTP/1.1".parse::<HttpVersion>().unwrap(), HttpVersion::Http11);
        assert!("HTTP/2".parse::<HttpVersion>().is_err());
        assert_eq!(HttpVersion::Http11.to_string(), "HTTP/1.1");
    }
}
