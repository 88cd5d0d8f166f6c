use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::prelude::*;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ContentEncoding {
    GZip,
}

impl std::fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ContentEncoding::GZip => write!(f, "gzip"),
        }
    }
}

impl std::str::FromStr for ContentEncoding {
    type Err = String;

    fn from_str(encoding_scheme_str: &str) -> Result<Self, Self::Err> {
        match encoding_scheme_str {
            "gzip" => Ok(ContentEncoding::GZip),
            _ => Err(format!(
                "Only gzip supported. Proposed encoding scheme received: {encoding_scheme_str}"
            )),
        }
    }
}

impl ContentEncoding {
    /// Compresses `body`.
    ///
    /// # Errors
    ///
    /// Returns the encoder's I/O error.
    pub fn encode_body(&self, body: &[u8]) -> std::io::Result<Bytes> {
        match self {
            ContentEncoding::GZip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(body)?;
                Ok(Bytes::from(encoder.finish()?))
            }
        }
    }

    /// Picks a supported scheme out of an `Accept-Encoding` value.
    pub fn from_header(hdr_val: &str) -> Option<ContentEncoding> {
        // In the header: either a single scheme or a list of schemes, maybe weighted
        hdr_val
            .split(',')
            .filter_map(|s| s.split(';').next())
            .map(str::trim)
            .find_map(|s| s.parse::<ContentEncoding>().ok())
    }
}
