use crate::http_request::HttpRequest;
use crate::http_response::{ContentType, HttpResponse, StatusCode};

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The set of servable files under a resource root, keyed by URL path
/// (`/css/site.css` for `<root>/css/site.css`).
#[derive(Debug, Clone)]
pub struct StaticResources {
    root: PathBuf,
    paths: BTreeSet<String>,
}

impl StaticResources {
    /// Resources from an externally enumerated set of URL paths.
    #[must_use]
    pub fn new<I, S>(root: &Path, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StaticResources {
            root: root.to_path_buf(),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn empty(root: &Path) -> Self {
        Self::new(root, Vec::<String>::new())
    }

    /// Walks `root` recursively and records every regular file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of the first directory that can't be read.
    pub fn scan(root: &Path) -> io::Result<Self> {
        let mut paths = BTreeSet::new();
        collect_files(root, "", &mut paths)?;
        tracing::debug!(root = %root.display(), count = paths.len(), "static resources scanned");
        Ok(StaticResources {
            root: root.to_path_buf(),
            paths,
        })
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.paths.contains(url)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn file_path(&self, url: &str) -> PathBuf {
        self.root.join(url.trim_start_matches('/'))
    }

    /// Serves `request` from the resource set, honoring `If-Modified-Since`.
    ///
    /// Returns `None` when the URL is not a known resource. I/O faults while
    /// reading the file or its metadata give a 500.
    #[must_use]
    pub fn resolve(&self, request: &HttpRequest) -> Option<HttpResponse> {
        let url = request.request_target.as_str();
        if !self.contains(url) {
            return None;
        }
        let path = self.file_path(url);

        if let Some(since) = request
            .headers
            .get("if-modified-since")
            .and_then(|value| match httpdate::parse_http_date(value) {
                Ok(since) => Some(since),
                Err(e) => {
                    tracing::debug!(value, error = %e, "ignoring unparsable if-modified-since");
                    None
                }
            })
        {
            match modified_since(&path, since) {
                Ok(false) => return Some(HttpResponse::new(StatusCode::NotModified)),
                Ok(true) => {}
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "reading resource metadata");
                    return Some(HttpResponse::new(StatusCode::InternalServerError));
                }
            }
        }

        Some(Self::load(&path))
    }

    fn load(path: &Path) -> HttpResponse {
        match fs::read(path) {
            Ok(content) => {
                let content_type = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(ContentType::OctetStream, ContentType::from_extension);
                HttpResponse::new(StatusCode::Ok)
                    .with_content_type(content_type)
                    .with_body(content)
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "loading resource");
                HttpResponse::new(StatusCode::InternalServerError)
            }
        }
    }
}

/// Whether the file at `path` changed after `since`, at the one-second
/// precision of HTTP dates.
fn modified_since(path: &Path, since: SystemTime) -> io::Result<bool> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(unix_secs(modified) > unix_secs(since))
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn collect_files(dir: &Path, prefix: &str, out: &mut BTreeSet<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let url = format!("{prefix}/{}", name.to_string_lossy());

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), &url, out)?;
        } else if file_type.is_file() {
            out.insert(url);
        }
    }
    Ok(())
}
