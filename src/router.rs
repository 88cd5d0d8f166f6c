use crate::http_request::HttpRequest;
use crate::http_response::StatusCode;

use std::collections::HashMap;
use std::fmt;

/// Short-circuits a handler with an explicit status code and an empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abort(pub StatusCode);

/// What a route handler produces: a body for a 200 response, or an abort.
pub type HandlerResult = Result<String, Abort>;

/// Every route handler has this one shape; handlers that don't need the
/// request just don't read it.
pub type Handler = Box<dyn Fn(&HttpRequest) -> HandlerResult + Send + Sync + 'static>;

/// `return abort(StatusCode::Forbidden);` from inside a handler.
///
/// # Errors
///
/// Always; that is the point.
pub fn abort(status_code: StatusCode) -> HandlerResult {
    Err(Abort(status_code))
}

/// Route table keyed by exact URL path.
///
/// Built once before serving starts and only read afterwards.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Handler>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `path` to `handler`, replacing any previous binding.
    pub fn route<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&HttpRequest) -> HandlerResult + Send + Sync + 'static,
    {
        if self.routes.insert(path.to_string(), Box::new(handler)).is_some() {
            tracing::warn!(path, "route registered twice, keeping the last handler");
        }
        self
    }

    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Handler> {
        self.routes.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<_> = self.routes.keys().collect();
        paths.sort();
        f.debug_struct("Router").field("routes", &paths).finish()
    }
}
