pub mod config;
pub mod encoding;
pub mod http_commons;
pub mod http_request;
pub mod http_response;
pub mod origin;
pub mod proxy;
pub mod router;
pub mod static_files;
pub mod stream_parser;
pub mod thread_pool;

pub mod server;

pub use http_request::{HttpMethod, HttpRequest};
pub use http_response::{HttpResponse, StatusCode};
pub use origin::OriginHandler;
pub use proxy::ProxyHandler;
pub use router::{abort, Abort, HandlerResult, Router};
pub use server::Server;
pub use static_files::StaticResources;
