//! Origin request pipeline: parse, reject unframed bodies, then dispatch to
//! a route, a static resource, or 404.

use crate::encoding::ContentEncoding;
use crate::http_request::HttpRequest;
use crate::http_response::{HttpResponse, StatusCode};
use crate::router::{Abort, Handler, Router};
use crate::server::{access_log, ConnectionHandler};
use crate::static_files::StaticResources;

use std::panic::{self, AssertUnwindSafe};

#[derive(Debug)]
pub struct OriginHandler {
    router: Router,
    resources: StaticResources,
}

impl OriginHandler {
    #[must_use]
    pub fn new(router: Router, resources: StaticResources) -> Self {
        OriginHandler { router, resources }
    }

    /// Turns one raw inbound message into the response to send back.
    #[must_use]
    pub fn handle_request(&self, raw: &[u8]) -> HttpResponse {
        let request = match HttpRequest::parse(raw) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "rejecting malformed request");
                let response = HttpResponse::new(StatusCode::BadRequest);
                access_log(response.status_code(), None);
                return response;
            }
        };

        let response = if request.has_unframed_body() {
            HttpResponse::new(StatusCode::LengthRequired)
        } else {
            let response = self.dispatch(&request);
            Self::negotiate_encoding(&request, response)
        };

        access_log(response.status_code(), Some(&request));
        response
    }

    fn dispatch(&self, request: &HttpRequest) -> HttpResponse {
        if let Some(handler) = self.router.lookup(&request.request_target) {
            return Self::invoke(handler, request);
        }
        if let Some(response) = self.resources.resolve(request) {
            return response;
        }
        HttpResponse::new(StatusCode::NotFound)
    }

    /// Runs a route handler. A panicking handler is contained here and
    /// answered with a 500.
    fn invoke(handler: &Handler, request: &HttpRequest) -> HttpResponse {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(request))) {
            Ok(Ok(body)) => HttpResponse::new(StatusCode::Ok).with_body(body),
            Ok(Err(Abort(status_code))) => HttpResponse::new(status_code),
            Err(_) => {
                tracing::error!(url = %request.request_target, "route handler panicked");
                HttpResponse::new(StatusCode::InternalServerError)
            }
        }
    }

    fn negotiate_encoding(request: &HttpRequest, mut response: HttpResponse) -> HttpResponse {
        let Some(encoding) = request
            .headers
            .get("accept-encoding")
            .and_then(ContentEncoding::from_header)
        else {
            return response;
        };
        if response.status_code() != StatusCode::Ok {
            return response;
        }

        if let Some(body) = response.take_body() {
            match encoding.encode_body(&body) {
                Ok(encoded) => {
                    response.set_header("content-encoding", encoding.to_string());
                    response.set_body(encoded);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "compression failed, sending identity body");
                    response.set_body(body);
                }
            }
        }
        response
    }
}

impl ConnectionHandler for OriginHandler {
    fn handle(&self, raw: &[u8]) -> HttpResponse {
        self.handle_request(raw)
    }
}
