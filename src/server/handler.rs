//! HTTP request handlers and routing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::parser::HttpRequest;
use crate::server::response::{ResponseBuilder, StatusCode};

/// Something that can answer a request by filling in a response.
///
/// Implemented for any `Fn(&mut ResponseBuilder, &HttpRequest)` closure.
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, response: &mut ResponseBuilder, request: &HttpRequest);
}

impl<F> Handler for F
where
    F: Fn(&mut ResponseBuilder, &HttpRequest) + Send + Sync + 'static,
{
    fn serve(&self, response: &mut ResponseBuilder, request: &HttpRequest) {
        self(response, request)
    }
}

/// Exact-path router.
///
/// One handler per path, whatever the request method. The path is compared
/// byte for byte with the request path, query string included.
#[derive(Default, Clone)]
pub struct Router {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `path`, replacing any previous handler.
    pub fn handle(&mut self, path: impl Into<String>, handler: impl Handler) -> &mut Self {
        self.routes.insert(path.into(), Arc::new(handler));
        self
    }

    /// Register a closure for `path`.
    pub fn handle_fn<F>(&mut self, path: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut ResponseBuilder, &HttpRequest) + Send + Sync + 'static,
    {
        self.handle(path, handler)
    }

    /// The registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl Handler for Router {
    fn serve(&self, response: &mut ResponseBuilder, request: &HttpRequest) {
        match self.routes.get(&request.path) {
            Some(handler) => handler.serve(response, request),
            None => response.write_header(StatusCode::NotFound),
        }
    }
}
