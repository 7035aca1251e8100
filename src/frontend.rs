use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::header::{CONNECTION, UPGRADE};
use http::HeaderMap;
use tower::util::BoxCloneService;
use tower::{Service, ServiceExt};

use crate::router::Router;
use crate::{Error, Request, Response, Result};

/// A request or upgrade handler supplied by the build server.
pub type Handler = BoxCloneService<Request, Response, Error>;

/// The two capabilities the local build server exposes.
#[derive(Clone)]
pub struct BuildServer {
    on_request: Handler,
    on_upgrade: Handler,
}

impl BuildServer {
    pub fn new<R, U>(on_request: R, on_upgrade: U) -> Self
    where
        R: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        R::Future: Send + 'static,
        U: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        U::Future: Send + 'static,
    {
        Self {
            on_request: BoxCloneService::new(on_request),
            on_upgrade: BoxCloneService::new(on_upgrade),
        }
    }
}

#[derive(Clone)]
pub struct Frontend {
    router: Arc<Router>,
    build_server: BuildServer,
}

impl Frontend {
    pub fn new(router: Router, build_server: BuildServer) -> Self {
        Self {
            router: Arc::new(router),
            build_server,
        }
    }
}

impl hyper::service::Service<Request> for Frontend {
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

    fn call(&self, req: Request) -> Self::Future {
        if is_upgrade(req.headers()) {
            tracing::debug!(uri = %req.uri(), "handing upgrade to build server");
            return Box::pin(self.build_server.on_upgrade.clone().oneshot(req));
        }
        let router = self.router.clone();
        let fallback = self.build_server.on_request.clone();
        Box::pin(async move { router.route(req, fallback).await })
    }
}

pub fn is_upgrade(headers: &HeaderMap) -> bool {
    if !headers.contains_key(UPGRADE) {
        return false;
    }
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}
