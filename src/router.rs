use http::Uri;
use tower::{Service, ServiceExt};
use tracing::debug;

use crate::config::ForwardingRule;
use crate::forward::Forwarder;
use crate::{Error, Request, Response, Result};

/// Sends requests matching the forwarding rule upstream and hands every
/// other request to the fallback.
#[derive(Clone)]
pub struct Router {
    rule: ForwardingRule,
    forwarder: Forwarder,
}

impl Router {
    pub fn new(rule: ForwardingRule, forwarder: Forwarder) -> Self {
        Self { rule, forwarder }
    }

    pub fn forwards(&self, uri: &Uri) -> bool {
        // path plus query, as the raw request target would read
        let target = uri.path_and_query().map(|p| p.as_str()).unwrap_or("");
        self.rule.matches(target)
    }

    pub async fn route<F>(&self, req: Request, fallback: F) -> Result<Response>
    where
        F: Service<Request, Response = Response, Error = Error>,
    {
        if self.forwards(req.uri()) {
            debug!(method = %req.method(), uri = %req.uri(), "forwarding upstream");
            Ok(self.forwarder.forward(req).await)
        } else {
            debug!(method = %req.method(), uri = %req.uri(), "delegating to build server");
            fallback.oneshot(req).await
        }
    }
}
