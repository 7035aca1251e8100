use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;

pub mod config;
pub mod forward;
pub mod frontend;
pub mod listener;
pub mod local;
pub mod router;
pub mod tls;

pub use config::{Config, ForwardingRule, UpstreamTarget};
pub use forward::Forwarder;
pub use frontend::{BuildServer, Frontend};
pub use router::Router;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    #[error(transparent)]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    #[error(transparent)]
    ServerName(#[from] rustls::pki_types::InvalidDnsNameError),
    #[error(transparent)]
    Tls(#[from] rustls::Error),
    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
pub type Request = hyper::Request<Incoming>;
pub type Response = hyper::Response<BoxBody<bytes::Bytes, hyper::Error>>;

/// Renders an error and its `source()` chain, one cause per line.
pub fn report(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
