use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST};
use http::uri::PathAndQuery;
use http::{HeaderValue, StatusCode, Uri};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::client::conn::http1::Builder as Http1Client;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::config::UpstreamTarget;
use crate::{Error, Result};

#[derive(Clone)]
pub struct Forwarder {
    target: UpstreamTarget,
    connector: TlsConnector,
    connect_timeout: Option<Duration>,
}

impl Forwarder {
    pub fn new(target: UpstreamTarget, tls: Arc<ClientConfig>) -> Self {
        Self {
            target,
            connector: TlsConnector::from(tls),
            connect_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Always yields a response: the upstream's, or a 503 describing why the
    /// exchange could not be completed.
    pub async fn forward<B>(&self, req: hyper::Request<B>) -> crate::Response
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        match self.exchange(req).await {
            Ok(resp) => {
                debug!(%method, %path, status = resp.status().as_u16(), "relaying upstream response");
                resp
            }
            Err(err) => {
                warn!(%method, %path, upstream = %self.target.authority(), error = %err, "upstream exchange failed");
                self.failure_response(&err)
            }
        }
    }

    async fn exchange<B>(&self, mut req: hyper::Request<B>) -> Result<crate::Response>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = req
            .uri()
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        *req.uri_mut() = Uri::from(path);
        req.headers_mut()
            .insert(HOST, HeaderValue::from_str(&self.target.authority())?);

        let stream = self.connect().await?;
        let (mut sender, conn) = Http1Client::new()
            .preserve_header_case(true)
            .handshake(TokioIo::new(stream))
            .await?;

        tokio::task::spawn(async move {
            if let Err(err) = conn.await {
                debug!(error = %err, "upstream connection closed with error");
            }
        });

        let resp = sender.send_request(req).await?;
        // Status and headers are already on their way to the client, so a
        // body error can only abort the inbound connection.
        Ok(resp.map(|body| {
            body.map_err(|err| {
                warn!(error = %err, "upstream body failed mid-stream");
                err
            })
            .boxed()
        }))
    }

    async fn connect(&self) -> Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(self.target.host().to_owned())?;
        let handshake = async {
            let tcp = TcpStream::connect((self.target.host(), self.target.port())).await?;
            let tls = self.connector.connect(server_name, tcp).await?;
            Ok::<_, Error>(tls)
        };
        match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, handshake)
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => handshake.await,
        }
    }

    fn failure_response(&self, err: &Error) -> crate::Response {
        let body = format!(
            "Failed to proxy to {}.\n\n{}",
            self.target.host(),
            crate::report(err)
        );
        let mut resp = hyper::Response::new(full(body));
        *resp.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        resp.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        resp
    }
}

pub(crate) fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into()).map_err(|x| match x {}).boxed()
}
