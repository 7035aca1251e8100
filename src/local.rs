use std::net::SocketAddr;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use http_body_util::BodyExt;
use hyper::client::conn::http1::{Builder as Http1Client, SendRequest};
use hyper::body::Incoming;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower::service_fn;
use tracing::{debug, warn};

use crate::forward::full;
use crate::frontend::BuildServer;
use crate::{Request, Response, Result};

/// Relays requests and upgrades to a build server on a local port.
#[derive(Debug, Clone, Copy)]
pub struct LocalServer {
    addr: SocketAddr,
}

impl LocalServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn into_build_server(self) -> BuildServer {
        BuildServer::new(
            service_fn(move |req| self.request(req)),
            service_fn(move |req| self.upgrade(req)),
        )
    }

    pub async fn request(self, req: Request) -> Result<Response> {
        let mut sender = match self.connect(false).await {
            Ok(sender) => sender,
            Err(err) => return Ok(self.unavailable(err)),
        };
        match sender.send_request(req).await {
            Ok(resp) => Ok(resp.map(|body| body.boxed())),
            Err(err) => Ok(self.unavailable(err.into())),
        }
    }

    pub async fn upgrade(self, mut req: Request) -> Result<Response> {
        let inbound = hyper::upgrade::on(&mut req);
        let mut sender = match self.connect(true).await {
            Ok(sender) => sender,
            Err(err) => return Ok(self.unavailable(err)),
        };
        let mut resp = match sender.send_request(req).await {
            Ok(resp) => resp,
            Err(err) => return Ok(self.unavailable(err.into())),
        };

        if resp.status() == StatusCode::SWITCHING_PROTOCOLS {
            let outbound = hyper::upgrade::on(&mut resp);
            tokio::task::spawn(async move {
                // Both sides only finish upgrading once the 101 has reached the client
                match tokio::try_join!(inbound, outbound) {
                    Ok((client, server)) => tunnel(client, server).await,
                    Err(err) => warn!(error = %err, "upgrade failed"),
                }
            });
        }
        Ok(resp.map(|body| body.boxed()))
    }

    async fn connect(&self, upgrades: bool) -> Result<SendRequest<Incoming>> {
        let stream = TcpStream::connect(self.addr).await?;
        let (sender, conn) = Http1Client::new()
            .preserve_header_case(true)
            .handshake(TokioIo::new(stream))
            .await?;

        let addr = self.addr;
        tokio::task::spawn(async move {
            let result = if upgrades {
                conn.with_upgrades().await
            } else {
                conn.await
            };
            if let Err(err) = result {
                debug!(%addr, error = %err, "build server connection failed");
            }
        });
        Ok(sender)
    }

    fn unavailable(&self, err: crate::Error) -> Response {
        warn!(addr = %self.addr, error = %err, "build server unavailable");
        let mut resp = hyper::Response::new(full(format!(
            "Build server at {} is unavailable.\n\n{}",
            self.addr,
            crate::report(&err)
        )));
        *resp.status_mut() = StatusCode::BAD_GATEWAY;
        resp.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        resp
    }
}

async fn tunnel(client: Upgraded, server: Upgraded) {
    let mut client = TokioIo::new(client);
    let mut server = TokioIo::new(server);
    match tokio::io::copy_bidirectional(&mut client, &mut server).await {
        Ok((up_bytes, down_bytes)) => {
            debug!(up_bytes, down_bytes, "upgraded connection closed");
        }
        Err(err) => {
            debug!(error = %err, "tunnel error");
        }
    }
}
