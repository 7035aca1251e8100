//! Mock upstream and build servers shared by the integration tests.
#![allow(dead_code)]

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use devroute::{BuildServer, Forwarder, ForwardingRule, Frontend, Router, UpstreamTarget};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame, Incoming};
use hyper::client::conn::http1 as client_http1;
use hyper::server::conn::http1 as server_http1;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

pub fn text(status: u16, body: impl Into<Bytes>) -> devroute::Response {
    let mut resp = Response::new(Full::new(body.into()).map_err(|x| match x {}).boxed());
    *resp.status_mut() = status.try_into().unwrap();
    resp
}

pub struct TlsUpstream {
    pub port: u16,
    pub hits: Arc<AtomicUsize>,
    pub client_config: Arc<ClientConfig>,
}

impl TlsUpstream {
    pub fn target(&self) -> UpstreamTarget {
        UpstreamTarget::new("localhost", self.port)
    }

    pub fn forwarder(&self) -> Forwarder {
        Forwarder::new(self.target(), self.client_config.clone())
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn tls_pair() -> (TlsAcceptor, Arc<ClientConfig>) {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = CertificateDer::from(cert.serialize_der().unwrap());
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let server = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der)
        .unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(cert_der).unwrap();
    let client = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();

    (
        TlsAcceptor::from(Arc::new(server)),
        Arc::new(devroute::tls::with_http1_alpn(client)),
    )
}

/// HTTPS server on a random port answering every request with `handler`.
pub async fn start_tls_upstream<F, Fut>(handler: F) -> TlsUpstream
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = devroute::Response> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (acceptor, client_config) = tls_pair();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let handler = handler.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let Ok(tls) = acceptor.accept(stream).await else {
                    return;
                };
                let service = hyper::service::service_fn(move |req| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let fut = handler(req);
                    async move { Ok::<_, Infallible>(fut.await) }
                });
                let _ = server_http1::Builder::new()
                    .serve_connection(TokioIo::new(tls), service)
                    .await;
            });
        }
    });

    TlsUpstream {
        port,
        hits,
        client_config,
    }
}

/// HTTPS server that reads the request head, writes `raw` verbatim and
/// drops the connection.
pub async fn start_raw_tls_upstream(raw: &'static [u8]) -> TlsUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (acceptor, client_config) = tls_pair();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(stream).await else {
                    return;
                };
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match tls.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tls.write_all(raw).await;
                let _ = tls.flush().await;
            });
        }
    });

    TlsUpstream {
        port,
        hits,
        client_config,
    }
}

#[derive(Clone, Default)]
pub struct Calls {
    pub requests: Arc<AtomicUsize>,
    pub upgrades: Arc<AtomicUsize>,
}

impl Calls {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn upgrades(&self) -> usize {
        self.upgrades.load(Ordering::SeqCst)
    }
}

/// Build server stand-in that answers `local:<path>` and `upgrade:<path>`.
pub fn counting_build_server() -> (BuildServer, Calls) {
    let calls = Calls::default();
    let requests = calls.requests.clone();
    let upgrades = calls.upgrades.clone();
    let build_server = BuildServer::new(
        tower::service_fn(move |req: devroute::Request| {
            requests.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, devroute::Error>(text(200, format!("local:{}", req.uri().path()))) }
        }),
        tower::service_fn(move |req: devroute::Request| {
            upgrades.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, devroute::Error>(text(200, format!("upgrade:{}", req.uri().path()))) }
        }),
    );
    (build_server, calls)
}

pub struct RunningFrontend {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Drop for RunningFrontend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn start_frontend(forwarder: Forwarder, build_server: BuildServer) -> RunningFrontend {
    let router = Router::new(ForwardingRule::default(), forwarder);
    let frontend = Frontend::new(router, build_server);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(devroute::listener::serve(listener, frontend, shutdown.clone()));
    RunningFrontend { addr, shutdown }
}

/// Sends one request on a fresh connection.
pub async fn send<B>(addr: SocketAddr, req: Request<B>) -> Response<Incoming>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = client_http1::handshake(TokioIo::new(stream)).await.unwrap();
    tokio::spawn(async move {
        let _ = conn.with_upgrades().await;
    });
    sender.send_request(req).await.unwrap()
}

pub async fn body_string(resp: Response<Incoming>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn get(uri: &str) -> Request<Full<Bytes>> {
    Request::get(uri)
        .header("host", "localhost:8181")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Body fed chunk by chunk from a channel; ends when the sender is dropped.
pub struct ChannelBody {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelBody {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    pub fn boxed_response(self) -> devroute::Response {
        Response::new(self.map_err(|x| match x {}).boxed())
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        self.rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|data| Ok(Frame::data(data))))
    }
}
