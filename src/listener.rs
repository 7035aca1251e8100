use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::frontend::Frontend;

/// Accepts connections until `shutdown` fires. Each connection is served on
/// its own task with upgrades enabled, so a live-reload socket can outlive
/// the request that opened it.
pub async fn serve(
    listener: TcpListener,
    frontend: Frontend,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    info!(addr = %listener.local_addr()?, "accepting connections");
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = shutdown.cancelled() => {
                info!("stopped accepting connections");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);

        let service = frontend.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .preserve_header_case(true)
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                debug!(%peer, error = %err, "failed to serve connection");
            }
        });
    }
}
