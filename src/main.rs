use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use devroute::local::LocalServer;
use devroute::{listener, tls, Config, Forwarder, Frontend, Result, Router};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Development router: `/it` and `/services/timetables` go to tplfvg.it,
/// everything else to the local build server.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Address to accept browser connections on
    #[arg(long, default_value = "127.0.0.1:8181")]
    listen: SocketAddr,

    /// Address of the local build/reload server
    #[arg(long, default_value = "127.0.0.1:8000")]
    local: SocketAddr,

    /// Give up connecting to the upstream after this many seconds
    #[arg(long)]
    connect_timeout_secs: Option<u64>,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            listen: args.listen,
            local: args.local,
            connect_timeout: args.connect_timeout_secs.map(Duration::from_secs),
            ..Config::default()
        }
    }
}

#[tokio::main]
pub async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devroute=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from(Args::parse());
    tracing::info!(
        listen = %config.listen,
        local = %config.local,
        upstream = %config.upstream.authority(),
        prefixes = ?config.rule.prefixes(),
        "starting"
    );

    let forwarder = Forwarder::new(config.upstream.clone(), tls::platform_client_config()?)
        .with_connect_timeout(config.connect_timeout);
    let router = Router::new(config.rule.clone(), forwarder);
    let frontend = Frontend::new(router, LocalServer::new(config.local).into_build_server());

    let listener = TcpListener::bind(config.listen).await?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::task::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    listener::serve(listener, frontend, shutdown).await
}
