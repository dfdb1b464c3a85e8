use clap::Parser;
use label_proxy::{
    proxy::{
        router,
        AppState,
        ProxyConfig,
    },
    telemetry::Telemetry,
};
use std::{
    net::SocketAddr,
    path::PathBuf,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A relabeling proxy for Prometheus exposition text payloads.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on
    #[arg(long = "web.listen-address", default_value = "0.0.0.0:9900")]
    listen_address: SocketAddr,
    /// Accept header prefix to be used
    #[arg(long = "accept.prefix", default_value = "")]
    accept_prefix: String,
    /// Host to proxy requests against
    #[arg(long = "proxy-host", default_value = "localhost")]
    proxy_host: String,
    /// Directory to find *.label in
    #[arg(long = "labels-dir", default_value = "/tmp/target")]
    labels_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let telemetry = Telemetry::new()?;
    let config = ProxyConfig {
        proxy_host: args.proxy_host,
        accept_prefix: args.accept_prefix,
        labels_dir: args.labels_dir,
    };
    let state = AppState::new(config.clone(), telemetry)?;

    let listener = tokio::net::TcpListener::bind(args.listen_address).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "listening");
    info!(dir = %config.labels_dir.display(), "looking for labels");
    info!("my metrics: http://{addr}/metrics");
    info!("proxied metrics: http://{addr}/<port>/metrics");
    info!(host = %config.proxy_host, "proxying to");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
