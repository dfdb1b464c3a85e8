//! The HTTP surface: a router that proxies `GET /{port}[/subpath]` to
//! `http://{proxy_host}:{port}{subpath}`, rewrites the payload, and serves
//! the proxy's own counters on `/metrics`.
use crate::{
    inject,
    overrides,
    route::parse_port_path,
    telemetry::{
        ErrorKind,
        Telemetry,
    },
};
use axum::{
    extract::{
        Path,
        Query,
        State,
    },
    http::{
        header,
        HeaderMap,
        HeaderValue,
        StatusCode,
    },
    response::{
        IntoResponse,
        Response,
    },
    routing::get,
    Router,
};
use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tracing::{
    error,
    info,
    warn,
};

/// Marker added to every proxied response.
const VIA: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Timeout for the backend fetch, so a stuck emitter cannot hold a request
/// open indefinitely.
const BACKEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Static proxy configuration, filled in from the command line.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Host the per-port backends live on.
    pub proxy_host: String,
    /// Prefix prepended to the forwarded `Accept` header.
    pub accept_prefix: String,
    /// Directory holding the `*.label` override files.
    pub labels_dir: PathBuf,
}

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ProxyConfig>,
    client: reqwest::Client,
    telemetry: Telemetry,
}

impl AppState {
    pub fn new(config: ProxyConfig, telemetry: Telemetry) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(BACKEND_TIMEOUT)
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            client,
            telemetry,
        })
    }
}

/// Failure to obtain a payload from a backend. Both variants surface to the
/// caller as 502 with the error text as the body.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to fetch backend metrics: {0}")]
    BackendUnavailable(#[from] reqwest::Error),
    #[error("backend returned status {0}")]
    BackendStatus(StatusCode),
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(own_metrics))
        .route("/*path", get(proxied))
        .with_state(state)
}

/// Fetch the raw payload from `http://{proxy_host}:{port}{subpath}`,
/// forwarding the inbound `Accept` header behind the configured prefix.
/// Returns the payload together with the backend's response headers.
async fn fetch_backend(
    state: &AppState,
    port: &str,
    subpath: &str,
    inbound: &HeaderMap,
) -> Result<(String, HeaderMap), ProxyError> {
    let url = format!("http://{}:{port}{subpath}", state.config.proxy_host);
    let accept = inbound
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let accept = format!("{}{accept}", state.config.accept_prefix);
    let mut request = state.client.get(&url);
    if !accept.is_empty() {
        request = request.header(header::ACCEPT, accept);
    }
    let response = request.send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(ProxyError::BackendStatus(status));
    }
    let headers = response.headers().clone();
    let payload = response.text().await?;
    Ok((payload, headers))
}

/// The relabeling flow for one request: route, resolve overrides, fetch,
/// inject, respond.
async fn proxied(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    inbound_headers: HeaderMap,
) -> Response {
    let telemetry = &state.telemetry;
    let Some((port, subpath)) = parse_port_path(&path) else {
        telemetry.error(ErrorKind::RouteParse);
        warn!(%path, "request path does not match <port>[/subpath]");
        return (StatusCode::NOT_FOUND, "not found\n").into_response();
    };

    let overrides = overrides::resolve(&state.config.labels_dir, &query, telemetry).await;
    match fetch_backend(&state, port, subpath, &inbound_headers).await {
        Err(err) => {
            telemetry.error(ErrorKind::BackendFetch);
            telemetry.request_served(StatusCode::BAD_GATEWAY.as_str(), port);
            warn!(%port, subpath, %err, "proxy failed");
            (StatusCode::BAD_GATEWAY, format!("# {err}\n")).into_response()
        }
        Ok((payload, backend_headers)) => {
            let rewritten = inject(&payload, &overrides);
            if rewritten.unprocessed > 0 {
                info!(%port, count = rewritten.unprocessed, "payload had unprocessable lines");
            }
            telemetry.lines_unprocessed(rewritten.unprocessed);
            telemetry.request_served("200", port);

            let mut response = (StatusCode::OK, rewritten.payload).into_response();
            let headers = response.headers_mut();
            // Pass the backend's headers through, except the ones the
            // server re-frames for the rewritten body.
            for (name, value) in backend_headers.iter() {
                if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
                    continue;
                }
                headers.insert(name.clone(), value.clone());
            }
            headers.insert(header::VIA, HeaderValue::from_static(VIA));
            response
        }
    }
}

/// The proxy's own counters, in exposition text format.
async fn own_metrics(State(state): State<AppState>) -> Response {
    match state.telemetry.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            error!(%err, "failed to encode own metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
