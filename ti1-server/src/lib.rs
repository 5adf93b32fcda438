use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use ti1_core::{Config, QueryExecutor};
use ti1_postgres::PostgresExecutor;
use ti1_restlette::build_restlette_router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Build the full Axum application over `executor`.
pub fn build_app(executor: Arc<dyn QueryExecutor>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    build_restlette_router(executor)
        .layer(middleware::from_fn(log_request))
        .layer(cors)
}

/// Connect the pool and serve until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let executor = Arc::new(PostgresExecutor::connect(&config.database, &config.pool).await?);
    let app = build_app(executor.clone());

    let port = config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("ti1 listening on port {port}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    executor.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer);

    let started = Instant::now();
    let response = next.run(req).await;
    info!(
        "{method} {uri} from {ip} - {} [{:?}]",
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

/// `X-Forwarded-For` as sent, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());
    match (forwarded, peer) {
        (Some(forwarded), _) => forwarded.to_string(),
        (None, Some(addr)) => addr.to_string(),
        (None, None) => "unknown".to_string(),
    }
}
