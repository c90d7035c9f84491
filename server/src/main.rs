//! Static host for the WASM build of the backdrop.

use std::io;
use std::path::PathBuf;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, header},
    middleware::{self, Next},
    response::Response,
    routing,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    services::{ServeDir, ServeFile},
};
use tracing_subscriber::EnvFilter;

const DEFAULT_DIST_DIR: &str = "../dist";
const DEFAULT_PORT: &str = "8080";

const HTML_CACHE: &str = "no-cache, must-revalidate";
const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";
const REVALIDATE_CACHE: &str = "public, max-age=0, must-revalidate";

async fn healthz() -> &'static str {
    "ok"
}

fn app(dist_dir: PathBuf) -> Router {
    // Unknown paths fall back to the page shell
    let static_files =
        ServeDir::new(&dist_dir).not_found_service(ServeFile::new(dist_dir.join("index.html")));

    Router::new()
        .route("/healthz", routing::get(healthz))
        .fallback_service(static_files)
        .layer(
            ServiceBuilder::new()
                .layer(CompressionLayer::new().br(true).gzip(true))
                .layer(middleware::from_fn(cache_control)),
        )
}

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dist_dir = PathBuf::from(
        std::env::var("DIST_DIR").unwrap_or_else(|_| DEFAULT_DIST_DIR.to_string()),
    );
    if !dist_dir.join("index.html").is_file() {
        tracing::warn!("No index.html under {}; build the site first", dist_dir.display());
    }

    let port = std::env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Serving {} on http://{addr}", dist_dir.display());

    axum::serve(listener, app(dist_dir))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    tracing::info!("Shutting down");
}

async fn cache_control(req: Request<Body>, next: Next) -> Response {
    let policy = cache_policy(req.uri().path());
    let mut res = next.run(req).await;

    res.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(policy));
    res
}

/// Cache-Control value for a request path
fn cache_policy(path: &str) -> &'static str {
    if path == "/" || path.ends_with(".html") {
        HTML_CACHE
    } else if is_fingerprinted_asset(path) {
        IMMUTABLE_CACHE
    } else {
        REVALIDATE_CACHE
    }
}

/// `name.<hash>.ext` where the hash is at least 8 hex digits
fn is_fingerprinted_asset(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    let parts: Vec<&str> = file.split('.').collect();
    if parts.len() < 3 || parts[0].is_empty() {
        return false;
    }

    let hash = parts[parts.len() - 2];
    hash.len() >= 8 && hash.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprinted_assets() {
        assert!(is_fingerprinted_asset("/portfolio_backdrop.1a2b3c4d.wasm"));
        assert!(is_fingerprinted_asset("/assets/app.deadbeef00.js"));
        assert!(is_fingerprinted_asset("/vendor.min.0123abcd.css"));
        assert!(!is_fingerprinted_asset("/app.js"));
        assert!(!is_fingerprinted_asset("/app.1234.js"));
        assert!(!is_fingerprinted_asset("/app.notahexhash.js"));
        assert!(!is_fingerprinted_asset("/.deadbeef.js"));
    }

    #[test]
    fn test_cache_policy() {
        assert_eq!(cache_policy("/"), HTML_CACHE);
        assert_eq!(cache_policy("/index.html"), HTML_CACHE);
        assert_eq!(cache_policy("/app.1a2b3c4d.wasm"), IMMUTABLE_CACHE);
        assert_eq!(cache_policy("/favicon.ico"), REVALIDATE_CACHE);
        assert_eq!(cache_policy("/healthz"), REVALIDATE_CACHE);
    }
}
