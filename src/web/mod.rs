//! Web server module

pub mod envelope;
mod middleware;
mod routes;

use anyhow::Result;
use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use envelope::StatisticsEnvelope;
use middleware::RequestLoggingLayer;

pub struct AppState {
    pub db: Database,
}

/// Handler for all unknown paths
async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(StatisticsEnvelope::<()>::error("Not found")),
    )
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/total", get(routes::total))
        .route("/statistics", get(routes::world))
        .route("/statistics/:region", get(routes::region))
        .route("/statistics/:region/:province", get(routes::province))
        .route("/statistics/:region/:province/:city", get(routes::city))
        .route("/timeSeries", get(routes::time_series))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

pub fn router(db: Database, allowed_origins: &[String]) -> Router {
    let state = Arc::new(AppState { db });

    Router::new()
        .nest("/api/v1", api_routes())
        .route("/healthz", get(routes::health))
        .fallback(not_found)
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(RequestLoggingLayer::new())
}

pub async fn start_server(config: &Config, db: Database) -> Result<()> {
    let app = router(db, &config.server.allowed_origins);

    let addr = config.listen_addr();
    info!("Statistics API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
