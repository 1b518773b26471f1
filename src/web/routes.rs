//! Statistics API routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::envelope::{self, StatisticsEnvelope};
use super::AppState;
use crate::db::filter::LocationFilter;
use crate::db::{RegionStatistics, TimeSeriesPoint, TotalStatistics};
use crate::error::Result;

const NO_DAILY_REPORTS: &str = "There are no daily reports";

type Envelope<T> = Result<Json<StatisticsEnvelope<T>>>;

/// GET /total
pub async fn total(State(state): State<Arc<AppState>>) -> Envelope<TotalStatistics> {
    let row = state.db.total_statistics().await?;
    let envelope = envelope::single(row, NO_DAILY_REPORTS)?;

    if let Some(total) = &envelope.data {
        info!(
            confirmed = total.confirmed,
            last_update = %total.last_update,
            "Total statistics fetched"
        );
    }
    Ok(Json(envelope))
}

/// GET /statistics
pub async fn world(State(state): State<Arc<AppState>>) -> Envelope<Vec<RegionStatistics>> {
    let rows = state.db.world_statistics().await?;
    info!(regions = rows.len(), "World statistics fetched");
    Ok(Json(envelope::many(rows, NO_DAILY_REPORTS)?))
}

/// GET /statistics/:region
pub async fn region(
    State(state): State<Arc<AppState>>,
    Path(region): Path<String>,
) -> Envelope<Vec<RegionStatistics>> {
    let filter = LocationFilter::from_path(&[region.as_str()])?;
    let rows = state.db.region_statistics(&filter).await?;
    info!(%region, provinces = rows.len(), "Region statistics fetched");
    Ok(Json(envelope::many(
        rows,
        &format!("There are no daily reports for {}", region),
    )?))
}

/// GET /statistics/:region/:province
pub async fn province(
    State(state): State<Arc<AppState>>,
    Path((region, province)): Path<(String, String)>,
) -> Envelope<Vec<RegionStatistics>> {
    let filter = LocationFilter::from_path(&[region.as_str(), province.as_str()])?;
    let rows = state.db.province_statistics(&filter).await?;
    info!(%region, %province, cities = rows.len(), "Province statistics fetched");
    Ok(Json(envelope::many(
        rows,
        &format!("There are no daily reports for {}, {}", province, region),
    )?))
}

/// GET /statistics/:region/:province/:city
pub async fn city(
    State(state): State<Arc<AppState>>,
    Path((region, province, city)): Path<(String, String, String)>,
) -> Envelope<Vec<RegionStatistics>> {
    let filter = LocationFilter::from_path(&[region.as_str(), province.as_str(), city.as_str()])?;
    let rows = state.db.city_statistics(&filter).await?;
    info!(%region, %province, %city, reports = rows.len(), "City statistics fetched");
    Ok(Json(envelope::many(
        rows,
        &format!("There are no daily reports for {}, {}, {}", city, province, region),
    )?))
}

/// GET /timeSeries?region=..&province=..&city=..
pub async fn time_series(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Envelope<Vec<TimeSeriesPoint>> {
    let filter = LocationFilter::from_pairs(params)?;
    let rows = state.db.time_series(&filter).await?;
    info!(days = rows.len(), "Time series fetched");
    Ok(Json(envelope::many(rows, NO_DAILY_REPORTS)?))
}

/// GET /healthz
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}
