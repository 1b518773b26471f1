//! Database module

pub mod filter;
mod schema;
mod statistics;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

/// Sums over every report of the latest day
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalStatistics {
    pub active: i64,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub last_update: DateTime<Utc>,
}

/// One location row: a region, a province within a region, or a city
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RegionStatistics {
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub active: i64,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub last_update: DateTime<Utc>,
}

/// Daily totals for the time series chart
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TimeSeriesPoint {
    pub day: NaiveDate,
    pub active: i64,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // Negative cache_size is interpreted by SQLite as KiB
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", config.url))?
            .pragma("cache_size", format!("-{}", config.cache_size_mb * 1024));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        info!(
            "Database pool opened ({}, max_connections={})",
            config.url, config.max_connections
        );
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        // Enable WAL mode so the external ingest job does not block readers
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(schema::CREATE_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_LAST_UPDATE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_LOCATION)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Round-trips a trivial query for the health endpoint
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
