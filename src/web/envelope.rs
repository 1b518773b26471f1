//! Response envelope shared by every endpoint
//!
//! `{"status": "success" | "error", "data": ..., "error": "..."}`. A fresh
//! value is built for each response.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatisticsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsEnvelope<T> {
    pub status: Status,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> StatisticsEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Wrap a single-row result; no row becomes `EmptyResult`
pub fn single<T>(row: Option<T>, empty_message: &str) -> Result<StatisticsEnvelope<T>> {
    row.map(StatisticsEnvelope::success)
        .ok_or_else(|| StatisticsError::EmptyResult(empty_message.to_string()))
}

/// Wrap a multi-row result keeping the query's order; no rows become `EmptyResult`
pub fn many<T>(rows: Vec<T>, empty_message: &str) -> Result<StatisticsEnvelope<Vec<T>>> {
    if rows.is_empty() {
        return Err(StatisticsError::EmptyResult(empty_message.to_string()));
    }
    Ok(StatisticsEnvelope::success(rows))
}
