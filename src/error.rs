//! Errors raised by the statistics layer and their HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::web::envelope::StatisticsEnvelope;

pub type Result<T> = std::result::Result<T, StatisticsError>;

/// Message sent to clients in place of database error details
pub const QUERY_FAILED_MESSAGE: &str = "Failed to fetch statistics";

#[derive(Debug, Error)]
pub enum StatisticsError {
    /// Caller supplied a filter outside `region`, `province`, `city`
    #[error("{0}")]
    InvalidFilter(String),

    /// Query ran fine but matched no rows
    #[error("{0}")]
    EmptyResult(String),

    #[error("query execution failed: {0}")]
    QueryExecution(#[from] sqlx::Error),
}

impl StatisticsError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StatisticsError::InvalidFilter(_) => StatusCode::NOT_FOUND,
            StatisticsError::EmptyResult(_) => StatusCode::NOT_FOUND,
            StatisticsError::QueryExecution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text that is safe to hand to a client
    pub fn public_message(&self) -> String {
        match self {
            StatisticsError::QueryExecution(_) => QUERY_FAILED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for StatisticsError {
    fn into_response(self) -> Response {
        if matches!(self, StatisticsError::QueryExecution(_)) {
            error!(error = %self, "statistics query failed");
        }

        let body = StatisticsEnvelope::<()>::error(self.public_message());
        (self.status_code(), Json(body)).into_response()
    }
}
