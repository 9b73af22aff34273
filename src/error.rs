//! Errors surfaced by the upload service.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Unsupported file type: {0}. Please upload .xlsx, .xls or .csv")]
    UnsupportedFileType(String),

    #[error("Unknown profile: {name}. Available: {available:?}")]
    UnknownProfile { name: String, available: Vec<String> },

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Failed to parse file: {0:#}")]
    Parse(anyhow::Error),

    #[error("File detected as empty (no rows parsed)")]
    EmptySheet,

    #[error("Too many rows: {rows} (limit {limit})")]
    TooManyRows { rows: usize, limit: usize },

    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile
            | ApiError::UnsupportedFileType(_)
            | ApiError::UnknownProfile { .. } => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Parse(_) | ApiError::EmptySheet | ApiError::TooManyRows { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::FlowNotFound(_) | ApiError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
