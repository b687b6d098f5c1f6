//! Global error handling module for the anime tracker
//!
//! This module provides a unified error type that handles all application errors
//! and converts them to appropriate HTTP responses with consistent JSON structure.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::fetcher::FetchError;
use crate::models::ApiError;
use crate::store::StoreError;

/// Message for a page or link no title and episode could be read from
pub const EXTRACTION_FAILED: &str = "could not determine episode info";

/// Message for a link that is not a usable URL
pub const INVALID_URL: &str = "invalid URL";

/// Message for a lookup with no stored series
pub const NO_SAVED_EPISODES: &str = "no saved episodes found for this series";

/// Application-wide error type that unifies all error sources
#[derive(Debug, Error)]
pub enum AppError {
    /// Title or episode number could not be determined
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Input that is not a usable URL
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Resource not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage write or read rejected
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Page fetch failed
    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    /// Validation errors (bad request)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create an extraction error with the standard message
    pub fn extraction() -> Self {
        AppError::Extraction(EXTRACTION_FAILED.to_string())
    }

    /// Create a malformed-input error with the standard message
    pub fn invalid_url() -> Self {
        AppError::MalformedInput(INVALID_URL.to_string())
    }

    /// Create a not-found error for a series lookup
    pub fn no_saved_episodes() -> Self {
        AppError::NotFound(NO_SAVED_EPISODES.to_string())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::MalformedInput(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 422 - the input was understood but carried no episode identity
            AppError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 502 - the upstream page could not be read
            AppError::Network(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Extraction(msg)
            | AppError::MalformedInput(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Internal(msg) => msg.clone(),

            AppError::Persistence(store_err) => match store_err {
                StoreError::QuotaExceeded(_) => "Storage quota exceeded".to_string(),
                StoreError::InvalidKey(_) => "Invalid series key".to_string(),
                StoreError::Backend(_) | StoreError::Serialization(_) => {
                    "Failed to save episode data".to_string()
                }
            },

            AppError::Network(fetch_err) => match fetch_err {
                FetchError::NetworkError(msg) => format!("Failed to connect to server: {}", msg),
                FetchError::HttpError(status) => {
                    format!("Server returned error status: {}", status)
                }
                FetchError::ResponseError(msg) => format!("Failed to read response: {}", msg),
                FetchError::RateLimited => {
                    "Server is rate limiting requests, please try again later".to_string()
                }
            },
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_response = ApiError::new(self.user_message());

        HttpResponse::build(status).json(error_response)
    }
}

/// Result type alias for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
