//! Custom error types for citemap.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, CitemapError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for citemap operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum CitemapError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external service
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External service returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message from the service
        message: String,
    },

    /// CAPTCHA detected on a Scholar page
    #[error("CAPTCHA detected, please refresh cookies")]
    Captcha,

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Map template rendering error
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using `CitemapError`
pub type Result<T> = std::result::Result<T, CitemapError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| CitemapError::Parse(msg.to_string()))
    }
}
