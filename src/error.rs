/// Unified error types for the wallpaper gallery
use thiserror::Error;

/// Errors raised by a data gateway call
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Backend unreachable (network failure, no backend configured)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend answered but refused the request
    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response body did not match the expected row shape
    #[error("Failed to decode backend response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether the failure is a transport/availability failure
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                GatewayError::Unavailable(e.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                GatewayError::Decode(e.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => GatewayError::Rejected {
                status: 409,
                message: db.message().to_string(),
            },
            other => GatewayError::Rejected {
                status: 400,
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            GatewayError::Rejected {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            GatewayError::Unavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Decode(e.to_string())
    }
}

/// Main error type for the gallery
#[derive(Error, Debug)]
pub enum GalleryError {
    /// Data gateway errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Asset download errors
    #[error("Download failed: {0}")]
    Download(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database setup errors (pool creation, migrations)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type alias for gallery operations
pub type GalleryResult<T> = Result<T, GalleryError>;
