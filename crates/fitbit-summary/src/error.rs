use thiserror::Error;

/// Main error type for fitbit-summary
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Authentication failed. Check SUPABASE_SERVICE_KEY / SUPABASE_ANON_KEY.")]
    NotAuthenticated,

    #[error("Rate limited. Please wait before retrying.")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid date format: {0}. Expected YYYY-MM-DD")]
    InvalidDateFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SummaryError>;

impl SummaryError {
    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid response error from a message
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create an invalid parameter error from a message
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a database error from a message
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Whether a retry of the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SummaryError::RateLimited => true,
            SummaryError::Api { status, .. } => *status >= 500,
            SummaryError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for SummaryError {
    fn from(e: rusqlite::Error) -> Self {
        SummaryError::Database(e.to_string())
    }
}

/// Format an error for display on the command line
pub fn format_user_error(err: &SummaryError) -> String {
    match err {
        SummaryError::Config(msg) => format!("{}\nSet it in the environment or a .env file.", msg),
        other => other.to_string(),
    }
}
