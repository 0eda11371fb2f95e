//! Error types and handling for foxess-cloud
//!
//! The vendor API only ever fails in three ways that callers care about:
//! the key was rejected, the host could not be reached, or the API answered
//! with a non-zero `errno`. Local validation failures sit next to those.

use thiserror::Error;

/// Result type alias for foxess-cloud operations
pub type Result<T> = std::result::Result<T, FoxessError>;

/// Main error type for foxess-cloud
#[derive(Debug, Error)]
pub enum FoxessError {
    /// Rejected API key (HTTP 401, or errno 401/403)
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Transport, timeout, or HTTP failure other than 401
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Any other non-zero errno, malformed body, or rejected argument
    #[error("API error{}: {}", .code.map(|c| format!(" {c}")).unwrap_or_default(), .message)]
    Api { code: Option<i64>, message: String },

    /// Local edit validation errors (scheduler staging)
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// A coordinator refresh failed; previously published data is kept
    #[error("Refresh of {coordinator} failed: {source}")]
    RefreshFailed {
        coordinator: String,
        #[source]
        source: Box<FoxessError>,
    },
}

impl FoxessError {
    /// Create a new authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        FoxessError::Auth {
            message: message.into(),
        }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        FoxessError::Connection {
            message: message.into(),
        }
    }

    /// Create a new API error without a vendor code (client-side rejection)
    pub fn api<S: Into<String>>(message: S) -> Self {
        FoxessError::Api {
            code: None,
            message: message.into(),
        }
    }

    /// Create a new API error carrying the vendor errno
    pub fn api_code<S: Into<String>>(code: i64, message: S) -> Self {
        FoxessError::Api {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        FoxessError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        FoxessError::Config {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        FoxessError::Io {
            message: message.into(),
        }
    }

    /// Wrap a client error raised during a coordinator refresh
    pub fn refresh_failed<S: Into<String>>(coordinator: S, source: FoxessError) -> Self {
        FoxessError::RefreshFailed {
            coordinator: coordinator.into(),
            source: Box::new(source),
        }
    }

    /// Vendor errno carried by an API error, if any
    pub fn code(&self) -> Option<i64> {
        match self {
            FoxessError::Api { code, .. } => *code,
            FoxessError::RefreshFailed { source, .. } => source.code(),
            _ => None,
        }
    }

    /// True for rejected credentials, also when wrapped by a refresh failure
    pub fn is_auth(&self) -> bool {
        match self {
            FoxessError::Auth { .. } => true,
            FoxessError::RefreshFailed { source, .. } => source.is_auth(),
            _ => false,
        }
    }

    pub fn is_connection(&self) -> bool {
        match self {
            FoxessError::Connection { .. } => true,
            FoxessError::RefreshFailed { source, .. } => source.is_connection(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for FoxessError {
    fn from(err: std::io::Error) -> Self {
        FoxessError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for FoxessError {
    fn from(err: serde_yaml::Error) -> Self {
        FoxessError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FoxessError {
    fn from(err: serde_json::Error) -> Self {
        FoxessError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for FoxessError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
            return FoxessError::auth("Authentication failed");
        }
        FoxessError::connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = FoxessError::auth("bad key");
        assert!(err.is_auth());

        let err = FoxessError::connection("timeout");
        assert!(err.is_connection());

        let err = FoxessError::validation("start_hour", "missing minute");
        assert!(matches!(err, FoxessError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = FoxessError::api_code(41013, "invalid token");
        assert_eq!(err.to_string(), "API error 41013: invalid token");
        assert_eq!(err.code(), Some(41013));

        let err = FoxessError::api("dimension must be one of: year, month, day");
        assert_eq!(
            err.to_string(),
            "API error: dimension must be one of: year, month, day"
        );
        assert_eq!(err.code(), None);

        let err = FoxessError::validation("end_hour", "end_minute is required");
        assert_eq!(
            err.to_string(),
            "Validation error: end_hour - end_minute is required"
        );
    }

    #[test]
    fn test_refresh_failed_looks_through() {
        let err = FoxessError::refresh_failed("scheduler", FoxessError::auth("bad key"));
        assert!(err.is_auth());
        assert_eq!(
            err.to_string(),
            "Refresh of scheduler failed: Authentication error: bad key"
        );

        let err = FoxessError::refresh_failed("realtime", FoxessError::api_code(40257, "busy"));
        assert_eq!(err.code(), Some(40257));
        assert!(!err.is_auth());
    }
}
