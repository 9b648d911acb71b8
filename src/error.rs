//! Error types for the endpoint-ops commands.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Facts error: {0}")]
    Facts(#[from] FactsError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authentication-related errors.
///
/// Any of these aborts an operation before a state-changing request is sent.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Failed to read certificate key: {0}")]
    CertificateUnreadable(String),

    #[error("Failed to sign client assertion: {0}")]
    AssertionFailed(String),

    #[error("Token request failed: {0}")]
    TokenRequestFailed(String),

    #[error("Identity provider rejected the credential (HTTP {status}): {error}")]
    Rejected { status: u16, error: String },

    #[error("Session expired")]
    Expired,
}

/// Remote API errors.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Graph API request failed: {0}")]
    GraphRequestFailed(String),

    #[error("Failed to parse API response: {0}")]
    ParseFailed(String),

    #[error("Unauthorized (401): {body}")]
    Unauthorized { body: String },

    #[error("Forbidden (403): Insufficient permissions: {body}")]
    Forbidden { body: String },

    #[error("Not found (404): {body}")]
    NotFound { body: String },

    #[error("Rate limited (429): {body}")]
    RateLimited { body: String },

    #[error("Request failed with HTTP {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Audit query {query_id} ended with status '{status}'")]
    QueryFailed { query_id: String, status: String },

    #[error("Audit query {query_id} did not finish within {waited_seconds}s")]
    QueryTimedOut { query_id: String, waited_seconds: u64 },
}

impl ApiError {
    /// Map a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => Self::Unauthorized { body },
            403 => Self::Forbidden { body },
            404 => Self::NotFound { body },
            429 => Self::RateLimited { body },
            _ => Self::RequestFailed { status, body },
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Local instrumentation errors. Scoped to a single report section.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactsError {
    #[error("not supported on this platform")]
    Unsupported,

    #[error("command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("command '{command}' timed out after {seconds}s")]
    CommandTimedOut { command: String, seconds: u64 },

    #[error("unexpected output: {0}")]
    Parse(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Export file errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Export directory does not exist: {0}")]
    MissingDirectory(String),

    #[error("Failed to write export file {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    /// Returns a user-friendly message for the operator.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Auth(AuthError::Rejected { .. }) => {
                "Sign-in was rejected. Check tenant, application id and certificate."
            }
            Self::Auth(AuthError::CertificateUnreadable(_)) => {
                "The certificate key could not be read."
            }
            Self::Auth(AuthError::InvalidCredential(_)) => "The credential is incomplete.",
            Self::Auth(AuthError::Expired) => "The session expired. Run the command again.",
            Self::Auth(_) => "Authentication failed.",
            Self::Api(ApiError::Unauthorized { .. }) => "The access token was not accepted.",
            Self::Api(ApiError::Forbidden { .. }) => {
                "The application lacks the required API permission."
            }
            Self::Api(ApiError::NotFound { .. }) => "The target was not found.",
            Self::Api(ApiError::RateLimited { .. }) => "Too many requests. Please wait a moment.",
            Self::Api(ApiError::QueryTimedOut { .. }) => "The audit search did not finish in time.",
            Self::Api(_) => "The remote call failed. The action was not applied.",
            Self::Export(ExportError::MissingDirectory(_)) => {
                "The export directory does not exist."
            }
            Self::Export(_) => "The export file could not be written.",
            Self::Network(_) => "Network error. Check your connection.",
            Self::Config(_) => "Configuration error. Please check settings.",
            Self::InvalidArgument(_) => "A required argument is missing or empty.",
            _ => "An error occurred.",
        }
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidArgument(_) => 2,
            Self::Auth(_) => 3,
            Self::Api(_) | Self::Network(_) => 4,
            Self::Export(_) => 5,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = AppError::Auth(AuthError::Rejected {
            status: 401,
            error: "invalid_client".into(),
        });
        assert_eq!(
            err.user_message(),
            "Sign-in was rejected. Check tenant, application id and certificate."
        );

        let err = AppError::Api(ApiError::RequestFailed {
            status: 500,
            body: "boom".into(),
        });
        assert_eq!(
            err.user_message(),
            "The remote call failed. The action was not applied."
        );
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            ApiError::from_status(403, "denied".into()),
            ApiError::Forbidden { .. }
        ));
        let err = ApiError::from_status(429, "throttled by tenant policy".into());
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("throttled by tenant policy"));

        let err = ApiError::from_status(502, "bad gateway".into());
        assert_eq!(err.status(), Some(502));
        assert!(err.to_string().contains("bad gateway"));
    }

    #[test]
    fn test_exit_codes_are_distinct_per_kind() {
        let auth = AppError::Auth(AuthError::Expired).exit_code();
        let api = AppError::Api(ApiError::RateLimited { body: String::new() }).exit_code();
        let export = AppError::Export(ExportError::MissingDirectory("x".into())).exit_code();
        let config = AppError::Config("x".into()).exit_code();

        assert_eq!(auth, 3);
        assert_eq!(api, 4);
        assert_eq!(export, 5);
        assert_eq!(config, 2);
    }
}
