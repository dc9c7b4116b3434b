//! Error types for the light-curve federation engine.
//!
//! Every fault carries an [`ErrorContext`] describing where it happened so the
//! HTTP layer and the logs can report it without re-deriving state.

use std::fmt;

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;

/// Structured context for federation errors.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation being performed (e.g., "fetch_summaries", "parse_radius")
    pub operation: Option<String>,
    /// The data release involved, if any
    pub release: Option<String>,
    /// The object identifier involved, if any
    pub object_id: Option<String>,
    /// Additional details about the error
    pub details: Option<String>,
    /// Whether this error is retryable
    pub retryable: bool,
}

impl ErrorContext {
    /// Create a new error context with an operation name.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    /// Set the data release.
    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    /// Set the object identifier.
    pub fn with_object_id(mut self, id: impl ToString) -> Self {
        self.object_id = Some(id.to_string());
        self
    }

    /// Set additional details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Mark this error as retryable.
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(ref release) = self.release {
            parts.push(format!("release={}", release));
        }
        if let Some(ref id) = self.object_id {
            parts.push(format!("oid={}", id));
        }
        if let Some(ref details) = self.details {
            parts.push(format!("details={}", details));
        }
        if self.retryable {
            parts.push("retryable=true".to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Error type for federation operations.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// Bad user input. Never retried, surfaced as a client error.
    #[error("Invalid query parameter: {message} {context}")]
    InvalidQueryParameter {
        message: String,
        context: ErrorContext,
    },

    /// The requested data release is not in the catalogue.
    #[error("Unknown data release: {release} {context}")]
    UnknownRelease {
        release: String,
        context: ErrorContext,
    },

    /// A coordinate returned by a backend does not follow the wire grammar.
    #[error("Malformed coordinate: {message} {context}")]
    MalformedCoordinate {
        message: String,
        context: ErrorContext,
    },

    /// Independent queries against the same release disagree.
    #[error("Internal inconsistency: {message} {context}")]
    InternalInconsistency {
        message: String,
        context: ErrorContext,
    },

    /// The backend cannot be reached.
    #[error("Backend unavailable: {message} {context}")]
    BackendUnavailable {
        message: String,
        context: ErrorContext,
    },

    /// Query execution failed on the backend.
    #[error("Query error: {message} {context}")]
    QueryError {
        message: String,
        context: ErrorContext,
    },

    /// The request exceeded its deadline.
    #[error("Timeout error: {message} {context}")]
    TimeoutError {
        message: String,
        context: ErrorContext,
    },

    /// Configuration or initialization error.
    #[error("Configuration error: {message} {context}")]
    ConfigurationError {
        message: String,
        context: ErrorContext,
    },
}

impl FederationError {
    /// Create an invalid query parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidQueryParameter {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create an unknown release error.
    pub fn unknown_release(release: impl Into<String>) -> Self {
        Self::UnknownRelease {
            release: release.into(),
            context: ErrorContext::new("resolve_release"),
        }
    }

    /// Create a malformed coordinate error.
    pub fn malformed_coordinate(message: impl Into<String>) -> Self {
        Self::MalformedCoordinate {
            message: message.into(),
            context: ErrorContext::new("decode_coordinate"),
        }
    }

    /// Create an internal inconsistency error.
    pub fn inconsistency(message: impl Into<String>) -> Self {
        Self::InternalInconsistency {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create an internal inconsistency error with context.
    pub fn inconsistency_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::InternalInconsistency {
            message: message.into(),
            context,
        }
    }

    /// Create a retryable backend-unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    /// Create a backend-unavailable error with full context.
    pub fn unavailable_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
            context,
        }
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::QueryError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create a query error with context.
    pub fn query_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::QueryError {
            message: message.into(),
            context,
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::TimeoutError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BackendUnavailable { context, .. } => context.retryable,
            Self::QueryError { context, .. } => context.retryable,
            _ => false,
        }
    }

    /// Whether the caller, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidQueryParameter { .. } | Self::UnknownRelease { .. }
        )
    }

    /// Get the error context.
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::InvalidQueryParameter { context, .. }
            | Self::UnknownRelease { context, .. }
            | Self::MalformedCoordinate { context, .. }
            | Self::InternalInconsistency { context, .. }
            | Self::BackendUnavailable { context, .. }
            | Self::QueryError { context, .. }
            | Self::TimeoutError { context, .. }
            | Self::ConfigurationError { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::InvalidQueryParameter { context, .. }
            | Self::UnknownRelease { context, .. }
            | Self::MalformedCoordinate { context, .. }
            | Self::InternalInconsistency { context, .. }
            | Self::BackendUnavailable { context, .. }
            | Self::QueryError { context, .. }
            | Self::TimeoutError { context, .. }
            | Self::ConfigurationError { context, .. } => context,
        }
    }

    /// Add or update the operation in the error context.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Add or update the release in the error context.
    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.context_mut().release = Some(release.into());
        self
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::result::Error> for FederationError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(kind, info) => {
                let message = info.message().to_string();
                let context =
                    ErrorContext::default().with_details(format!("db_error_kind={:?}", kind));

                // Serialization failures clear up on retry
                let context = if matches!(
                    kind,
                    diesel::result::DatabaseErrorKind::SerializationFailure
                ) {
                    context.retryable()
                } else {
                    context
                };

                FederationError::QueryError { message, context }
            }
            diesel::result::Error::DeserializationError(e) => {
                FederationError::query(format!("Deserialization error: {}", e))
            }
            other => FederationError::query(other.to_string()),
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::r2d2::PoolError> for FederationError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        FederationError::unavailable_with_context(
            err.to_string(),
            ErrorContext::default()
                .with_details("pool_error")
                .retryable(),
        )
    }
}

#[cfg(feature = "clickhouse-repo")]
impl From<reqwest::Error> for FederationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            FederationError::unavailable_with_context(
                err.to_string(),
                ErrorContext::default()
                    .with_details("http_connect")
                    .retryable(),
            )
        } else {
            FederationError::query(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let ctx = ErrorContext::new("fetch_summaries")
            .with_release("dr8")
            .with_object_id(830202400008402u64)
            .retryable();
        let display = ctx.to_string();
        assert!(display.contains("operation=fetch_summaries"));
        assert!(display.contains("release=dr8"));
        assert!(display.contains("oid=830202400008402"));
        assert!(display.contains("retryable=true"));
    }

    #[test]
    fn test_client_errors() {
        assert!(FederationError::invalid_parameter("bad ra").is_client_error());
        assert!(FederationError::unknown_release("dr99").is_client_error());
        assert!(!FederationError::inconsistency("skew").is_client_error());
        assert!(!FederationError::malformed_coordinate("(1,").is_client_error());
    }

    #[test]
    fn test_only_unavailable_is_retryable_by_default() {
        assert!(FederationError::unavailable("refused").is_retryable());
        assert!(!FederationError::query("syntax").is_retryable());
        assert!(!FederationError::inconsistency("skew").is_retryable());
        assert!(!FederationError::timeout("slow").is_retryable());
    }

    #[test]
    fn test_with_operation_overrides_context() {
        let err = FederationError::unknown_release("dr42").with_operation("resolve");
        assert_eq!(err.context().operation.as_deref(), Some("resolve"));
        assert!(err.to_string().contains("dr42"));
    }
}
