//! Provider error type.

use thiserror::Error;

use crate::api::ApiError;
use crate::stack::SelectError;

/// Errors raised while serving a provider request.
///
/// Handlers convert these into error diagnostics; only failures outside a
/// handler reach the host as a gRPC status.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A control-plane call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// No stack version could be selected.
    #[error(transparent)]
    Stack(#[from] SelectError),

    /// A resource operation arrived before `Configure`.
    #[error("Provider is not configured: call Configure before using resources")]
    NotConfigured,
}

impl ProviderError {
    /// The message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::AlreadyExists(msg)
            | Self::PermissionDenied(msg)
            | Self::Unavailable(msg)
            | Self::DeadlineExceeded(msg)
            | Self::FailedPrecondition(msg)
            | Self::Unimplemented(msg)
            | Self::InvalidRequest(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
            Self::Transport(err) => err.to_string(),
            Self::Api(err) => err.to_string(),
            Self::Stack(err) => err.to_string(),
            Self::NotConfigured => self.to_string(),
        }
    }

    /// Wrap an API error with the operation that failed.
    pub fn api(context: &str, err: ApiError) -> Self {
        let message = format!("{}: {}", context, err);
        match (&err, err.status_code()) {
            (_, Some(403)) => Self::PermissionDenied(message),
            (_, Some(409)) => Self::FailedPrecondition(message),
            (_, Some(429)) => Self::Unavailable(message),
            (_, Some(status)) if status >= 500 => Self::Unavailable(message),
            (_, Some(_)) => Self::InvalidRequest(message),
            (ApiError::Http(msg), None) if msg.contains("timed out") => {
                Self::DeadlineExceeded(message)
            },
            (ApiError::Http(_), None) => Self::Unavailable(message),
            (_, None) => Self::InvalidRequest(message),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        let message = err.to_string();
        match err {
            ProviderError::NotFound(_) | ProviderError::UnknownResource(_) => {
                tonic::Status::not_found(message)
            },
            ProviderError::Validation(_)
            | ProviderError::Serialization(_)
            | ProviderError::InvalidRequest(_)
            | ProviderError::Stack(_) => tonic::Status::invalid_argument(message),
            ProviderError::Configuration(_)
            | ProviderError::FailedPrecondition(_)
            | ProviderError::NotConfigured => tonic::Status::failed_precondition(message),
            ProviderError::Transport(_) | ProviderError::Unavailable(_) => {
                tonic::Status::unavailable(message)
            },
            ProviderError::AlreadyExists(_) => tonic::Status::already_exists(message),
            ProviderError::PermissionDenied(_) => tonic::Status::permission_denied(message),
            ProviderError::DeadlineExceeded(_) => tonic::Status::deadline_exceeded(message),
            ProviderError::Unimplemented(_) => tonic::Status::unimplemented(message),
            ProviderError::Api(api) => match api.status_code() {
                Some(404) => tonic::Status::not_found(message),
                Some(403) => tonic::Status::permission_denied(message),
                Some(400 | 422) => tonic::Status::invalid_argument(message),
                _ => tonic::Status::unavailable(message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_message_strips_prefix() {
        let err = ProviderError::Configuration("apikey and username are mutually exclusive".into());
        assert_eq!(err.message(), "apikey and username are mutually exclusive");
        assert_eq!(
            err.to_string(),
            "Configuration error: apikey and username are mutually exclusive"
        );
    }

    #[test]
    fn test_select_error_is_transparent() {
        let err: ProviderError = SelectError::EmptyInput.into();
        assert_eq!(err.to_string(), SelectError::EmptyInput.to_string());
        assert_eq!(tonic::Status::from(err).code(), Code::InvalidArgument);
    }

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (ProviderError::NotFound("x".into()), Code::NotFound),
            (ProviderError::UnknownResource("x".into()), Code::NotFound),
            (ProviderError::NotConfigured, Code::FailedPrecondition),
            (ProviderError::PermissionDenied("x".into()), Code::PermissionDenied),
            (ProviderError::Unimplemented("x".into()), Code::Unimplemented),
            (ProviderError::Api(ApiError::not_found("gone")), Code::NotFound),
            (ProviderError::Api(ApiError::status(500, "boom")), Code::Unavailable),
        ];
        for (err, code) in cases {
            assert_eq!(tonic::Status::from(err).code(), code);
        }
    }

    #[test]
    fn test_api_context() {
        let err = ProviderError::api("failed to delete ruleset", ApiError::status(409, "in use"));
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(err.message().starts_with("failed to delete ruleset: "));

        let err = ProviderError::api("failed to read", ApiError::status(403, "forbidden"));
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
    }
}
