//! Error types for the provider.
//!
//! Every failure in a lifecycle callback is eventually surfaced to the plugin
//! host as an error diagnostic; there is no retry or partial-failure recovery.

use crate::schema::Diagnostic;
use thiserror::Error;

/// Errors that can occur inside provider callbacks.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested remote object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP client failed before a response was produced.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a status code the caller does not handle.
    #[error("Unexpected status code {status}: {body}")]
    UnexpectedStatus {
        /// The HTTP status code returned by the remote API.
        status: u16,
        /// The response body, kept for the diagnostic detail.
        body: String,
    },

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Operation not implemented for this type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// An internal provider error occurred.
    #[error("Provider error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Convert this error into the diagnostic reported to the plugin host.
    ///
    /// HTTP status errors keep the response body as the diagnostic detail so
    /// the remote API's own message is not lost.
    pub fn into_diagnostic(self) -> Diagnostic {
        match self {
            Self::UnexpectedStatus { status, body } => {
                Diagnostic::error(format!("Unexpected status code {status}")).with_detail(body)
            }
            other => Diagnostic::error(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;

    #[test]
    fn display_formats() {
        let err = ProviderError::NotFound("my-index".to_string());
        assert_eq!(format!("{}", err), "Resource not found: my-index");

        let err = ProviderError::UnknownResource("elasticstack_nope".to_string());
        assert_eq!(
            format!("{}", err),
            "Unknown resource type: elasticstack_nope"
        );

        let err = ProviderError::UnexpectedStatus {
            status: 503,
            body: "cluster unavailable".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Unexpected status code 503: cluster unavailable"
        );
    }

    #[test]
    fn status_error_keeps_body_as_detail() {
        let diag = ProviderError::UnexpectedStatus {
            status: 400,
            body: "mapper_parsing_exception".to_string(),
        }
        .into_diagnostic();

        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.summary, "Unexpected status code 400");
        assert_eq!(diag.detail, Some("mapper_parsing_exception".to_string()));
    }

    #[test]
    fn plain_error_becomes_summary() {
        let diag = ProviderError::Configuration("missing endpoint".to_string()).into_diagnostic();
        assert_eq!(diag.summary, "Configuration error: missing endpoint");
        assert!(diag.detail.is_none());
    }
}
