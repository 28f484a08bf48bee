//! Error types for report generation

use std::fmt;

/// Result type for report operations
pub type Result<T> = std::result::Result<T, ReportError>;

/// Which credential a request was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Completion,
    Search,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Completion => write!(f, "LLM API key"),
            CredentialKind::Search => write!(f, "search API key"),
        }
    }
}

/// Error types for the report pipeline
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Detected locally, before any network call
    #[error("Missing credentials: {}", join_kinds(.0))]
    MissingCredential(Vec<CredentialKind>),

    /// Transport failure talking to an upstream API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream API answered with a non-success status
    #[error("{service} API request failed with status {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Completion response carried no usable text
    #[error("Completion API returned no content")]
    EmptyCompletion,

    /// Prompt template failed to render
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),
}

impl ReportError {
    /// Missing-credential errors are the caller's fault; everything else is upstream.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ReportError::MissingCredential(_)
                | ReportError::UnknownProvider(_)
                | ReportError::UnknownFormat(_)
        )
    }
}

fn join_kinds(kinds: &[CredentialKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
