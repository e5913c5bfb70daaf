use rmcp::model::ErrorData;
use serde::Serialize;

/// One failing argument field, reported back to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum GithubAppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid parameters: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("GitHub API error: {}", upstream_message(.0))]
    GitHub(#[from] octocrab::Error),

    #[error("Figma API error: {status} - {message}")]
    Figma { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No GitHub App installations found")]
    NoInstallationsFound,

    #[error("{0}")]
    Other(String),
}

/// octocrab's own `Display` appends a backtrace; callers only want GitHub's message.
fn upstream_message(err: &octocrab::Error) -> String {
    match err {
        octocrab::Error::GitHub { source, .. } => source.message.clone(),
        other => other.to_string(),
    }
}

impl GithubAppError {
    pub fn invalid_field(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(path, message)])
    }

    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GithubAppError::Configuration(_) => "ConfigurationError",
            GithubAppError::Validation(_) => "ValidationError",
            GithubAppError::NotFound(_) => "NotFoundError",
            GithubAppError::GitHub(_) if self.is_not_found() => "NotFoundError",
            GithubAppError::GitHub(_) | GithubAppError::Figma { .. } | GithubAppError::Http(_) => {
                "UpstreamError"
            }
            GithubAppError::NoInstallationsFound => "NoInstallationsFound",
            GithubAppError::Other(_) => "InternalError",
        }
    }

    /// HTTP status reported by the upstream API, if there was one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            GithubAppError::GitHub(octocrab::Error::GitHub { source, .. }) => {
                Some(source.status_code.as_u16())
            }
            GithubAppError::Figma { status, .. } => Some(*status),
            GithubAppError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            GithubAppError::NotFound(_) => true,
            GithubAppError::GitHub(_) | GithubAppError::Figma { .. } => {
                self.upstream_status() == Some(404)
            }
            _ => false,
        }
    }

    /// Status code used by the HTTP envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            GithubAppError::Configuration(_) | GithubAppError::Other(_) => 500,
            GithubAppError::Validation(_) => 400,
            GithubAppError::NotFound(_) | GithubAppError::NoInstallationsFound => 404,
            GithubAppError::GitHub(_) | GithubAppError::Figma { .. } | GithubAppError::Http(_) => {
                self.upstream_status().unwrap_or(502)
            }
        }
    }

    pub fn to_mcp_error(&self) -> ErrorData {
        match self {
            GithubAppError::Validation(violations) => ErrorData::invalid_params(
                self.to_string(),
                Some(serde_json::json!({
                    "kind": self.kind(),
                    "violations": violations,
                })),
            ),
            _ => ErrorData::internal_error(
                self.to_string(),
                Some(serde_json::json!({
                    "kind": self.kind(),
                    "status": self.upstream_status(),
                })),
            ),
        }
    }
}
