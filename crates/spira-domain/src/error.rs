use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
    #[error("remote service returned HTTP {status}: {body}")]
    RemoteStatus { status: u16, body: String },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}
