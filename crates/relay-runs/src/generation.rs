use thiserror::Error;

/// Failure of an optional model-backed collaborator; callers fall back to local output.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),
    #[error("generation endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response was not valid JSON")]
    InvalidJson,
    #[error("model response did not include message content")]
    EmptyContent,
}
