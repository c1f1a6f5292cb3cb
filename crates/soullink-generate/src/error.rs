use std::time::Duration;
use thiserror::Error;

/// Failure of a single generation attempt.
///
/// Every variant is scoped to the request that produced it; none of them
/// invalidate the strategy or the orchestrator.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// A credential or artifact path needed by this attempt is missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backend answered with a non-success status or an undecodable body.
    #[error("backend error: {0}")]
    Backend(String),

    /// No client has announced a parameter schema yet.
    #[error("parameter schema has not been loaded yet")]
    EmptySchema,

    /// The backend did not answer within the configured bound.
    #[error("backend call timed out after {} seconds", .0.as_secs_f32())]
    Timeout(Duration),
}
