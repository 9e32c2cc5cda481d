/// Text-generation boundary: one prompt in, one answer out.
pub mod gemini;

use thiserror::Error;

/// Failure kinds of the downstream generator.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generator rejected credentials: {0}")]
    Auth(String),

    #[error("generator quota exhausted: {0}")]
    Quota(String),

    #[error("generator unreachable: {0}")]
    Network(String),

    #[error("generator returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("generator response had no text: {0}")]
    InvalidResponse(String),
}

/// Trait for text-completion backends.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
