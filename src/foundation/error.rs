pub type Text2WorldResult<T> = Result<T, Text2WorldError>;

/// Crate-wide error type.
///
/// A detected-unsafe input is never an error; it is reported as a
/// [`SafetyVerdict`](crate::SafetyVerdict). Errors are reserved for misuse and for failures inside
/// checkers, transformers, the generator, or the encoder.
#[derive(thiserror::Error, Debug)]
pub enum Text2WorldError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("guardrail error: {0}")]
    Guardrail(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Text2WorldError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn guardrail(msg: impl Into<String>) -> Self {
        Self::Guardrail(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
