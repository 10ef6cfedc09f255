//! Failure taxonomy shared by every pipeline stage.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Stage failures. `message` is short and safe to show to end users;
/// `diagnostic` carries raw tool output for operators only.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String, too_long: bool },

    #[error("speech synthesis failed: {message}")]
    SynthesisFailure {
        message: String,
        diagnostic: Option<String>,
    },

    #[error("encoding failed: {message}")]
    EncodingFailure {
        message: String,
        diagnostic: Option<String>,
    },

    #[error("not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            too_long: false,
        }
    }

    pub fn script_too_long(chars: usize, ceiling: usize) -> Self {
        Self::InvalidInput {
            message: format!("Script is {chars} characters, exceeds the {ceiling} character limit"),
            too_long: true,
        }
    }

    pub fn synthesis(message: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self::SynthesisFailure {
            message: message.into(),
            diagnostic,
        }
    }

    pub fn encoding(message: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self::EncodingFailure {
            message: message.into(),
            diagnostic,
        }
    }

    /// Stable wire code for the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::SynthesisFailure { .. } => "SYNTHESIS_FAILURE",
            Self::EncodingFailure { .. } => "ENCODING_FAILURE",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidInput { message, .. }
            | Self::SynthesisFailure { message, .. }
            | Self::EncodingFailure { message, .. } => message.clone(),
            Self::NotFound(what) => format!("{what} not found"),
        }
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::SynthesisFailure { diagnostic, .. } | Self::EncodingFailure { diagnostic, .. } => {
                diagnostic.as_deref()
            }
            _ => None,
        }
    }
}
