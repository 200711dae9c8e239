use std::error::Error as StdError;

use thiserror::Error;

/// Any failure while tokenizing or parsing, tagged with `source:line:column`.
#[derive(Debug, Error)]
#[error("{position}: {message}")]
pub struct ParseError {
    position: String,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ParseError {
    pub(crate) fn new(position: String, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn with_source(
        position: String,
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            position,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn position(&self) -> &str {
        &self.position
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
