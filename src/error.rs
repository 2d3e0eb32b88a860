use std::io;
use thiserror::Error;

use crate::component::ComponentLabel;

#[derive(Error, Debug)]
pub enum ChexmixError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Malformed model at line {line}: {message}")]
    MalformedModel { line: usize, message: String },

    #[error("Model is missing its {0} component")]
    MissingComponent(ComponentLabel),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid parameter: {name} = {value}, {message}")]
    InvalidParameter {
        name: String,
        value: String,
        message: String,
    },
}

/// Type alias for Result with ChexmixError
pub type Result<T> = std::result::Result<T, ChexmixError>;

impl ChexmixError {
    /// Create a new MalformedModel error. `line` is 1-based.
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        ChexmixError::MalformedModel {
            line,
            message: message.into(),
        }
    }

    /// Create a new InvalidParameter error
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        ChexmixError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            message: message.into(),
        }
    }
}

impl From<polars::prelude::PolarsError> for ChexmixError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        ChexmixError::DataError(err.to_string())
    }
}

impl From<toml::de::Error> for ChexmixError {
    fn from(err: toml::de::Error) -> Self {
        ChexmixError::InvalidFileFormat(err.to_string())
    }
}
