//! Crate Error Types
//!
//! A single error enum covers every fatal condition the compiler can hit.
//! Unresolved template expressions are deliberately absent: they are not
//! errors, the source text is preserved in the output instead.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or compiling a workflow configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// A structurally required key is absent from the configuration.
    #[error("missing required field '{field}' in {scope}")]
    MissingField { field: String, scope: String },

    /// Two tasks or metatasks share an effective name at the same scope.
    #[error("duplicate task name '{name}' in {scope}")]
    DuplicateName { name: String, scope: String },

    /// A configuration value has the wrong shape for its position.
    #[error("malformed specification in {scope}: expected {expected}")]
    MalformedSpec { scope: String, expected: String },

    /// The configuration source could not be parsed as YAML.
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Reading or writing a file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The output path's parent directory does not exist or is read-only.
    #[error("'{}' is not a writable output path", .0.display())]
    UnwritablePath(PathBuf),
}

impl Error {
    /// Shorthand for a [`Error::MissingField`] with owned strings.
    pub fn missing(field: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            scope: scope.into(),
        }
    }

    /// Shorthand for a [`Error::MalformedSpec`] with owned strings.
    pub fn malformed(scope: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::MalformedSpec {
            scope: scope.into(),
            expected: expected.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
