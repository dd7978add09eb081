//! Configuration error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown {registry} kind: {kind}")]
    UnknownBackendKind { registry: &'static str, kind: String },

    #[error("Duplicate {registry} kind: {kind}")]
    DuplicateKind { registry: &'static str, kind: String },

    #[error("Missing `kind` field in {registry} configuration")]
    MissingKind { registry: &'static str },

    #[error("Invalid {registry} configuration: expected a table, got {found}")]
    InvalidShape {
        registry: &'static str,
        found: &'static str,
    },

    #[error("Unknown field `{field}` in {registry} configuration of kind {kind}")]
    UnknownField {
        registry: &'static str,
        kind: String,
        field: String,
    },

    #[error("Invalid {registry} configuration of kind {kind}: {message}")]
    Invalid {
        registry: &'static str,
        kind: String,
        message: String,
    },
}
