//! Routing error types

use flowlens_core::ConfigError;
use thiserror::Error;

use crate::component::ComponentState;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("Provider lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Routing component is {found:?}, expected {expected:?}")]
    InvalidState {
        expected: ComponentState,
        found: ComponentState,
    },
}
