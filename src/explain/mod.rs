//! Narrative generation for tour steps.

pub mod http;
pub mod placeholder;
pub mod prompt;

pub use http::HttpExplainer;
pub use placeholder::PlaceholderExplainer;

use crate::config::{ExplainerConfig, Provider};
use crate::tour::models::StepTarget;
use thiserror::Error;

/// Errors that can occur while generating an explanation.
#[derive(Error, Debug)]
pub enum ExplainError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("unexpected response: {0}")]
    BadResponse(String),

    #[error("API key not set: export {0}")]
    MissingApiKey(String),

    #[error("unknown explainer provider: {0}")]
    UnknownProvider(String),
}

/// Produces the explanation text of one step.
///
/// Implementations must be `Send + Sync` so one explainer can serve
/// concurrent builds behind `Arc`.
pub trait Explainer: Send + Sync {
    /// Explain a change unit (main step) or code region (background step).
    fn explain(&self, target: &StepTarget, intent: Option<&str>) -> Result<String, ExplainError>;
}

/// Build the explainer selected by configuration.
pub fn from_config(config: &ExplainerConfig) -> Result<Box<dyn Explainer>, ExplainError> {
    match config.provider_kind() {
        Some(Provider::Placeholder) => Ok(Box::new(PlaceholderExplainer)),
        Some(Provider::Openai) => Ok(Box::new(HttpExplainer::from_config(config)?)),
        None => Err(ExplainError::UnknownProvider(config.provider.clone())),
    }
}
