//! Transformer module: the boundary to the external content transformer.
//!
//! This module provides the `Transformer` trait that external collaborators
//! implement, and the `TransformerGateway` that the batch orchestrator calls.
//! The gateway turns every outcome of a call, including errors, timeouts and
//! panics, into a `TransformOutcome` value so that one item can never abort
//! the batch.
//!
//! # Implementations
//!
//! - `CommandTransformer`: runs an external program per item in a scratch
//!   directory, passing the input file and the recipe by path
//! - `PassthroughTransformer`: returns the content unchanged
//!
//! # Example
//!
//! ```ignore
//! use streambatch_core::transformer::{CommandTransformer, TransformerConfig, TransformerGateway};
//!
//! let transformer = CommandTransformer::new(command_config);
//! transformer.validate().await?;
//!
//! let gateway = TransformerGateway::new(transformer, TransformerConfig::default());
//! match gateway.transform(item, &recipe).await {
//!     TransformOutcome::Success { name, bytes } => { /* archive it */ }
//!     TransformOutcome::Failure { name, message } => { /* record it */ }
//! }
//! ```

mod command;
mod config;
mod error;
mod gateway;
mod passthrough;
mod traits;
mod types;

pub use command::CommandTransformer;
pub use config::{CommandConfig, TransformerBackend, TransformerConfig};
pub use error::TransformerError;
pub use gateway::TransformerGateway;
pub use passthrough::PassthroughTransformer;
pub use traits::Transformer;
pub use types::{TransformOutcome, TransformRequest};

use std::sync::Arc;

/// Factory function to create the configured transformer backend.
pub fn create_transformer(
    config: &TransformerConfig,
) -> Result<Arc<dyn Transformer>, TransformerError> {
    match config.backend {
        TransformerBackend::Passthrough => Ok(Arc::new(PassthroughTransformer::new())),
        TransformerBackend::Command => {
            let command = config.command.clone().ok_or_else(|| {
                TransformerError::not_configured(
                    "[transformer.command] must be set when using the command backend",
                )
            })?;
            Ok(Arc::new(CommandTransformer::new(command)))
        }
    }
}
