//! Trait definitions for the transformer module.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::TransformerError;
use super::types::TransformRequest;

/// An external collaborator that transforms one item's bytes under a policy.
///
/// Implementations may assume calls are not concurrent unless the gateway is
/// configured otherwise, and may use the request's scratch directory freely.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Returns the name of this transformer implementation.
    fn name(&self) -> &str;

    /// Transforms the request content, returning the output bytes.
    async fn invoke(&self, request: TransformRequest<'_>) -> Result<Vec<u8>, TransformerError>;

    /// Validates that the transformer is properly configured and ready.
    async fn validate(&self) -> Result<(), TransformerError> {
        Ok(())
    }
}

#[async_trait]
impl<T: Transformer + ?Sized> Transformer for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn invoke(&self, request: TransformRequest<'_>) -> Result<Vec<u8>, TransformerError> {
        (**self).invoke(request).await
    }

    async fn validate(&self) -> Result<(), TransformerError> {
        (**self).validate().await
    }
}
