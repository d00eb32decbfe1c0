//! Failure-normalizing wrapper around a [`Transformer`].

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::config::TransformerConfig;
use super::error::TransformerError;
use super::traits::Transformer;
use super::types::{TransformOutcome, TransformRequest};
use crate::metrics;
use crate::source::BatchItem;

/// Invokes the transformer for one item at a time and never fails.
///
/// Each call gets a fresh scratch directory under the configured parent,
/// which is removed whatever the outcome. Errors, timeouts and panics all
/// come back as [`TransformOutcome::Failure`].
pub struct TransformerGateway<T: Transformer> {
    transformer: T,
    config: TransformerConfig,
    permits: Arc<Semaphore>,
}

impl<T: Transformer> TransformerGateway<T> {
    pub fn new(transformer: T, config: TransformerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_calls.max(1)));
        Self {
            transformer,
            config,
            permits,
        }
    }

    pub fn with_defaults(transformer: T) -> Self {
        Self::new(transformer, TransformerConfig::default())
    }

    pub fn transformer(&self) -> &T {
        &self.transformer
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Transforms one item under `policy`.
    pub async fn transform(&self, item: BatchItem, policy: &str) -> TransformOutcome {
        let identifier = item.identifier.clone();
        let started = Instant::now();

        let result = self.invoke_scoped(item, policy).await;

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(bytes) => {
                metrics::TRANSFORM_CALLS_TOTAL
                    .with_label_values(&["success"])
                    .inc();
                metrics::TRANSFORM_DURATION_SECONDS
                    .with_label_values(&["success"])
                    .observe(elapsed);
                debug!(identifier = %identifier, bytes = bytes.len(), "Item transformed");
                TransformOutcome::success(identifier, bytes)
            }
            Err(e) => {
                metrics::TRANSFORM_CALLS_TOTAL
                    .with_label_values(&[e.kind()])
                    .inc();
                metrics::TRANSFORM_DURATION_SECONDS
                    .with_label_values(&["failure"])
                    .observe(elapsed);
                warn!(identifier = %identifier, error = %e, "Item transformation failed");
                TransformOutcome::failure(identifier, e.to_string())
            }
        }
    }

    async fn invoke_scoped(
        &self,
        item: BatchItem,
        policy: &str,
    ) -> Result<Vec<u8>, TransformerError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransformerError::Unavailable)?;

        tokio::fs::create_dir_all(&self.config.scratch_dir)
            .await
            .map_err(|source| TransformerError::Scratch { source })?;
        let scratch = tempfile::Builder::new()
            .prefix("item-")
            .tempdir_in(&self.config.scratch_dir)
            .map_err(|source| TransformerError::Scratch { source })?;

        let BatchItem {
            identifier,
            content,
            ..
        } = item;
        let request = TransformRequest {
            identifier: &identifier,
            content,
            policy,
            scratch_dir: scratch.path(),
        };

        let call = AssertUnwindSafe(self.transformer.invoke(request)).catch_unwind();
        let result =
            tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), call).await;

        match tokio::task::spawn_blocking(move || scratch.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(identifier = %identifier, error = %e, "Failed to remove scratch directory"),
            Err(e) => warn!(identifier = %identifier, error = %e, "Scratch cleanup task failed"),
        }

        match result {
            Err(_) => Err(TransformerError::Timeout {
                timeout_secs: self.config.timeout_secs,
            }),
            Ok(Err(panic)) => Err(TransformerError::Panicked {
                message: panic_message(panic.as_ref()),
            }),
            Ok(Ok(output)) => output,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
