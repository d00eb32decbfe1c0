//! Mock transformer for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::transformer::{TransformRequest, Transformer, TransformerError};

/// A recorded transformer call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub identifier: String,
    pub policy: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
enum Script {
    Output(Vec<u8>),
    Error(String),
    Panic(String),
}

/// Mock implementation of the Transformer trait.
///
/// Provides controllable behavior for testing:
/// - Scripted output, error or panic per identifier
/// - Unscripted items are echoed back unchanged
/// - Optional delay per call
/// - Every call is recorded
#[derive(Debug, Clone, Default)]
pub struct MockTransformer {
    script: HashMap<String, Script>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    next_error: Arc<RwLock<Option<String>>>,
}

impl MockTransformer {
    /// Create a new mock transformer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `output` for `identifier`.
    pub fn with_output(mut self, identifier: impl Into<String>, output: Vec<u8>) -> Self {
        self.script.insert(identifier.into(), Script::Output(output));
        self
    }

    /// Fail `identifier` with `message`.
    pub fn with_error(mut self, identifier: impl Into<String>, message: impl Into<String>) -> Self {
        self.script
            .insert(identifier.into(), Script::Error(message.into()));
        self
    }

    /// Panic while transforming `identifier`.
    pub fn with_panic(mut self, identifier: impl Into<String>, message: impl Into<String>) -> Self {
        self.script
            .insert(identifier.into(), Script::Panic(message.into()));
        self
    }

    /// Sleep for `delay` in every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Get the number of calls made.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Clear recorded calls.
    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    /// Configure the next call to fail with the given message.
    pub async fn set_next_error(&self, message: impl Into<String>) {
        *self.next_error.write().await = Some(message.into());
    }
}

#[async_trait]
impl Transformer for MockTransformer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, request: TransformRequest<'_>) -> Result<Vec<u8>, TransformerError> {
        self.calls.write().await.push(RecordedCall {
            identifier: request.identifier.to_string(),
            policy: request.policy.to_string(),
            content: request.content.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.next_error.write().await.take() {
            return Err(TransformerError::rejected(message));
        }

        match self.script.get(request.identifier) {
            Some(Script::Output(bytes)) => Ok(bytes.clone()),
            Some(Script::Error(message)) => Err(TransformerError::rejected(message.clone())),
            Some(Script::Panic(message)) => panic!("{}", message),
            None => Ok(request.content),
        }
    }
}
