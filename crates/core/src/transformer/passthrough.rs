//! Transformer that leaves content untouched.

use async_trait::async_trait;

use super::error::TransformerError;
use super::traits::Transformer;
use super::types::TransformRequest;

/// Returns every item's content unchanged, turning a batch into a plain archive.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTransformer;

impl PassthroughTransformer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transformer for PassthroughTransformer {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn invoke(&self, request: TransformRequest<'_>) -> Result<Vec<u8>, TransformerError> {
        Ok(request.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[tokio::test]
    async fn test_passthrough_returns_content() {
        let output = PassthroughTransformer::new()
            .invoke(TransformRequest {
                identifier: "a",
                content: b"same".to_vec(),
                policy: "ignored",
                scratch_dir: Path::new("/tmp"),
            })
            .await
            .unwrap();
        assert_eq!(output, b"same");
    }
}
