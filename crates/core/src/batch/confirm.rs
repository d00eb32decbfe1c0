//! Confirmation step run before any item is touched.

use async_trait::async_trait;

use crate::source::Preflight;

/// Decides whether a batch with the given totals may proceed.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, preflight: &Preflight) -> bool;
}

/// Accepts every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl ConfirmationGate for AutoConfirm {
    async fn confirm(&self, _preflight: &Preflight) -> bool {
        true
    }
}

/// Declines batches above configured size limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitGate {
    pub max_items: Option<usize>,
    pub max_total_bytes: Option<u64>,
}

impl LimitGate {
    pub fn new(max_items: Option<usize>, max_total_bytes: Option<u64>) -> Self {
        Self {
            max_items,
            max_total_bytes,
        }
    }

    pub fn allows(&self, preflight: &Preflight) -> bool {
        self.max_items.map_or(true, |max| preflight.item_count <= max)
            && self
                .max_total_bytes
                .map_or(true, |max| preflight.total_bytes <= max)
    }
}

#[async_trait]
impl ConfirmationGate for LimitGate {
    async fn confirm(&self, preflight: &Preflight) -> bool {
        self.allows(preflight)
    }
}

/// A caller's explicit answer, still subject to limits.
#[derive(Debug, Clone, Copy)]
pub struct RequestConfirmation {
    pub confirmed: bool,
    pub limits: LimitGate,
}

impl RequestConfirmation {
    pub fn new(confirmed: bool, limits: LimitGate) -> Self {
        Self { confirmed, limits }
    }
}

#[async_trait]
impl ConfirmationGate for RequestConfirmation {
    async fn confirm(&self, preflight: &Preflight) -> bool {
        self.confirmed && self.limits.allows(preflight)
    }
}
