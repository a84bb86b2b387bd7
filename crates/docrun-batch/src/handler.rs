//! Observer seam for batch progress.

use async_trait::async_trait;

use docrun_core::{BatchItem, BatchProgress};

/// Receives batch lifecycle notifications.
///
/// All methods default to no-ops; implement only what you observe.
/// `on_progress` fires when an item is *attempted*, before its outcome is
/// known; `on_complete` fires exactly once, after the last item settles.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn on_progress(&self, _progress: &BatchProgress) {}

    async fn on_item_settled(&self, _item: &BatchItem) {}

    async fn on_complete(&self, _items: &[BatchItem]) {}

    async fn on_error(&self, _message: &str) {}
}

/// Handler that observes nothing.
pub struct NullHandler;

#[async_trait]
impl BatchHandler for NullHandler {}
