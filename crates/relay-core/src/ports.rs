//! Collaborator contracts the orchestrator is wired with.

use crate::error::RepositoryResult;
use async_trait::async_trait;
use relay_outbox::MessageRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processed-message counts over trailing windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedCounts {
    pub in_hour: u64,
    pub in_day: u64,
    pub in_week: u64,
    pub in_month: u64,
}

/// Durable message store.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Persist a message in the in-processing state.
    ///
    /// Saving an id that is already stored must fail with
    /// [`crate::RepositoryError::DuplicateId`].
    async fn save_message(&self, record: &MessageRecord) -> RepositoryResult<()>;

    /// Mark a stored message as processed. Unknown ids are not an error.
    async fn update_status(&self, id: Uuid) -> RepositoryResult<()>;

    /// Count processed messages per window.
    async fn processed_count(&self) -> RepositoryResult<ProcessedCounts>;
}

/// Counter sink for relay activity.
pub trait Metrics: Send + Sync {
    fn incoming_msg_inc(&self);
    fn processed_msg_inc(&self);
    fn problems_saving_in_db(&self);
}

/// Metrics that discard every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn incoming_msg_inc(&self) {}
    fn processed_msg_inc(&self) {}
    fn problems_saving_in_db(&self) {}
}
