//! Bulk write execution
//!
//! A batch is submitted in one backend call; the backend applies each
//! operation on its own and reports per item. The outcome is one of:
//!
//! - full success: every item applied
//! - partial failure: some items failed, the rest *were* applied
//! - total failure: the batch never reached the backend
//!
//! [`BulkWriter::execute`] turns a partial failure into
//! [`Error::PartialBulkFailure`] carrying the failed items.

use serde::Serialize;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::backend::{BulkItemResult, BulkOp, ItemStatus, Refresh, SearchBackend};

/// An ordered set of independent mutations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkBatch {
    ops: Vec<BulkOp>,
}

impl BulkBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: BulkOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = BulkOp>) -> &mut Self {
        self.ops.extend(ops);
        self
    }

    pub fn append(&mut self, other: BulkBatch) -> &mut Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn ops(&self) -> &[BulkOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BulkOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl FromIterator<BulkOp> for BulkBatch {
    fn from_iter<I: IntoIterator<Item = BulkOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

/// An item the backend could not apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub index: String,
    pub id: String,
    pub action: &'static str,
    pub reason: String,
}

/// Per-status tallies of a submitted batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Deletes of documents that were already gone
    pub not_found: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkSummary {
    /// Items the backend applied
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.deleted + self.not_found
    }

    pub fn total(&self) -> usize {
        self.applied() + self.failures.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    Success(BulkSummary),
    PartialFailure(BulkSummary),
}

impl BulkOutcome {
    pub fn summary(&self) -> &BulkSummary {
        match self {
            BulkOutcome::Success(s) | BulkOutcome::PartialFailure(s) => s,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BulkOutcome::Success(_))
    }
}

/// Tally per-item results into an outcome
pub fn classify(results: &[BulkItemResult]) -> BulkOutcome {
    let mut summary = BulkSummary::default();
    for item in results {
        match &item.status {
            ItemStatus::Created => summary.created += 1,
            ItemStatus::Updated => summary.updated += 1,
            ItemStatus::Deleted => summary.deleted += 1,
            ItemStatus::NotFound => summary.not_found += 1,
            ItemStatus::Failed { reason } => summary.failures.push(BulkFailure {
                index: item.index.clone(),
                id: item.id.clone(),
                action: item.action,
                reason: reason.clone(),
            }),
        }
    }

    if summary.failures.is_empty() {
        BulkOutcome::Success(summary)
    } else {
        BulkOutcome::PartialFailure(summary)
    }
}

/// Submits batches and classifies the outcome
#[derive(Clone)]
pub struct BulkWriter {
    backend: Arc<dyn SearchBackend>,
    refresh: Refresh,
}

impl BulkWriter {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            refresh: Refresh::Immediate,
        }
    }

    pub fn with_refresh(mut self, refresh: Refresh) -> Self {
        self.refresh = refresh;
        self
    }

    /// Submit and report the raw outcome
    ///
    /// Only a batch that could not be submitted at all is an `Err`.
    pub async fn submit(&self, batch: BulkBatch) -> Result<BulkOutcome> {
        if batch.is_empty() {
            return Ok(BulkOutcome::Success(BulkSummary::default()));
        }

        let size = batch.len();
        let results = self
            .backend
            .bulk(batch.into_ops(), self.refresh)
            .await
            .map_err(|e| {
                tracing::error!("Bulk request of {} operations could not be submitted: {}", size, e);
                Error::Backend(e)
            })?;

        let outcome = classify(&results);
        for failure in &outcome.summary().failures {
            tracing::error!(
                "Bulk {} of '{}' in '{}' failed: {}",
                failure.action,
                failure.id,
                failure.index,
                failure.reason
            );
        }
        Ok(outcome)
    }

    /// Submit; any failed item fails the whole call
    pub async fn execute(&self, batch: BulkBatch) -> Result<BulkSummary> {
        match self.submit(batch).await? {
            BulkOutcome::Success(summary) => Ok(summary),
            BulkOutcome::PartialFailure(summary) => {
                let applied = summary.applied();
                Err(Error::PartialBulkFailure {
                    applied,
                    failures: summary.failures,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;
    use serde_json::json;

    fn index_op(id: &str) -> BulkOp {
        BulkOp::Index {
            index: "channelfinder".into(),
            id: id.into(),
            doc: json!({"name": id, "owner": "o1"}),
        }
    }

    fn update_op(id: &str) -> BulkOp {
        BulkOp::Update {
            index: "channelfinder".into(),
            id: id.into(),
            doc: json!({"name": id, "owner": "o2"}),
        }
    }

    #[tokio::test]
    async fn test_full_success() {
        let writer = BulkWriter::new(Arc::new(MemoryBackend::new()));
        let summary = writer
            .execute([index_op("a"), index_op("b")].into_iter().collect())
            .await
            .unwrap();
        assert_eq!(summary.created, 2);
        assert_eq!(summary.applied(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_available(false);
        let writer = BulkWriter::new(backend);
        assert!(writer.execute(BulkBatch::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_partial_failure_reports_items() {
        let writer = BulkWriter::new(Arc::new(MemoryBackend::new()));
        let batch: BulkBatch = [index_op("a"), update_op("ghost")].into_iter().collect();

        match writer.execute(batch).await {
            Err(Error::PartialBulkFailure { applied, failures }) => {
                assert_eq!(applied, 1);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].id, "ghost");
                assert_eq!(failures[0].action, "update");
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_total_failure_is_infrastructure() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_available(false);
        let writer = BulkWriter::new(backend);

        let err = writer
            .execute([index_op("a")].into_iter().collect())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Infrastructure);
    }

    #[test]
    fn test_classify_counts() {
        let results = vec![
            BulkItemResult {
                index: "i".into(),
                id: "a".into(),
                action: "delete",
                status: ItemStatus::NotFound,
            },
            BulkItemResult {
                index: "i".into(),
                id: "b".into(),
                action: "index",
                status: ItemStatus::Updated,
            },
        ];
        let outcome = classify(&results);
        assert!(outcome.is_success());
        assert_eq!(outcome.summary().total(), 2);
    }
}
