//! External seams: row sources and sync dispatchers.
//!
//! The engine talks to the outside world through these two traits only.
//! Fetching rows and applying operations are the only blocking stages of a
//! run; everything between them is pure.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diff::SyncOperation;
use crate::error::GridCalResult;
use crate::grid::SheetGrid;
use crate::identity::EventIdentity;

/// Yields raw sheet grids for one schedule source.
pub trait RowSource {
    /// Short name of the source, used for logs and state partitioning.
    fn name(&self) -> &str;

    fn fetch(&self) -> impl Future<Output = GridCalResult<Vec<SheetGrid>>> + Send;
}

/// One run's worth of operations, tagged with an idempotency token so the
/// remote store can drop a re-delivered batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchBatch {
    pub token: Uuid,
    pub operations: Vec<SyncOperation>,
}

impl DispatchBatch {
    pub fn new(operations: Vec<SyncOperation>) -> Self {
        DispatchBatch {
            token: Uuid::new_v4(),
            operations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AckStatus {
    Applied,
    Rejected { reason: String },
}

/// Per-operation acknowledgment from the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchAck {
    pub identity: EventIdentity,
    #[serde(flatten)]
    pub status: AckStatus,
}

impl DispatchAck {
    pub fn applied(identity: EventIdentity) -> Self {
        DispatchAck {
            identity,
            status: AckStatus::Applied,
        }
    }

    pub fn rejected(identity: EventIdentity, reason: impl Into<String>) -> Self {
        DispatchAck {
            identity,
            status: AckStatus::Rejected {
                reason: reason.into(),
            },
        }
    }

    pub fn is_applied(&self) -> bool {
        self.status == AckStatus::Applied
    }
}

/// Applies an operation batch to the remote event store.
pub trait Dispatcher {
    fn dispatch(
        &self,
        batch: &DispatchBatch,
    ) -> impl Future<Output = GridCalResult<Vec<DispatchAck>>> + Send;
}
