//! The per-operation strategy driven by the process engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};
use uuid::Uuid;

use bulkfs_core::{PathItem, ProcessError, ProcessErrorItem, ProcessOptions, SizeAccount};
use bulkfs_walk::{EnumerationOrder, Enumerator};

use crate::preflight::VolumeProbe;

/// The operations a process can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    Recycle,
    ClearTrash,
    Extract,
}

impl OperationKind {
    /// Stable correlation GUID identifying this operation to callers.
    pub const fn guid(self) -> Uuid {
        match self {
            Self::Copy => Uuid::from_u128(0x6d1f_04a2_3c9b_4e51_9a0e_51c3_20f7_a101),
            Self::Move => Uuid::from_u128(0x6d1f_04a2_3c9b_4e51_9a0e_51c3_20f7_a102),
            Self::Delete => Uuid::from_u128(0x6d1f_04a2_3c9b_4e51_9a0e_51c3_20f7_a103),
            Self::Recycle => Uuid::from_u128(0x6d1f_04a2_3c9b_4e51_9a0e_51c3_20f7_a104),
            Self::ClearTrash => Uuid::from_u128(0x6d1f_04a2_3c9b_4e51_9a0e_51c3_20f7_a105),
            Self::Extract => Uuid::from_u128(0x6d1f_04a2_3c9b_4e51_9a0e_51c3_20f7_a106),
        }
    }

    /// Look an operation up by its correlation GUID.
    pub fn from_guid(guid: Uuid) -> Option<Self> {
        Self::iter().find(|kind| kind.guid() == guid)
    }

    /// Whether the operation writes to a destination root.
    pub fn needs_destination(self) -> bool {
        matches!(self, Self::Copy | Self::Move | Self::Extract)
    }

    /// Past-tense verb used in summaries.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Copy => "Copied",
            Self::Move => "Moved",
            Self::Delete => "Deleted",
            Self::Recycle => "Recycled",
            Self::ClearTrash => "Purged",
            Self::Extract => "Extracted",
        }
    }
}

/// Result of one successful unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The item was processed; carries the bytes written or removed.
    Done(u64),
    /// The item was deliberately left alone (e.g. a skipped conflict).
    Skipped,
}

/// Items produced by expanding one seed.
pub type Expansion = Box<dyn Iterator<Item = Result<PathItem, ProcessErrorItem>>>;

/// State handed to [`Operation::pre_flight_check`].
pub struct CheckContext<'a> {
    /// The seeds the process was created with.
    pub seeds: &'a [PathItem],
    /// Total size of the loaded queue.
    pub total_size: SizeAccount,
    /// The (frozen) process options.
    pub options: &'a ProcessOptions,
    /// Volume lookups.
    pub volumes: &'a dyn VolumeProbe,
}

/// One concrete operation: how seeds expand and what happens to each item.
pub trait Operation: Send {
    /// Which operation this is under the given options.
    fn kind(&self, options: &ProcessOptions) -> OperationKind;

    /// How seeds are walked; `None` queues seeds without walking them.
    fn enumeration_order(&self, options: &ProcessOptions) -> Option<EnumerationOrder>;

    /// Whether the filter also judges the seeds. Operations whose seed only
    /// holds the queued items (an archive) return `false`.
    fn filter_seeds(&self) -> bool {
        true
    }

    /// Reject a seed set the operation cannot run on. Called when the
    /// process is built and again when it loads.
    fn validate(&self, _seeds: &[PathItem], _options: &ProcessOptions) -> Result<(), ProcessError> {
        Ok(())
    }

    /// Turn a seed into the items to queue. A failure here is fatal to the
    /// process.
    fn expand(
        &mut self,
        seed: &PathItem,
        options: &ProcessOptions,
    ) -> Result<Expansion, ProcessError> {
        match self.enumeration_order(options) {
            Some(order) => Ok(Box::new(Enumerator::new(seed, order)?)),
            None => Ok(Box::new(std::iter::once(Ok(seed.clone())))),
        }
    }

    /// Validate feasibility once before any item is processed.
    fn pre_flight_check(&mut self, _context: &CheckContext<'_>) -> Result<(), ProcessError> {
        Ok(())
    }

    /// Process one item.
    fn do_work(
        &mut self,
        item: &PathItem,
        options: &ProcessOptions,
    ) -> Result<Outcome, ProcessError>;

    /// Called once after the queue drains.
    fn complete(&mut self, _options: &ProcessOptions) -> Result<(), ProcessError> {
        Ok(())
    }
}
