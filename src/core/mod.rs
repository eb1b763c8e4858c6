pub mod cleanup;
pub mod comparator;
pub mod executor;
pub mod paths;
pub mod planner;
pub mod progress;
pub mod scheduler;
pub mod walker;

pub use cleanup::{Cleanup, CleanupReport};
pub use comparator::{FileComparator, Staleness};
pub use executor::{ExecutionReport, TransferExecutor};
pub use planner::{FoldersToDelete, Side, TransferDescriptor, TransferPlanner, TransferSet};
pub use progress::{Convergence, ProgressTracker, SizeSnapshot};
pub use scheduler::{SyncConfig, SyncScheduler, TickOutcome};
pub use walker::{TreeWalker, WalkConfig};
