pub mod comparator;
pub mod engine;
pub mod scanner;
pub mod scheduler;
pub mod transfer;

pub use comparator::{plan, summarize_actions, ActionSummary, CopyReason, SyncAction};
pub use engine::{PassOutcome, SyncEngine, SyncResult, SyncState, TriggerOutcome, TriggerSource};
pub use scanner::{collect_remote, scan_remote, RemoteItem, RemoteScan};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use transfer::{ActionOutcome, TransferExecutor};
