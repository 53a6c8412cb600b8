pub mod models;
pub mod scheduler;
pub mod snapshots;


pub use models::{DeleteOutcome, PendingSnapshot, RestoreOutcome, SnapshotPayload, UNDO_HANDLE_PREFIX};
pub use scheduler::{ExpiryHandler, ExpiryScheduler, TimerState};
pub use snapshots::{RearmStats, SnapshotStore, UndoTicket};
