
pub mod api;
pub mod app;
pub mod auth;
pub mod core;
pub mod service;
pub mod storage;
pub mod undo;
pub mod utils;



pub use app::AppState;
pub use core::config::{PostboardConfig, StorageBackendKind, TokenMode};
pub use core::error::{PostboardError, Result};
pub use core::events::{BroadcastHub, Event, Subscription};
pub use service::MutationService;
pub use undo::{DeleteOutcome, RestoreOutcome, SnapshotStore};


pub const DEFAULT_GRACE_PERIOD_MS: u64 = 10_000;


pub const DEFAULT_PORT: u16 = 3000;


pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 120;
