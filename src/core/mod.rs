pub mod config;
pub mod error;
pub mod events;


pub use config::{PostboardConfig, StorageBackendKind, TokenMode};
pub use error::{PostboardError, Result};
pub use events::{BroadcastHub, EntityAction, Event, Subscription};
