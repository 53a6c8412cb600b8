pub mod backend;
pub mod models;
pub mod persistence;
pub mod records;


pub use backend::{JsonFileBackend, SqliteBackend, StateBackend, open_backend};
pub use models::{EntityKind, PostId, PostRecord, PublicUser, Record, UserId, UserRecord};
pub use persistence::{POSTS_KEY, SNAPSHOTS_KEY, StatePersistence, TOKENS_KEY, USERS_KEY};
pub use records::RecordStore;
