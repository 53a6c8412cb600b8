use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::models::{EntityKind, PostRecord, UserRecord};


pub const UNDO_HANDLE_PREFIX: &str = "undo_";


/// Records removed by a delete, exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotPayload {
    User {
        user: UserRecord,
        posts: Vec<PostRecord>,
    },
    Post {
        post: PostRecord,
    },
}

impl SnapshotPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User { .. } => EntityKind::User,
            Self::Post { .. } => EntityKind::Post,
        }
    }


    pub fn entity_id(&self) -> u64 {
        match self {
            Self::User { user, .. } => user.id,
            Self::Post { post } => post.id,
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSnapshot {
    pub undo_handle: String,
    pub kind: EntityKind,
    pub payload: SnapshotPayload,
    #[serde(default)]
    pub revoked_tokens: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingSnapshot {
    pub fn new(
        undo_handle: String,
        payload: SnapshotPayload,
        revoked_tokens: Vec<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            undo_handle,
            kind: payload.kind(),
            payload,
            revoked_tokens,
            created_at,
            expires_at,
        }
    }

    /// The deadline is inclusive: at `expires_at` the snapshot is already gone.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }


    pub fn is_consistent(&self) -> bool {
        self.kind == self.payload.kind()
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub kind: EntityKind,
    pub id: u64,
    pub undo_handle: String,
    pub expires_at: DateTime<Utc>,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub kind: EntityKind,
    pub restored_id: u64,
}
