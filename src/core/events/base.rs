

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::storage::models::EntityKind;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityAction {
    Created,
    Updated,
    Deleted,
    Restored,
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {

    pub event_id: Uuid,

    pub event_type: String,

    pub timestamp: DateTime<Utc>,

    pub payload: Value,
}

impl Event {

    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// `user-created`, `post-deleted`, ...
    #[must_use]
    pub fn entity(kind: EntityKind, action: EntityAction, payload: Value) -> Self {
        Self::new(format!("{kind}-{action}"), payload)
    }
}
