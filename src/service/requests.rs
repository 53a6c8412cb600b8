use serde::{Deserialize, Serialize};

use crate::storage::models::{PublicUser, UserId};


pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_CONTENT_CHARS: usize = 2000;


#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Only honored while no admin exists, and then the user is admin anyway.
    #[serde(default)]
    pub admin: bool,
}

impl NewUser {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}


#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub admin: Option<bool>,
}


#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPost {
    #[serde(default)]
    pub content: Option<String>,
}

impl NewPost {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}


#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdate {
    #[serde(default)]
    pub content: Option<String>,
}


#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub password: Option<String>,
}


#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}


#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRequest {
    #[serde(default)]
    pub undo_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_deserialize_as_none() {
        let req: LoginRequest = serde_json::from_str("{}").unwrap();
        assert!(req.user_id.is_none());

        let req: UndoRequest = serde_json::from_str(r#"{"undoToken":"undo_x"}"#).unwrap();
        assert_eq!(req.undo_token.as_deref(), Some("undo_x"));

        let req: NewUser = serde_json::from_str(r#"{"name":"ann","admin":true}"#).unwrap();
        assert!(req.admin);
        assert!(req.password.is_none());
    }
}
