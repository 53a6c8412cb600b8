use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::requests::{
    LoginRequest, LoginResponse, MAX_CONTENT_CHARS, MAX_NAME_CHARS, NewPost, NewUser, PostUpdate,
    UserUpdate,
};
use crate::auth::password::{MAX_PASSWORD_CHARS, hash_password, verify_password};
use crate::auth::registry::TokenRegistry;
use crate::core::error::{PostboardError, Result};
use crate::core::events::{BroadcastHub, EntityAction, Event, Subscription};
use crate::storage::models::{EntityKind, PostId, PostRecord, PublicUser, UserId, UserRecord};
use crate::storage::persistence::{POSTS_KEY, StatePersistence, USERS_KEY};
use crate::storage::records::RecordStore;
use crate::undo::models::{DeleteOutcome, RestoreOutcome, SnapshotPayload};
use crate::undo::snapshots::SnapshotStore;
use crate::utils::{ensure_max_chars, require_text, safe_truncate_ellipsis};


#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedNotice<'a> {
    id: u64,
    undo_token: &'a str,
    expires_at: DateTime<Utc>,
}


#[derive(Debug, Serialize)]
struct RestoredNotice {
    id: u64,
}


/// Sequences every change to users and posts.
///
/// Each store synchronizes itself; this type only orders the steps of a
/// mutation: change memory, persist, then tell observers. A failed persist is
/// logged and the mutation stands.
pub struct MutationService {

    users: RecordStore<UserRecord>,

    posts: RecordStore<PostRecord>,

    snapshots: Arc<SnapshotStore>,

    tokens: Arc<dyn TokenRegistry>,

    hub: Arc<BroadcastHub>,

    grace_period: Duration,

    user_creation: Mutex<()>,
}

impl MutationService {

    pub fn new(
        users: RecordStore<UserRecord>,
        posts: RecordStore<PostRecord>,
        snapshots: Arc<SnapshotStore>,
        tokens: Arc<dyn TokenRegistry>,
        hub: Arc<BroadcastHub>,
        grace_period: Duration,
    ) -> Self {
        let service = Self {
            users,
            posts,
            snapshots,
            tokens,
            hub,
            grace_period,
            user_creation: Mutex::new(()),
        };
        service.reserve_pending_ids();

        info!(
            "MutationService initialized: users={}, posts={}, pending={}, grace={}ms",
            service.users.len(),
            service.posts.len(),
            service.snapshots.len(),
            grace_period.as_millis()
        );
        service
    }

    /// Loads records and pending deletes; deletes still in grace are re-armed.
    /// Must run inside a tokio runtime.
    pub fn load(
        persistence: Arc<StatePersistence>,
        tokens: Arc<dyn TokenRegistry>,
        hub: Arc<BroadcastHub>,
        grace_period: Duration,
    ) -> Self {
        let users = RecordStore::load(USERS_KEY, Arc::clone(&persistence));
        let posts = RecordStore::load(POSTS_KEY, Arc::clone(&persistence));
        let snapshots = SnapshotStore::new(persistence);
        snapshots.load();

        Self::new(users, posts, snapshots, tokens, hub, grace_period)
    }

    fn reserve_pending_ids(&self) {
        for snapshot in self.snapshots.pending() {
            match &snapshot.payload {
                SnapshotPayload::User { user, posts } => {
                    self.users.reserve_id(user.id);
                    for post in posts {
                        self.posts.reserve_id(post.id);
                    }
                }
                SnapshotPayload::Post { post } => self.posts.reserve_id(post.id),
            }
        }
    }


    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }


    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }


    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }


    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }


    pub fn list_users(&self) -> Vec<PublicUser> {
        self.users.list().iter().map(UserRecord::public).collect()
    }


    pub fn get_user(&self, id: UserId) -> Result<PublicUser> {
        self.users
            .get(id)
            .map(|user| user.public())
            .ok_or_else(|| PostboardError::not_found(format!("user {id}")))
    }


    pub fn list_posts(&self) -> Vec<PostRecord> {
        self.posts.list()
    }


    pub fn get_post(&self, id: PostId) -> Result<PostRecord> {
        self.posts
            .get(id)
            .ok_or_else(|| PostboardError::not_found(format!("post {id}")))
    }

    /// Resolves a session token to a live user. Tokens of a user that is
    /// pending deletion or purged do not authenticate.
    pub fn authenticate(&self, token: &str) -> Result<UserRecord> {
        let user_id = self.tokens.resolve(token)?;
        self.users.get(user_id).ok_or(PostboardError::InvalidToken)
    }


    pub fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let user_id = request
            .user_id
            .ok_or_else(|| PostboardError::validation("userId is required"))?;
        if let Some(password) = request.password.as_deref() {
            ensure_max_chars("password", password, MAX_PASSWORD_CHARS)?;
        }

        let user = self
            .users
            .get(user_id)
            .ok_or_else(|| PostboardError::not_found(format!("user {user_id}")))?;

        if let (Some(salt), Some(hash)) = (&user.password_salt, &user.password_hash) {
            let password = request
                .password
                .as_deref()
                .ok_or_else(|| PostboardError::validation("password is required"))?;
            if !verify_password(password, salt, hash) {
                info!("Rejected login for user {}", user_id);
                return Err(PostboardError::InvalidCredentials);
            }
        }

        let token = self.tokens.issue(user.id)?;
        info!("User {} logged in ({:?} token)", user.id, self.tokens.mode());
        Ok(LoginResponse {
            token,
            user: user.public(),
        })
    }

    /// The first user while no admin exists becomes admin; later admin requests are ignored.
    pub fn create_user(&self, request: NewUser) -> Result<UserRecord> {
        let name = require_text("name", request.name.as_deref(), MAX_NAME_CHARS)?.to_string();
        let password = match request.password.as_deref() {
            Some(password) if !password.is_empty() => {
                ensure_max_chars("password", password, MAX_PASSWORD_CHARS)?;
                Some(hash_password(password))
            }
            _ => None,
        };

        let user = {
            let _bootstrap = self.user_creation.lock();
            let admin = !self.users.any(|u| u.admin);
            if request.admin && !admin {
                debug!("Ignoring admin flag for '{}', an admin already exists", name);
            }

            let (password_salt, password_hash) = match password {
                Some(p) => (Some(p.salt), Some(p.hash)),
                None => (None, None),
            };
            let user = UserRecord {
                id: self.users.next_id(),
                name,
                admin,
                password_salt,
                password_hash,
            };
            self.users.insert(user.clone());
            user
        };

        self.users.persist();
        info!("Created user {} (admin={})", user.id, user.admin);
        self.publish(EntityKind::User, EntityAction::Created, &user.public());
        Ok(user)
    }


    pub fn update_user(&self, actor: &UserRecord, id: UserId, update: UserUpdate) -> Result<UserRecord> {
        if self.users.get(id).is_none() {
            return Err(PostboardError::not_found(format!("user {id}")));
        }
        if actor.id != id && !actor.admin {
            return Err(PostboardError::Forbidden(format!(
                "user {} may not edit user {}",
                actor.id, id
            )));
        }
        if update.admin.is_some() && !actor.admin {
            return Err(PostboardError::Forbidden(
                "only an admin may change the admin flag".to_string(),
            ));
        }

        let name = match update.name.as_deref() {
            Some(name) => Some(require_text("name", Some(name), MAX_NAME_CHARS)?.to_string()),
            None => None,
        };
        let password = match update.password.as_deref() {
            Some(password) => Some(hash_password(require_text(
                "password",
                Some(password),
                MAX_PASSWORD_CHARS,
            )?)),
            None => None,
        };

        let updated = self
            .users
            .update(id, |user| {
                if let Some(name) = name {
                    user.name = name;
                }
                if let Some(password) = password {
                    user.password_salt = Some(password.salt);
                    user.password_hash = Some(password.hash);
                }
                if let Some(admin) = update.admin {
                    user.admin = admin;
                }
            })
            .ok_or_else(|| PostboardError::not_found(format!("user {id}")))?;

        self.users.persist();
        debug!("User {} updated by {}", id, actor.id);
        self.publish(EntityKind::User, EntityAction::Updated, &updated.public());
        Ok(updated)
    }


    pub fn create_post(&self, actor: &UserRecord, request: NewPost) -> Result<PostRecord> {
        let content =
            require_text("content", request.content.as_deref(), MAX_CONTENT_CHARS)?.to_string();

        let post = PostRecord {
            id: self.posts.next_id(),
            user_id: actor.id,
            content,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.posts.insert(post.clone());

        self.posts.persist();
        debug!(
            "User {} created post {}: {}",
            actor.id,
            post.id,
            safe_truncate_ellipsis(&post.content, 40)
        );
        self.publish(EntityKind::Post, EntityAction::Created, &post);
        Ok(post)
    }


    pub fn update_post(&self, actor: &UserRecord, id: PostId, update: PostUpdate) -> Result<PostRecord> {
        let post = self.get_post(id)?;
        if post.user_id != actor.id {
            return Err(PostboardError::Forbidden(format!(
                "post {} belongs to user {}",
                id, post.user_id
            )));
        }

        let content = match update.content.as_deref() {
            Some(content) => Some(require_text("content", Some(content), MAX_CONTENT_CHARS)?.to_string()),
            None => None,
        };

        let updated = self
            .posts
            .update(id, |post| {
                if let Some(content) = content {
                    post.content = content;
                }
                post.updated_at = Some(Utc::now());
            })
            .ok_or_else(|| PostboardError::not_found(format!("post {id}")))?;

        self.posts.persist();
        self.publish(EntityKind::Post, EntityAction::Updated, &updated);
        Ok(updated)
    }


    pub fn delete(&self, actor: &UserRecord, kind: EntityKind, id: u64) -> Result<DeleteOutcome> {
        match kind {
            EntityKind::User => self.delete_user(actor, id),
            EntityKind::Post => self.delete_post(actor, id),
        }
    }

    /// Removes the user with all their posts and sessions, pending undo.
    pub fn delete_user(&self, actor: &UserRecord, id: UserId) -> Result<DeleteOutcome> {
        if self.users.get(id).is_none() {
            return Err(PostboardError::not_found(format!("user {id}")));
        }
        if actor.id != id && !actor.admin {
            return Err(PostboardError::Forbidden(format!(
                "user {} may not delete user {}",
                actor.id, id
            )));
        }

        let user = self
            .users
            .remove(id)
            .ok_or_else(|| PostboardError::not_found(format!("user {id}")))?;
        let posts = self.posts.remove_where(|p| p.user_id == id);
        let revoked = self.tokens.revoke_all(id);
        debug!(
            "Removed user {} with {} posts, {} sessions revoked",
            id,
            posts.len(),
            revoked.len()
        );

        self.stage_delete(SnapshotPayload::User { user, posts }, revoked)
    }


    pub fn delete_post(&self, actor: &UserRecord, id: PostId) -> Result<DeleteOutcome> {
        let post = self.get_post(id)?;
        if post.user_id != actor.id {
            return Err(PostboardError::Forbidden(format!(
                "post {} belongs to user {}",
                id, post.user_id
            )));
        }

        let post = self
            .posts
            .remove(id)
            .ok_or_else(|| PostboardError::not_found(format!("post {id}")))?;

        self.stage_delete(SnapshotPayload::Post { post }, Vec::new())
    }

    fn stage_delete(&self, payload: SnapshotPayload, revoked: Vec<String>) -> Result<DeleteOutcome> {
        let kind = payload.kind();
        let id = payload.entity_id();

        let ticket = match self.snapshots.put(payload.clone(), revoked.clone(), self.grace_period) {
            Ok(ticket) => ticket,
            Err(e) => {
                // nothing was staged, so there is no undo handle to hand back;
                // put the record and its sessions back rather than lose them
                warn!("Could not stage delete of {} {}: {}", kind, id, e);
                self.reinstate(payload, &revoked);
                return Err(e);
            }
        };

        self.persist_primary(kind);
        self.snapshots.persist();
        info!(
            "Deleted {} {}, undo possible until {}",
            kind, id, ticket.expires_at
        );

        self.publish(
            kind,
            EntityAction::Deleted,
            &DeletedNotice {
                id,
                undo_token: &ticket.undo_handle,
                expires_at: ticket.expires_at,
            },
        );

        Ok(DeleteOutcome {
            kind,
            id,
            undo_handle: ticket.undo_handle,
            expires_at: ticket.expires_at,
        })
    }

    /// Puts a pending delete back. Unknown, expired and already undone handles are `NotFound`.
    pub fn undo(&self, undo_handle: &str) -> Result<RestoreOutcome> {
        let snapshot = self.snapshots.take(undo_handle)?;
        let kind = snapshot.kind;
        let id = snapshot.payload.entity_id();

        self.reinstate(snapshot.payload, &snapshot.revoked_tokens);
        self.snapshots.persist();
        info!("Restored {} {} via {}", kind, id, undo_handle);

        self.publish(kind, EntityAction::Restored, &RestoredNotice { id });
        Ok(RestoreOutcome {
            kind,
            restored_id: id,
        })
    }

    fn reinstate(&self, payload: SnapshotPayload, revoked: &[String]) {
        let kind = payload.kind();
        match payload {
            SnapshotPayload::User { user, posts } => {
                let user_id = user.id;
                self.users.insert(user);
                self.posts.insert_many(posts);
                self.tokens.restore(revoked, user_id);
            }
            SnapshotPayload::Post { post } => self.posts.insert(post),
        }
        self.persist_primary(kind);
    }

    fn persist_primary(&self, kind: EntityKind) {
        let persisted = match kind {
            EntityKind::User => self.users.persist() & self.posts.persist(),
            EntityKind::Post => self.posts.persist(),
        };
        if !persisted {
            warn!("{} change kept in memory only", kind);
        }
    }

    fn publish<T: Serialize>(&self, kind: EntityKind, action: EntityAction, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => {
                self.hub.publish(Event::entity(kind, action, value));
            }
            Err(e) => warn!("Dropped {}-{} event: {}", kind, action, e),
        }
    }


    pub fn persist_all(&self) -> bool {
        let users = self.users.persist();
        let posts = self.posts.persist();
        let snapshots = self.snapshots.persist();
        users && posts && snapshots
    }

    /// Stops expiry timers and observers. Pending deletes stay persisted.
    pub fn shutdown(&self) {
        let cancelled = self.snapshots.shutdown();
        let closed = self.hub.close_all();
        self.persist_all();
        info!(
            "MutationService stopped: {} timers cancelled, {} observers closed",
            cancelled, closed
        );
    }
}
