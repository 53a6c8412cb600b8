use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::app::AppState;
use crate::core::error::PostboardError;
use crate::service::{LoginRequest, LoginResponse, NewPost, NewUser, PostUpdate, UndoRequest, UserUpdate};
use crate::storage::models::{EntityKind, PostId, PostRecord, PublicUser, UserId};
use crate::undo::models::DeleteOutcome;


type ApiResult<T> = Result<T, ApiError>;
type JsonBody<T> = Result<Json<T>, JsonRejection>;


/// Runs a mutation on the blocking pool; mutations hash passwords and
/// write the store to disk before they return.
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> ApiResult<T>
where
    F: FnOnce(&AppState) -> crate::core::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(PostboardError::from)?;
    Ok(result?)
}


#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub undo_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<DeleteOutcome> for DeleteResponse {
    fn from(outcome: DeleteOutcome) -> Self {
        Self {
            success: true,
            undo_token: outcome.undo_handle,
            expires_at: outcome.expires_at,
        }
    }
}


#[derive(Debug, Serialize)]
pub struct UndoResponse {
    pub restored: EntityKind,
    pub id: u64,
}


pub async fn login(
    State(state): State<Arc<AppState>>,
    body: JsonBody<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(request) = body?;
    let response = blocking(&state, move |s| s.service.login(request)).await?;
    Ok(Json(response))
}


pub async fn list_users(State(state): State<Arc<AppState>>) -> Json<Vec<PublicUser>> {
    Json(state.service.list_users())
}


pub async fn create_user(
    State(state): State<Arc<AppState>>,
    body: JsonBody<NewUser>,
) -> ApiResult<(StatusCode, Json<PublicUser>)> {
    let Json(request) = body?;
    let user = blocking(&state, move |s| s.service.create_user(request)).await?;
    Ok((StatusCode::CREATED, Json(user.public())))
}


pub async fn get_user(
    State(state): State<Arc<AppState>>,
    id: Result<Path<UserId>, PathRejection>,
) -> ApiResult<Json<PublicUser>> {
    let Path(id) = id?;
    Ok(Json(state.service.get_user(id)?))
}


pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    id: Result<Path<UserId>, PathRejection>,
    body: JsonBody<UserUpdate>,
) -> ApiResult<Json<PublicUser>> {
    let Path(id) = id?;
    let Json(update) = body?;
    let user = blocking(&state, move |s| s.service.update_user(&actor, id, update)).await?;
    Ok(Json(user.public()))
}


pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    id: Result<Path<UserId>, PathRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let Path(id) = id?;
    let outcome = blocking(&state, move |s| s.service.delete_user(&actor, id)).await?;
    Ok(Json(outcome.into()))
}


pub async fn list_posts(State(state): State<Arc<AppState>>) -> Json<Vec<PostRecord>> {
    Json(state.service.list_posts())
}


pub async fn create_post(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    body: JsonBody<NewPost>,
) -> ApiResult<(StatusCode, Json<PostRecord>)> {
    let Json(request) = body?;
    let post = blocking(&state, move |s| s.service.create_post(&actor, request)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}


pub async fn get_post(
    State(state): State<Arc<AppState>>,
    id: Result<Path<PostId>, PathRejection>,
) -> ApiResult<Json<PostRecord>> {
    let Path(id) = id?;
    Ok(Json(state.service.get_post(id)?))
}


pub async fn update_post(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    id: Result<Path<PostId>, PathRejection>,
    body: JsonBody<PostUpdate>,
) -> ApiResult<Json<PostRecord>> {
    let Path(id) = id?;
    let Json(update) = body?;
    let post = blocking(&state, move |s| s.service.update_post(&actor, id, update)).await?;
    Ok(Json(post))
}


pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    id: Result<Path<PostId>, PathRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let Path(id) = id?;
    let outcome = blocking(&state, move |s| s.service.delete_post(&actor, id)).await?;
    Ok(Json(outcome.into()))
}


pub async fn undo(
    State(state): State<Arc<AppState>>,
    body: JsonBody<UndoRequest>,
) -> ApiResult<Json<UndoResponse>> {
    let Json(request) = body?;
    let handle = request
        .undo_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PostboardError::validation("undoToken is required"))?;

    let outcome = blocking(&state, move |s| s.service.undo(&handle)).await?;
    Ok(Json(UndoResponse {
        restored: outcome.kind,
        id: outcome.restored_id,
    }))
}
