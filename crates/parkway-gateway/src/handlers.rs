use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use parkway_db::User;
use parkway_db::user_store::DEFAULT_LIST_LIMIT;
use parkway_security::InputValidator;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::SharedState;

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct UserPayload {
    pub name: String,
    pub mail: String,
}

impl UserPayload {
    fn validated(&self) -> ApiResult<(String, String)> {
        let name = InputValidator::validate_name(&self.name)?;
        let mail = InputValidator::validate_mail(&self.mail)?;
        Ok((name, mail))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub name: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn hello(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "message": format!("Hello from {}!", state.config.app_name) }))
}

pub async fn list_users(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<User>>> {
    let users = state.users.list(
        params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        params.offset.unwrap_or(0),
    )?;
    Ok(Json(users))
}

pub async fn search_users(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<User>>> {
    let pattern = InputValidator::sanitize(params.name.trim());
    Ok(Json(state.users.search_by_name(&pattern)?))
}

pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    state
        .users
        .get(id)?
        .map(Json)
        .ok_or_else(|| parkway_common::Error::NotFound(format!("user {id}")).into())
}

pub async fn create_user(
    State(state): State<SharedState>,
    Json(payload): Json<UserPayload>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let (name, mail) = payload.validated()?;
    let user = state.users.create(&name, &mail)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(payload): Json<UserPayload>,
) -> ApiResult<Json<User>> {
    let (name, mail) = payload.validated()?;
    Ok(Json(state.users.update(id, &name, &mail)?))
}

pub async fn delete_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.users.delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}
