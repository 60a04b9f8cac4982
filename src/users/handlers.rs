use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    state::AppState,
    users::{
        dto::{
            Pagination, RegisterRequest, ResetPasswordRequest, RoleChangeRequest, SearchQuery,
            UnlockResponse, UserPage, UserResponse, VerificationResponse,
        },
        error::UserError,
        repo_types::{ProfileChanges, UserFilter},
        services::{page_bounds, AccountService},
    },
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/verify-email/:user_id/:token", get(verify_email))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me).put(update_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/search", get(search_users))
        .route("/users/:id", get(get_user).put(update_user))
        .route("/users/:id/unlock", post(unlock_user))
        .route("/users/:id/reset-password", post(reset_password))
        .route("/users/:id/role", put(change_role))
        .route("/verify-email/:user_id/resend", post(resend_verification))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), UserError> {
    let user = AccountService::from_state(&state)
        .register(payload.into())
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), UserError> {
    let user = AccountService::from_state(&state)
        .create_user(auth.role, payload.into())
        .await?;
    info!(actor = %auth.id, user_id = %user.id, "user created by admin");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, token))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path((user_id, token)): Path<(Uuid, String)>,
) -> Result<Json<VerificationResponse>, UserError> {
    let status = AccountService::from_state(&state)
        .verify_email_with_token(user_id, &token)
        .await?;
    Ok(Json(VerificationResponse { status }))
}

#[instrument(skip(state))]
pub async fn resend_verification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, UserError> {
    auth.require_manager()?;
    AccountService::from_state(&state)
        .resend_verification(auth.role, user_id)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, UserError> {
    let user = AccountService::from_state(&state).get(auth.id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, changes))]
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(changes): Json<ProfileChanges>,
) -> Result<Json<UserResponse>, UserError> {
    let user = AccountService::from_state(&state)
        .apply_profile_update(auth.id, changes)
        .await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<UserPage>, UserError> {
    auth.require_manager()?;
    search_page(
        &state,
        UserFilter {
            skip: p.skip,
            limit: p.limit,
            ..Default::default()
        },
    )
    .await
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<SearchQuery>,
) -> Result<Json<UserPage>, UserError> {
    auth.require_manager()?;
    search_page(&state, q.into()).await
}

async fn search_page(state: &AppState, filter: UserFilter) -> Result<Json<UserPage>, UserError> {
    let (skip, limit) = page_bounds(filter.skip, filter.limit);
    let (users, total) = AccountService::from_state(state).search(filter).await?;
    Ok(Json(UserPage {
        items: users.into_iter().map(UserResponse::from).collect(),
        total,
        skip,
        limit,
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, UserError> {
    auth.require_manager()?;
    let user = AccountService::from_state(&state).get(id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, changes))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(changes): Json<ProfileChanges>,
) -> Result<Json<UserResponse>, UserError> {
    auth.require_manager()?;
    let user = AccountService::from_state(&state)
        .update_user(auth.role, id, changes)
        .await?;
    info!(actor = %auth.id, user_id = %id, "user updated by manager");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn unlock_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UnlockResponse>, UserError> {
    auth.require_manager()?;
    let unlocked = AccountService::from_state(&state).unlock_account(auth.role, id).await?;
    Ok(Json(UnlockResponse { unlocked }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode, UserError> {
    auth.require_manager()?;
    AccountService::from_state(&state)
        .reset_password(auth.role, id, &payload.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn change_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleChangeRequest>,
) -> Result<Json<UserResponse>, UserError> {
    auth.require_manager()?;
    let user = AccountService::from_state(&state)
        .change_role(auth.role, id, payload.role)
        .await?;
    Ok(Json(user.into()))
}
