use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::{error, info, instrument};

use crate::{
    auth::{
        dto::{LoginRequest, TokenResponse},
        jwt::JwtKeys,
    },
    state::AppState,
    users::{error::UserError, services::AccountService},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, UserError> {
    let user = AccountService::from_state(&state)
        .login(&payload.email, &payload.password)
        .await?;

    let keys = JwtKeys::from_ref(&state);
    let access_token = match keys.sign_access(user.id, user.role) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "jwt sign access failed");
            return Err(UserError::Internal(e.to_string()));
        }
    };

    info!(user_id = %user.id, role = %user.role, "access token issued");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
        user: user.into(),
    }))
}
