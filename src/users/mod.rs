pub mod dto;
pub mod error;
pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod notify;
pub mod policy;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod tokens;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::me_routes())
        .merge(handlers::admin_routes())
}
