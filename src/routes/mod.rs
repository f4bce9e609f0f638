//! HTTP router.

use axum::Router;

use crate::{error::AppError, state::SharedState};

pub mod docs;
pub mod health;
pub mod leaderboard;
pub mod matches;
pub mod questions;
pub mod rooms;
pub mod sse;
pub mod users;

/// Compose all route trees under `/api`, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(rooms::router())
        .merge(matches::router())
        .merge(questions::router())
        .merge(leaderboard::router())
        .merge(users::router())
        .merge(sse::router())
        .fallback(not_found);

    let docs_router = docs::router(state.clone());

    Router::new()
        .nest("/api", api_router)
        .merge(docs_router)
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("no such route".into())
}
