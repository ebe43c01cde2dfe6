use axum::Router;
use tower_http::cors::CorsLayer;

use crate::routes::{analysis, health, portfolio};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest("/api/portfolio-analysis", analysis::router())
        .nest("/api/portfolio", portfolio::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
