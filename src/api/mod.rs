pub mod health;
pub mod portfolio;
pub mod trades;

use crate::AppState;
use axum::Router;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api", trades::router())
        .nest("/api/portfolio", portfolio::router())
}
