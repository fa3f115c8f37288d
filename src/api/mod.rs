//! REST API surface for logging control and run history (spec §F).
//!
//! The live-diagnostics push channel (WebSocket) and report rendering (PDF)
//! are out of scope for this crate — see [`crate::live`] for the engine that
//! would feed such a channel.

pub mod handlers;
mod routes;

pub use handlers::ApiState;
pub use routes::api_routes;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
