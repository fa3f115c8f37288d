//! API route definitions.
//!
//! - POST   /api/logging/start
//! - POST   /api/logging/stop
//! - GET    /api/history
//! - GET    /api/history/{id}/insights
//! - DELETE /api/history/{id}
//! - GET    /api/history/{id}/export

use axum::routing::{delete, get, post};
use axum::Router;

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/logging/start", post(handlers::start_logging))
        .route("/logging/stop", post(handlers::stop_logging))
        .route("/history", get(handlers::list_history))
        .route("/history/:id/insights", get(handlers::get_insights))
        .route("/history/:id", delete(handlers::delete_run))
        .route("/history/:id/export", get(handlers::export_run))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::HistoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> ApiState {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = HistoryStore::open(dir.path()).expect("open history store");
        std::mem::forget(dir);
        ApiState {
            pipeline: Arc::new(crate::pipeline::PipelineState::new(history)),
        }
    }

    #[tokio::test]
    async fn list_history_empty_ok() {
        let app = api_routes(test_state());
        let response = app
            .oneshot(Request::builder().uri("/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stop_without_start_is_conflict() {
        let app = api_routes(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/logging/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
