//! Thin discovery HTTP surface (§10.6)
//!
//! Full REST CRUD over rooms is out of scope; these routes exist so a
//! curl call or a dashboard can answer "what's active" without opening a
//! socket. They call straight into the same [`crate::room::registry::RoomRegistry`]
//! queries the WebSocket layer uses and never duplicate that logic.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::health::{health, readiness};
use crate::state::AppState;
use crate::websocket::handler::ws_handler;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: String,
}

async fn active_rooms(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry().active_rooms().await {
        Ok(rooms) => Json(rooms).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn most_watched_rooms(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry().most_watched_rooms())
}

async fn search_rooms(State(state): State<AppState>, Query(params): Query<SearchParams>) -> impl IntoResponse {
    match state.registry().search(&params.q).await {
        Ok(rooms) => Json(rooms).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Assembles the full application router: health/readiness, room
/// discovery, and the `/ws` upgrade route, all sharing one [`AppState`].
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(readiness))
        .route("/rooms/active", get(active_rooms))
        .route("/rooms/most-watched", get(most_watched_rooms))
        .route("/rooms/search", get(search_rooms))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_route_responds_ok() {
        let app = router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn active_rooms_route_lists_the_canonical_room() {
        let app = router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/rooms/active").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn search_requires_a_query_parameter() {
        let app = router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/rooms/search").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
