use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{
    handlers::{health, results, vote, websocket},
    infra::app_state::{ResultState, VoteState},
};

pub fn vote_router(state: VoteState) -> Router {
    Router::new()
        .route("/", get(vote::show_ballot).post(vote::submit_vote))
        .route("/healthz", get(health::vote_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn result_router(state: ResultState) -> Router {
    Router::new()
        .route("/", get(results::show_results))
        .route("/ws", get(websocket::websocket_handler))
        .route("/healthz", get(health::result_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
