use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::infra::app_state::{ResultState, VoteState};

pub async fn vote_health(State(state): State<VoteState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "instance": &*state.instance,
    }))
}

pub async fn result_health(State(state): State<ResultState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "viewers": state.viewers.count(),
    }))
}
