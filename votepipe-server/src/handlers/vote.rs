use axum::{
    Form,
    extract::State,
    http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, SET_COOKIE},
    },
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use votepipe_model::VoterId;

use crate::{
    infra::{
        app_state::VoteState,
        errors::{AppError, AppResult},
    },
    views,
};

pub const VOTER_COOKIE: &str = "voter_id";

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    pub vote: Option<String>,
}

/// Identity carried in the request's `voter_id` cookie, if any.
pub fn voter_from_cookies(headers: &HeaderMap) -> Option<VoterId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == VOTER_COOKIE)
        .and_then(|(_, value)| VoterId::parse(value.trim()).ok())
}

fn voter_cookie(voter: &VoterId) -> AppResult<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{VOTER_COOKIE}={voter}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .map_err(|_| AppError::bad_request("voter_id cookie is not a valid header value"))
}

/// Render the ballot. A client without an identity gets one here so that
/// every later submission from this browser shares it.
pub async fn show_ballot(
    State(state): State<VoteState>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let voter = voter_from_cookies(&headers).unwrap_or_else(VoterId::mint);
    let page = views::ballot_page(&state.ballot, &state.instance, None);
    Ok(([(SET_COOKIE, voter_cookie(&voter)?)], Html(page)).into_response())
}

pub async fn submit_vote(
    State(state): State<VoteState>,
    headers: HeaderMap,
    Form(form): Form<VoteForm>,
) -> AppResult<Response> {
    let raw = form.vote.unwrap_or_default();
    let receipt = state
        .intake
        .submit(&raw, voter_from_cookies(&headers))
        .await?;

    if receipt.minted {
        tracing::debug!(voter_id = %receipt.voter_id, "minted identity for cookieless submission");
    }
    let page = views::ballot_page(&state.ballot, &state.instance, Some(receipt.vote));
    Ok((
        [(SET_COOKIE, voter_cookie(&receipt.voter_id)?)],
        Html(page),
    )
        .into_response())
}
