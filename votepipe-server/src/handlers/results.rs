use axum::{extract::State, response::Html};

use crate::{infra::app_state::ResultState, views};

pub async fn show_results(State(state): State<ResultState>) -> Html<String> {
    Html(views::results_page(&state.ballot))
}
