use crate::{error::ApiError, state::AppState};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use sample_agent::models::message::Message;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    thread_id: String,
    messages: Vec<Message>,
}

// Unknown ids read as an empty conversation rather than a 404
async fn get_session(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let messages = state.agent.history(&thread_id).await?;
    Ok(Json(SessionResponse {
        thread_id,
        messages,
    }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions/:id", get(get_session))
        .with_state(state)
}
