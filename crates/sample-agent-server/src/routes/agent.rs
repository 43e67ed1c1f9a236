use crate::{error::ApiError, state::AppState};
use axum::{
    extract::State,
    http::{self, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use sample_agent::models::{message::Message, role::Role};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    thread_id: Option<String>,
    messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    id: Option<String>,
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    thread_id: String,
    reply: Message,
    messages: Vec<Message>,
}

// Custom SSE response type that implements the Vercel AI SDK data stream protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = axum::body::Body::from_stream(self);

        let mut response = Response::new(body);
        let headers = response.headers_mut();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(
            http::header::CACHE_CONTROL,
            http::HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            http::header::CONNECTION,
            http::HeaderValue::from_static("keep-alive"),
        );
        headers.insert(
            "x-vercel-ai-data-stream",
            http::HeaderValue::from_static("v1"),
        );
        response
    }
}

/// Turn client messages into conversation messages.
///
/// System messages are dropped since the agent owns its instructions. Tool
/// messages are echoes of results the session already holds, so they are
/// dropped too. Any other role the conversation does not know is a client error.
fn convert_messages(incoming: Vec<IncomingMessage>) -> Result<Vec<Message>, ApiError> {
    let mut messages = Vec::new();

    for msg in incoming {
        let message = match msg.role.as_str() {
            "user" => Message::user().with_text(&msg.content),
            "assistant" => Message::assistant().with_text(&msg.content),
            "system" => {
                tracing::warn!("Ignoring client supplied system message");
                continue;
            }
            "tool" => {
                tracing::debug!(id = ?msg.id, "Ignoring echoed tool message");
                continue;
            }
            other => {
                return Err(ApiError::BadRequest(format!("Unsupported role: {}", other)));
            }
        };

        messages.push(match msg.id {
            Some(id) => message.with_id(id),
            None => message,
        });
    }

    if messages.is_empty() {
        return Err(ApiError::BadRequest(
            "Request contains no user or assistant messages".to_string(),
        ));
    }

    Ok(messages)
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_else(|_| String::new());
        format!("0:{}\n", encoded_text)
    }

    fn format_tool_call(id: &str, name: &str, args: &Value) -> String {
        let tool_call = json!({
            "toolCallId": id,
            "toolName": name,
            "args": args
        });
        format!("9:{}\n", tool_call)
    }

    fn format_tool_response(id: &str, result: &str) -> String {
        let response = json!({
            "toolCallId": id,
            "result": result,
        });
        format!("a:{}\n", response)
    }

    fn format_error(error: &str) -> String {
        let encoded = serde_json::to_string(error).unwrap_or_else(|_| String::new());
        format!("3:{}\n", encoded)
    }

    fn format_finish(reason: &str) -> String {
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            }
        });
        format!("d:{}\n", finish)
    }
}

async fn stream_message(
    message: &Message,
    tx: &mpsc::Sender<String>,
) -> Result<(), mpsc::error::SendError<String>> {
    match message.role {
        Role::Assistant => {
            for request in message.tool_requests() {
                tx.send(ProtocolFormatter::format_tool_call(
                    &request.id,
                    &request.tool_call.name,
                    &request.tool_call.arguments,
                ))
                .await?;
            }
            for line in message.text().lines() {
                let modified_line = format!("{}\n", line);
                tx.send(ProtocolFormatter::format_text(&modified_line))
                    .await?;
            }
        }
        Role::Tool => {
            let id = message.tool_call_id.as_deref().unwrap_or_default();
            tx.send(ProtocolFormatter::format_tool_response(id, message.text()))
                .await?;
        }
        // the agent only produces assistant and tool messages
        Role::User | Role::System => {}
    }
    Ok(())
}

async fn run(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let thread_id = request
        .thread_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let messages = convert_messages(request.messages)?;

    let turn = state.agent.respond(&thread_id, messages, |_| {}).await?;

    Ok(Json(RunResponse {
        thread_id,
        reply: turn.reply,
        messages: turn.messages,
    }))
}

async fn stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, ApiError> {
    let thread_id = request
        .thread_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let messages = convert_messages(request.messages)?;

    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    tokio::spawn(async move {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Message>();
        let run = state.agent.respond(&thread_id, messages, move |message| {
            let _ = events_tx.send(message.clone());
        });
        tokio::pin!(run);

        // None when the client went away; dropping `run` cancels it before it saves
        let outcome = loop {
            tokio::select! {
                result = &mut run => break Some(result),
                Some(message) = events_rx.recv() => {
                    if let Err(e) = stream_message(&message, &tx).await {
                        tracing::error!("Error sending message through channel: {}", e);
                        break None;
                    }
                }
                _ = tx.closed() => break None,
            }
        };

        let Some(result) = outcome else {
            tracing::info!(thread_id = %thread_id, "client disconnected, run cancelled");
            return;
        };

        while let Ok(message) = events_rx.try_recv() {
            if stream_message(&message, &tx).await.is_err() {
                return;
            }
        }

        match result {
            Ok(_) => {
                let _ = tx.send(ProtocolFormatter::format_finish("stop")).await;
            }
            Err(e) => {
                tracing::error!(thread_id = %thread_id, error = %e, "streamed run failed");
                let _ = tx.send(ProtocolFormatter::format_error(&e.to_string())).await;
                let _ = tx.send(ProtocolFormatter::format_finish("error")).await;
            }
        }
    });

    Ok(SseResponse::new(stream))
}

async fn info(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "agents": [{
                "name": state.name,
                "description": state.description,
            }]
        })),
    )
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/copilotkit", post(run))
        .route("/copilotkit/stream", post(stream))
        .route("/copilotkit/info", get(info).post(info))
        .with_state(state)
}
