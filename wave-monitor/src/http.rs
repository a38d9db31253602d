use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;
use wave_core::AlertId;
use wave_core::protocol::{Command, MAX_MESSAGE_CHARS, truncate_message};

use crate::journal::Acknowledgement;
use crate::session::{SendError, SessionHandle};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub id: AlertId,
    pub outcome: AckOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    Acknowledged,
    AlreadyAcknowledged,
    NotFound,
}

impl From<Acknowledgement> for AckOutcome {
    fn from(ack: Acknowledgement) -> Self {
        match ack {
            Acknowledgement::Acknowledged => AckOutcome::Acknowledged,
            Acknowledgement::AlreadyAcknowledged => AckOutcome::AlreadyAcknowledged,
            Acknowledgement::NotFound => AckOutcome::NotFound,
        }
    }
}

pub fn router(session: SessionHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/alerts", get(list_alerts).delete(clear_alerts))
        .route("/alerts/{id}", get(get_alert))
        .route("/alerts/{id}/ack", post(acknowledge_alert))
        .route("/commands", post(send_command))
        .route("/events", get(events))
        .with_state(session)
}

fn error_response(status: StatusCode, message: String) -> Response {
    let api_response = ApiResponse::<()> {
        success: false,
        data: None,
        message: Some(message),
    };
    (status, Json(api_response)).into_response()
}

fn success_response<T: Serialize>(status: StatusCode, data: T, message: Option<String>) -> Response {
    let api_response = ApiResponse {
        success: true,
        data: Some(data),
        message,
    };
    (status, Json(api_response)).into_response()
}

async fn health() -> &'static str {
    "OK"
}

async fn status(State(session): State<SessionHandle>) -> Response {
    let snapshot = session.state().snapshot().await;
    success_response(StatusCode::OK, snapshot, None)
}

async fn list_alerts(State(session): State<SessionHandle>) -> Response {
    let alerts = session.state().alerts().await;
    success_response(StatusCode::OK, alerts, None)
}

async fn get_alert(Path(id): Path<u64>, State(session): State<SessionHandle>) -> Response {
    let id = AlertId(id);
    match session.state().alert(id).await {
        Some(entry) => success_response(StatusCode::OK, entry, None),
        None => error_response(StatusCode::NOT_FOUND, format!("Alert {id} not found")),
    }
}

async fn clear_alerts(State(session): State<SessionHandle>) -> Response {
    let removed = session.state().clear_journal().await;
    success_response(
        StatusCode::OK,
        removed,
        Some(format!("{removed} alerts cleared")),
    )
}

async fn acknowledge_alert(
    Path(id): Path<u64>,
    State(session): State<SessionHandle>,
) -> Response {
    let id = AlertId(id);
    match session.acknowledge_alert(id).await {
        Ok(ack) => success_response(
            StatusCode::OK,
            AckResponse {
                id,
                outcome: ack.into(),
            },
            None,
        ),
        // acknowledged, but the stop command could not be queued
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn send_command(
    State(session): State<SessionHandle>,
    Json(command): Json<Command>,
) -> Response {
    let (command, warning) = fit_message(command);

    match session.send(&command) {
        Ok(()) => success_response(StatusCode::ACCEPTED, command, warning),
        Err(e @ SendError::Invalid(_)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e @ (SendError::SessionClosed | SendError::Busy)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// Long messages are cut to what the device stores, with a warning.
fn fit_message(command: Command) -> (Command, Option<String>) {
    let text = match command {
        Command::SetMessage { text } => text,
        other => return (other, None),
    };

    match truncate_message(&text) {
        (kept, true) => {
            warn!(length = text.chars().count(), "Message truncated");
            let warning = format!("Message truncated to {MAX_MESSAGE_CHARS} characters");
            (
                Command::SetMessage {
                    text: kept.to_owned(),
                },
                Some(warning),
            )
        }
        (_, false) => (Command::SetMessage { text }, None),
    }
}

async fn events(
    State(session): State<SessionHandle>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = session.state().subscribe();

    // lagged subscribers skip what they missed
    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        let update = result.ok()?;
        let payload = serde_json::to_string(&update).ok()?;
        Some(Ok(Event::default().event("update").data(payload)))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
