//! Manages the WebSocket connection lifecycle: opening the live session for a
//! client, running the relay, and tearing everything down.

use super::relay::run_relay;
use crate::{error::ApiError, state::AppState};
use anyhow::{Context, Result};
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{Instrument, error, info, instrument};
use uuid::Uuid;
use vidur_core::{LiveRunner, LiveSession, Modality};

/// Query parameters accepted by the identified endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// `"true"` selects audio responses; anything else selects text.
    #[serde(default)]
    pub is_audio: String,
}

/// Opens a live session for `user_id`. Failures are propagated as-is; there
/// is no retry.
pub async fn start_agent_session(
    runner: &dyn LiveRunner,
    user_id: &str,
    modality: Modality,
) -> Result<LiveSession> {
    info!(%user_id, %modality, "Starting agent session.");
    runner
        .open(user_id, modality)
        .await
        .with_context(|| format!("Failed to start agent session for {}", user_id))
}

/// Axum handler for `/ws/{user_id}?is_audio=...`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let modality = Modality::from_flag(&params.is_audio);
    ws.on_upgrade(move |socket| handle_client_socket(socket, state, user_id, modality))
}

/// Handles one identified client: the session is opened after the upgrade,
/// so a failure simply closes the socket.
#[instrument(name = "ws_session", skip_all, fields(%user_id, %modality))]
async fn handle_client_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    user_id: String,
    modality: Modality,
) {
    info!("Client connected.");
    let session = match start_agent_session(state.runner.as_ref(), &user_id, modality).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = ?e, "Could not open live session.");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    relay_socket(socket, session).await;
    info!("Client disconnected.");
}

/// Axum handler for `/media-stream`: an anonymous audio call. The session is
/// opened before the upgrade so a failure is reported as an HTTP error.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let call_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("media_stream", %call_id);

    let session = async {
        info!("Media stream call connecting...");
        start_agent_session(state.runner.as_ref(), &call_id, Modality::Audio).await
    }
    .instrument(span.clone())
    .await
    .map_err(ApiError::Upstream)?;

    Ok(ws.on_upgrade(move |socket| {
        async move {
            info!("Media stream connection established.");
            relay_socket(socket, session).await;
            info!("Media stream call disconnected.");
        }
        .instrument(span)
    }))
}

/// Runs the relay over an accepted socket and closes it afterwards.
async fn relay_socket(socket: WebSocket, session: LiveSession) {
    let (mut socket_tx, mut socket_rx) = socket.split();
    match run_relay(&mut socket_tx, &mut socket_rx, session).await {
        Ok(()) => info!("Relay finished."),
        Err(e) => error!(error = %e, "Relay terminated with error."),
    }
    // The client may already be gone.
    let _ = socket_tx.send(Message::Close(None)).await;
}
