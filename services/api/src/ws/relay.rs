//! The bidirectional relay between a client WebSocket and a live session.
//!
//! Two pumps run concurrently for every connection:
//!
//! - the outbound pump drains the session's event stream and writes the
//!   translated wire messages to the client;
//! - the inbound pump reads client frames and forwards them to the session's
//!   input sink.
//!
//! [`run_relay`] races the two. Whichever finishes first decides the outcome,
//! the other is cancelled, and the input sink is closed exactly once.

use super::protocol::{ClientFrame, MediaType, ServerMessage};
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info};
use vidur_core::{Blob, Content, InputSink, LiveEvent, LiveSession, Part, QueueClosed};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything that can end a relayed connection.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("client transport failed: {0}")]
    Transport(#[source] BoxError),
    #[error("malformed client frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    #[error("Mime type not supported: {0}")]
    UnsupportedMediaType(String),
    #[error("invalid base64 audio payload: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
    #[error("binary frames are not supported; send JSON text frames")]
    UnexpectedBinaryFrame,
    #[error("live session failed: {0:#}")]
    Upstream(anyhow::Error),
    #[error("live session input is closed")]
    SessionClosed(#[from] QueueClosed),
}

/// Translates one session event into the message the client should see, if
/// any.
///
/// Turn boundaries win over content. Otherwise only the first content part is
/// considered: PCM audio is forwarded, text only while it is still partial
/// (the final text repeats what the partials already delivered).
pub fn translate_event(event: &LiveEvent) -> Option<ServerMessage> {
    if event.turn_complete || event.interrupted {
        return Some(ServerMessage::TurnStatus {
            turn_complete: event.turn_complete,
            interrupted: event.interrupted,
        });
    }

    match event.first_part()? {
        Part::InlineData(blob)
            if blob.mime_type.starts_with(MediaType::AudioPcm.as_str()) && !blob.data.is_empty() =>
        {
            Some(ServerMessage::audio(&blob.data))
        }
        Part::Text(text) if event.partial && !text.is_empty() => {
            Some(ServerMessage::text(text.clone()))
        }
        _ => None,
    }
}

/// Serializes a `ServerMessage` and writes it to the client as a text frame.
pub(crate) async fn send_msg<S>(client_tx: &mut S, msg: &ServerMessage) -> Result<(), RelayError>
where
    S: Sink<Message> + Unpin,
    S::Error: Into<BoxError>,
{
    let serialized = serde_json::to_string(msg).map_err(|e| RelayError::Transport(e.into()))?;
    client_tx
        .send(Message::Text(serialized.into()))
        .await
        .map_err(|e| RelayError::Transport(e.into()))
}

/// Session to client. Runs until the event stream ends or fails, or a write
/// to the client fails. Preserves event order.
pub async fn pump_outbound<E, S>(events: &mut E, client_tx: &mut S) -> Result<(), RelayError>
where
    E: Stream<Item = anyhow::Result<LiveEvent>> + Unpin,
    S: Sink<Message> + Unpin,
    S::Error: Into<BoxError>,
{
    while let Some(event) = events.next().await {
        let event = event.map_err(RelayError::Upstream)?;
        let Some(msg) = translate_event(&event) else {
            continue;
        };
        send_msg(client_tx, &msg).await?;
        match &msg {
            ServerMessage::TurnStatus {
                turn_complete,
                interrupted,
            } => info!(turn_complete, interrupted, "[AGENT TO CLIENT] turn status"),
            ServerMessage::Media {
                mime_type: MediaType::AudioPcm,
                data,
            } => debug!(encoded_len = data.len(), "[AGENT TO CLIENT] audio/pcm"),
            ServerMessage::Media { data, .. } => {
                info!(text = %data, "[AGENT TO CLIENT] text/plain")
            }
        }
    }
    info!("Live event stream ended.");
    Ok(())
}

fn forward_frame(frame: ClientFrame, input: &dyn InputSink) -> Result<(), RelayError> {
    match frame {
        ClientFrame::Text(text) => {
            info!(text = %text, "[CLIENT TO AGENT] text/plain");
            input.send_content(Content::user_text(text))?;
        }
        ClientFrame::Audio(pcm) => {
            debug!(bytes = pcm.len(), "[CLIENT TO AGENT] audio/pcm");
            input.send_realtime(Blob {
                mime_type: MediaType::AudioPcm.as_str().to_string(),
                data: pcm,
            })?;
        }
    }
    Ok(())
}

/// Client to session. Runs until the client closes or disconnects, or a
/// frame cannot be handled. Any malformed frame ends the pump.
pub async fn pump_inbound<R, E>(client_rx: &mut R, input: &dyn InputSink) -> Result<(), RelayError>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Into<BoxError>,
{
    while let Some(msg) = client_rx.next().await {
        match msg.map_err(|e| RelayError::Transport(e.into()))? {
            Message::Text(text) => forward_frame(ClientFrame::parse(text.as_str())?, input)?,
            Message::Binary(_) => return Err(RelayError::UnexpectedBinaryFrame),
            Message::Close(frame) => {
                info!(?frame, "Client sent close frame.");
                return Ok(());
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    info!("Client stream ended.");
    Ok(())
}

/// Relays one connection until either pump finishes.
///
/// Both pumps are polled from the calling task. The first to complete
/// governs the result; the other is dropped at its current suspension point.
/// The session input is closed exactly once on every exit path.
pub async fn run_relay<S, R, E>(
    client_tx: &mut S,
    client_rx: &mut R,
    mut session: LiveSession,
) -> Result<(), RelayError>
where
    S: Sink<Message> + Unpin,
    S::Error: Into<BoxError>,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Into<BoxError>,
{
    let input = session.input.clone();

    let outcome = tokio::select! {
        result = pump_outbound(&mut session.events, client_tx) => {
            debug!(ok = result.is_ok(), "Agent-to-client pump finished first.");
            result
        }
        result = pump_inbound(client_rx, input.as_ref()) => {
            debug!(ok = result.is_ok(), "Client-to-agent pump finished first.");
            result
        }
    };

    if input.close() {
        debug!("Live request queue closed.");
    }
    outcome
}
