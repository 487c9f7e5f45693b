//! Live Session Abstractions
//!
//! This module defines the provider-agnostic surface of a remote live-agent
//! session: the content model exchanged with the model, the events it emits,
//! and the [`LiveRunner`] seam that opens a session. A session always comes
//! back as a [`LiveSession`], which pairs its event stream with its input
//! sink so the two can never be obtained or released independently.

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::{fmt, pin::Pin, sync::Arc, sync::Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// The response modality requested from the remote model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Text,
    Audio,
}

impl Modality {
    /// Maps a connection flag to a modality. Only the exact string `"true"`
    /// selects audio.
    pub fn from_flag(flag: &str) -> Self {
        if flag == "true" {
            Modality::Audio
        } else {
            Modality::Text
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Text => write!(f, "TEXT"),
            Modality::Audio => write!(f, "AUDIO"),
        }
    }
}

/// The author of a [`Content`] turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Raw binary data tagged with a MIME type, e.g. `audio/pcm;rate=24000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A single piece of a content turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineData(Blob),
}

/// An ordered list of parts authored by one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    /// Builds a single-part user turn carrying `text`.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn first_part(&self) -> Option<&Part> {
        self.parts.first()
    }
}

/// One unit produced by a live session's output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveEvent {
    pub content: Option<Content>,
    /// Set on incremental text chunks that will later be repeated in full.
    pub partial: bool,
    pub turn_complete: bool,
    pub interrupted: bool,
}

impl LiveEvent {
    /// The first part of the event's content, if it has any.
    pub fn first_part(&self) -> Option<&Part> {
        self.content.as_ref().and_then(Content::first_part)
    }
}

/// A stream of events from the remote session. It ends when the remote side
/// closes the session.
pub type LiveEventStream = Pin<Box<dyn Stream<Item = Result<LiveEvent>> + Send>>;

/// A request forwarded from the application to the remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveRequest {
    /// A discrete content turn.
    Content(Content),
    /// A realtime media chunk, streamed without turn boundaries.
    Realtime(Blob),
    /// No further input will arrive.
    Close,
}

/// Returned when sending into an input sink that has already been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("live request queue is closed")]
pub struct QueueClosed;

/// The input side of a live session.
pub trait InputSink: Send + Sync {
    /// Submits a discrete content turn.
    fn send_content(&self, content: Content) -> Result<(), QueueClosed>;

    /// Submits a realtime media chunk.
    fn send_realtime(&self, blob: Blob) -> Result<(), QueueClosed>;

    /// Signals that no further input will arrive.
    ///
    /// Closing is idempotent: it returns `true` only for the call that
    /// actually closed the sink, and later calls have no side effects.
    fn close(&self) -> bool;
}

/// The standard [`InputSink`]: an unbounded queue of [`LiveRequest`]s drained
/// by the provider's writer task.
#[derive(Debug)]
pub struct LiveRequestQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<LiveRequest>>>,
}

impl LiveRequestQueue {
    /// Creates a queue together with the receiver the provider drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LiveRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn send(&self, request: LiveRequest) -> Result<(), QueueClosed> {
        let guard = self.tx.lock().map_err(|_| QueueClosed)?;
        let tx = guard.as_ref().ok_or(QueueClosed)?;
        tx.send(request).map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().map(|tx| tx.is_none()).unwrap_or(true)
    }
}

impl InputSink for LiveRequestQueue {
    fn send_content(&self, content: Content) -> Result<(), QueueClosed> {
        self.send(LiveRequest::Content(content))
    }

    fn send_realtime(&self, blob: Blob) -> Result<(), QueueClosed> {
        self.send(LiveRequest::Realtime(blob))
    }

    fn close(&self) -> bool {
        let Ok(mut guard) = self.tx.lock() else {
            return false;
        };
        match guard.take() {
            Some(tx) => {
                // The receiver may already be gone if the provider hung up first.
                let _ = tx.send(LiveRequest::Close);
                debug!("Live request queue closed.");
                true
            }
            None => false,
        }
    }
}

/// A live connection to the remote agent: its event stream and input sink,
/// always created together.
pub struct LiveSession {
    pub user_id: String,
    pub modality: Modality,
    pub events: LiveEventStream,
    pub input: Arc<dyn InputSink>,
}

impl LiveSession {
    pub fn new(
        user_id: impl Into<String>,
        modality: Modality,
        events: LiveEventStream,
        input: Arc<dyn InputSink>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            modality,
            events,
            input,
        }
    }
}

/// Dropping a session releases its input, so a session abandoned before it
/// was ever relayed still tells the remote side that no input will follow.
impl Drop for LiveSession {
    fn drop(&mut self) {
        if self.input.close() {
            debug!(user_id = %self.user_id, "Live session dropped with open input.");
        }
    }
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession")
            .field("user_id", &self.user_id)
            .field("modality", &self.modality)
            .finish_non_exhaustive()
    }
}

/// Opens live sessions against a remote agent runtime.
///
/// This is the seam between the relay and the provider: production code uses
/// the Gemini Live implementation, tests substitute in-memory fakes.
#[async_trait]
pub trait LiveRunner: Send + Sync {
    /// Establishes a remote session for `user_id` answering in `modality`.
    ///
    /// Fails if the remote session cannot be created. Implementations do not
    /// retry.
    async fn open(&self, user_id: &str, modality: Modality) -> Result<LiveSession>;
}
