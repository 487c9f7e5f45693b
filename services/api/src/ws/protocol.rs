//! Defines the WebSocket message protocol between the client (browser or
//! telephony bridge) and the relay.
//!
//! Every frame is a JSON text frame. Media payloads carry a `mime_type` of
//! either `text/plain` or `audio/pcm`; audio is base64-encoded on the wire and
//! raw bytes everywhere else.

use super::relay::RelayError;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The media types understood on the client channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "text/plain")]
    TextPlain,
    #[serde(rename = "audio/pcm")]
    AudioPcm,
}

impl MediaType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaType::TextPlain => "text/plain",
            MediaType::AudioPcm => "audio/pcm",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text/plain" => Ok(MediaType::TextPlain),
            "audio/pcm" => Ok(MediaType::AudioPcm),
            other => Err(RelayError::UnsupportedMediaType(other.to_string())),
        }
    }
}

/// Messages sent from the server to the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Marks the end or interruption of a model turn. The channel stays open.
    TurnStatus {
        turn_complete: bool,
        interrupted: bool,
    },
    /// A chunk of model output.
    Media { mime_type: MediaType, data: String },
}

impl ServerMessage {
    /// A PCM audio chunk, base64-encoded for the wire.
    pub fn audio(pcm: &[u8]) -> Self {
        ServerMessage::Media {
            mime_type: MediaType::AudioPcm,
            data: BASE64.encode(pcm),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        ServerMessage::Media {
            mime_type: MediaType::TextPlain,
            data: text.into(),
        }
    }
}

#[derive(Deserialize)]
struct RawClientFrame {
    mime_type: String,
    data: String,
}

/// A decoded frame received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// User text, submitted as a discrete content turn.
    Text(String),
    /// Raw PCM audio, streamed as a realtime chunk.
    Audio(Vec<u8>),
}

impl ClientFrame {
    /// Parses a client text frame. Malformed JSON, a missing field, an
    /// unsupported `mime_type` or invalid base64 audio are all errors.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let raw: RawClientFrame = serde_json::from_str(text)?;
        match raw.mime_type.parse::<MediaType>()? {
            MediaType::TextPlain => Ok(ClientFrame::Text(raw.data)),
            MediaType::AudioPcm => Ok(ClientFrame::Audio(BASE64.decode(raw.data)?)),
        }
    }
}
