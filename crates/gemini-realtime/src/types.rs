//! Wire types for the Gemini Live `BidiGenerateContent` websocket protocol.
//!
//! Only the subset of the protocol the relay needs is modelled. Unknown server
//! fields are ignored during deserialization.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use vidur_core::{Blob, Content, LiveRequest, Modality, Part, Role};

/// Messages sent from this client to the Gemini server.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    ClientContent(ClientContent),
    RealtimeInput(RealtimeInput),
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<WireContent>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<WireContent>,
    pub turn_complete: bool,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<WireBlob>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub media_chunks: Vec<WireBlob>,
}

/// A content turn as it appears on the wire, in both directions.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<WireBlob>,
}

/// Binary data, base64-encoded on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireBlob {
    pub mime_type: String,
    pub data: String,
}

/// Messages received from the Gemini server.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<WireContent>,
    pub turn_complete: Option<bool>,
    pub interrupted: Option<bool>,
}

impl ClientMessage {
    /// Builds the setup message that opens a session.
    pub fn setup(model: &str, modality: Modality, system_instruction: String) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        ClientMessage::Setup(Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![modality],
            },
            system_instruction: (!system_instruction.is_empty()).then(|| WireContent {
                role: None,
                parts: vec![WirePart {
                    text: Some(system_instruction),
                    inline_data: None,
                }],
            }),
        })
    }

    /// Maps an application request to its wire message. `Close` has no wire
    /// representation; the caller closes the socket instead.
    pub fn from_request(request: LiveRequest) -> Option<Self> {
        match request {
            LiveRequest::Content(content) => Some(ClientMessage::ClientContent(ClientContent {
                turns: vec![WireContent::from(content)],
                turn_complete: true,
            })),
            LiveRequest::Realtime(blob) => {
                let wire = WireBlob::from(blob);
                let input = if wire.mime_type.starts_with("audio/") {
                    RealtimeInput {
                        audio: Some(wire),
                        ..Default::default()
                    }
                } else {
                    RealtimeInput {
                        media_chunks: vec![wire],
                        ..Default::default()
                    }
                };
                Some(ClientMessage::RealtimeInput(input))
            }
            LiveRequest::Close => None,
        }
    }
}

impl From<Blob> for WireBlob {
    fn from(blob: Blob) -> Self {
        Self {
            mime_type: blob.mime_type,
            data: BASE64.encode(blob.data),
        }
    }
}

impl TryFrom<WireBlob> for Blob {
    type Error = anyhow::Error;

    fn try_from(wire: WireBlob) -> Result<Self> {
        let data = BASE64
            .decode(wire.data.as_bytes())
            .with_context(|| format!("Invalid base64 payload for {}", wire.mime_type))?;
        Ok(Blob {
            mime_type: wire.mime_type,
            data,
        })
    }
}

impl From<Content> for WireContent {
    fn from(content: Content) -> Self {
        let role = match content.role {
            Role::User => "user",
            Role::Model => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: content
                .parts
                .into_iter()
                .map(|part| match part {
                    Part::Text(text) => WirePart {
                        text: Some(text),
                        inline_data: None,
                    },
                    Part::InlineData(blob) => WirePart {
                        text: None,
                        inline_data: Some(blob.into()),
                    },
                })
                .collect(),
        }
    }
}

impl TryFrom<WireContent> for Content {
    type Error = anyhow::Error;

    fn try_from(wire: WireContent) -> Result<Self> {
        let role = match wire.role.as_deref() {
            Some("user") => Role::User,
            _ => Role::Model,
        };
        let mut parts = Vec::with_capacity(wire.parts.len());
        for part in wire.parts {
            if let Some(blob) = part.inline_data {
                parts.push(Part::InlineData(blob.try_into()?));
            } else if let Some(text) = part.text {
                parts.push(Part::Text(text));
            }
        }
        Ok(Content { role, parts })
    }
}
