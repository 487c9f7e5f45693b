//! Gemini Live session: connection setup, the request writer task, and the
//! event reader that turns server messages into [`LiveEvent`]s.

use crate::types::{ClientMessage, ServerContent, ServerMessage};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt, stream};
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, protocol::Message as WsMessage},
};
use tracing::{Instrument, debug, error, info, warn};
use vidur_core::{
    Content, LiveEvent, LiveEventStream, LiveRequest, LiveRequestQueue, LiveRunner, LiveSession,
    Modality, Part, Role, agent::AgentConfig,
};

pub const DEFAULT_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Opens live sessions against the Gemini Live API.
#[derive(Clone)]
pub struct GeminiLiveRunner {
    api_key: String,
    base_url: String,
    agent: AgentConfig,
}

impl GeminiLiveRunner {
    pub fn new(api_key: impl Into<String>, agent: AgentConfig) -> Self {
        // tokio-tungstenite's rustls connector needs a process-wide provider.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_LIVE_URL.to_string(),
            agent,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}?key={}", self.base_url, self.api_key)
    }
}

#[async_trait]
impl LiveRunner for GeminiLiveRunner {
    async fn open(&self, user_id: &str, modality: Modality) -> Result<LiveSession> {
        let (ws_stream, _) = connect_async(self.endpoint())
            .await
            .context("Failed to connect to Gemini Live WebSocket")?;
        info!(
            %user_id,
            %modality,
            model = %self.agent.model,
            "Connected to Gemini Live WebSocket."
        );
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let setup = ClientMessage::setup(
            &self.agent.model,
            modality,
            self.agent.system_instruction(),
        );
        ws_tx
            .send(WsMessage::Text(serde_json::to_string(&setup)?.into()))
            .await
            .context("Failed to send Gemini setup message")?;

        wait_for_setup_complete(&mut ws_rx).await?;
        info!(%user_id, "Gemini session setup is complete.");

        let (queue, requests) = LiveRequestQueue::new();
        let writer_span = tracing::info_span!("gemini_writer", %user_id);
        tokio::spawn(
            async move {
                if let Err(e) = drain_requests(ws_tx, requests).await {
                    error!(error = ?e, "Gemini request writer failed.");
                }
            }
            .instrument(writer_span),
        );

        Ok(LiveSession::new(
            user_id,
            modality,
            event_stream(ws_rx),
            Arc::new(queue),
        ))
    }
}

/// Decodes a text or binary frame into a server message. Returns `None` for
/// control frames.
fn decode_frame(msg: &WsMessage) -> Option<Result<ServerMessage>> {
    let text = match msg {
        WsMessage::Text(text) => text.as_str(),
        WsMessage::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => return Some(Err(anyhow!("Gemini sent a non UTF-8 binary frame: {}", e))),
        },
        _ => return None,
    };
    Some(
        serde_json::from_str(text)
            .with_context(|| format!("Unparseable Gemini message: {}", text)),
    )
}

/// Waits for `setupComplete`. Any other first message, a close, or a read
/// failure fails the session.
async fn wait_for_setup_complete<S>(ws_rx: &mut S) -> Result<()>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(msg) = ws_rx.next().await {
        let msg = msg.context("Error reading from Gemini WebSocket during setup")?;
        if let WsMessage::Close(frame) = &msg {
            bail!("Gemini closed the connection during setup: {:?}", frame);
        }
        match decode_frame(&msg) {
            Some(Ok(server_msg)) if server_msg.setup_complete.is_some() => return Ok(()),
            Some(Ok(server_msg)) => {
                bail!("Unexpected Gemini message during setup: {:?}", server_msg)
            }
            Some(Err(e)) => return Err(e),
            None => continue,
        }
    }
    bail!("Gemini connection ended before setup completed")
}

/// Forwards queued requests to Gemini until the queue is closed, then closes
/// the websocket.
pub(crate) async fn drain_requests<S>(
    mut ws_tx: S,
    mut requests: mpsc::UnboundedReceiver<LiveRequest>,
) -> Result<()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    while let Some(request) = requests.recv().await {
        let Some(msg) = ClientMessage::from_request(request) else {
            debug!("Live request queue closed; closing Gemini connection.");
            break;
        };
        let payload = serde_json::to_string(&msg)?;
        ws_tx
            .send(WsMessage::Text(payload.into()))
            .await
            .context("Failed to send request to Gemini")?;
    }
    // The peer may already be gone; nothing left to report in that case.
    let _ = ws_tx.send(WsMessage::Close(None)).await;
    Ok(())
}

/// Accumulates streamed text across a model turn so a final, complete text
/// event can be emitted when the turn ends.
#[derive(Debug, Default)]
pub(crate) struct TurnAssembler {
    text: String,
}

impl TurnAssembler {
    pub(crate) fn ingest(&mut self, content: ServerContent) -> Result<Vec<LiveEvent>> {
        let mut events = Vec::new();

        if let Some(turn) = content.model_turn {
            let turn = Content::try_from(turn)?;
            let mut has_text = false;
            for part in &turn.parts {
                if let Part::Text(text) = part {
                    self.text.push_str(text);
                    has_text = true;
                }
            }
            if !turn.parts.is_empty() {
                events.push(LiveEvent {
                    content: Some(turn),
                    partial: has_text,
                    ..Default::default()
                });
            }
        }

        let turn_complete = content.turn_complete.unwrap_or(false);
        let interrupted = content.interrupted.unwrap_or(false);
        if turn_complete || interrupted {
            let text = std::mem::take(&mut self.text);
            if turn_complete && !interrupted && !text.is_empty() {
                events.push(LiveEvent {
                    content: Some(Content {
                        role: Role::Model,
                        parts: vec![Part::Text(text)],
                    }),
                    ..Default::default()
                });
            }
            events.push(LiveEvent {
                turn_complete,
                interrupted,
                ..Default::default()
            });
        }

        Ok(events)
    }
}

struct EventReader<S> {
    ws_rx: S,
    assembler: TurnAssembler,
    pending: VecDeque<LiveEvent>,
    finished: bool,
}

impl<S> EventReader<S> {
    fn handle(&mut self, msg: WsMessage) -> Result<()> {
        if let WsMessage::Close(frame) = &msg {
            info!(?frame, "Gemini WebSocket connection closed by server.");
            self.finished = true;
            return Ok(());
        }
        let server_msg = match decode_frame(&msg) {
            Some(Ok(server_msg)) => server_msg,
            Some(Err(e)) => {
                warn!(error = ?e, "Ignoring unreadable Gemini message.");
                return Ok(());
            }
            None => return Ok(()),
        };
        if server_msg.go_away.is_some() {
            warn!("Gemini announced the session is about to end.");
        }
        if let Some(content) = server_msg.server_content {
            self.pending.extend(self.assembler.ingest(content)?);
        }
        Ok(())
    }
}

/// Builds the session event stream from the websocket read half. The stream
/// ends when Gemini closes the connection; a read failure is yielded once
/// and ends it.
pub(crate) fn event_stream<S>(ws_rx: S) -> LiveEventStream
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin + Send + 'static,
{
    let reader = EventReader {
        ws_rx,
        assembler: TurnAssembler::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    Box::pin(stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(event) = reader.pending.pop_front() {
                return Some((Ok(event), reader));
            }
            if reader.finished {
                return None;
            }
            let outcome = match reader.ws_rx.next().await {
                Some(Ok(msg)) => reader.handle(msg),
                Some(Err(e)) => {
                    Err(anyhow::Error::new(e).context("Error reading from Gemini WebSocket"))
                }
                None => {
                    reader.finished = true;
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                reader.finished = true;
                reader.pending.clear();
                return Some((Err(e), reader));
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WireContent;
    use vidur_core::{Blob, InputSink};

    fn text_frame(json: &str) -> Result<WsMessage, WsError> {
        Ok(WsMessage::Text(json.to_string().into()))
    }

    async fn collect(frames: Vec<Result<WsMessage, WsError>>) -> Vec<Result<LiveEvent>> {
        event_stream(stream::iter(frames)).collect().await
    }

    #[test]
    fn test_assembler_marks_text_partial_and_emits_final_text() {
        let mut assembler = TurnAssembler::default();
        let chunk = |text: &str| ServerContent {
            model_turn: Some(WireContent {
                role: Some("model".to_string()),
                parts: vec![crate::types::WirePart {
                    text: Some(text.to_string()),
                    inline_data: None,
                }],
            }),
            ..Default::default()
        };

        let first = assembler.ingest(chunk("Hel")).unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].partial);

        assembler.ingest(chunk("lo")).unwrap();
        let end = assembler
            .ingest(ServerContent {
                turn_complete: Some(true),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(end.len(), 2);
        assert!(!end[0].partial);
        assert_eq!(end[0].first_part(), Some(&Part::Text("Hello".to_string())));
        assert!(end[1].turn_complete);
        assert!(!end[1].interrupted);
        assert!(end[1].content.is_none());
    }

    #[test]
    fn test_assembler_discards_text_on_interrupt() {
        let mut assembler = TurnAssembler::default();
        assembler
            .ingest(ServerContent {
                model_turn: Some(WireContent {
                    role: None,
                    parts: vec![crate::types::WirePart {
                        text: Some("half a sen".to_string()),
                        inline_data: None,
                    }],
                }),
                ..Default::default()
            })
            .unwrap();

        let events = assembler
            .ingest(ServerContent {
                interrupted: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].interrupted);

        let after = assembler
            .ingest(ServerContent {
                turn_complete: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(after.len(), 1, "no stale text should be replayed");
    }

    #[tokio::test]
    async fn test_event_stream_decodes_audio_and_turns() {
        let events = collect(vec![
            text_frame(
                r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AQID"}}]}}}"#,
            ),
            Ok(WsMessage::Ping(Default::default())),
            Ok(WsMessage::Binary(
                br#"{"serverContent":{"turnComplete":true}}"#.to_vec().into(),
            )),
        ])
        .await;

        let events: Vec<LiveEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(events.len(), 2);
        assert!(!events[0].partial);
        assert_eq!(
            events[0].first_part(),
            Some(&Part::InlineData(Blob {
                mime_type: "audio/pcm;rate=24000".to_string(),
                data: vec![1, 2, 3],
            }))
        );
        assert!(events[1].turn_complete);
    }

    #[tokio::test]
    async fn test_event_stream_skips_unreadable_messages() {
        let events = collect(vec![
            text_frame("not json"),
            text_frame(r#"{"usageMetadata":{"totalTokenCount":3}}"#),
            text_frame(r#"{"serverContent":{"interrupted":true}}"#),
        ])
        .await;

        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap().interrupted);
    }

    #[tokio::test]
    async fn test_event_stream_ends_on_close_frame() {
        let events = collect(vec![
            Ok(WsMessage::Close(None)),
            text_frame(r#"{"serverContent":{"turnComplete":true}}"#),
        ])
        .await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_event_stream_yields_read_error_once() {
        let events = collect(vec![
            Err(WsError::ConnectionClosed),
            text_frame(r#"{"serverContent":{"turnComplete":true}}"#),
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn test_wait_for_setup_complete() {
        let mut ok = stream::iter(vec![
            Ok(WsMessage::Pong(Default::default())),
            text_frame(r#"{"setupComplete":{}}"#),
        ]);
        assert!(wait_for_setup_complete(&mut ok).await.is_ok());

        let mut closed = stream::iter(vec![Ok(WsMessage::Close(None))]);
        assert!(wait_for_setup_complete(&mut closed).await.is_err());

        let mut unexpected = stream::iter(vec![text_frame(
            r#"{"serverContent":{"turnComplete":true}}"#,
        )]);
        assert!(wait_for_setup_complete(&mut unexpected).await.is_err());

        let mut empty = stream::iter(Vec::<Result<WsMessage, WsError>>::new());
        assert!(wait_for_setup_complete(&mut empty).await.is_err());
    }

    #[tokio::test]
    async fn test_drain_requests_forwards_then_closes() {
        let (sink_tx, sink_rx) = futures::channel::mpsc::unbounded::<WsMessage>();
        let (queue, requests) = LiveRequestQueue::new();

        queue.send_content(Content::user_text("hello")).unwrap();
        queue
            .send_realtime(Blob {
                mime_type: "audio/pcm".to_string(),
                data: vec![0, 1],
            })
            .unwrap();
        queue.close();

        drain_requests(sink_tx, requests).await.unwrap();

        let sent: Vec<WsMessage> = sink_rx.collect().await;
        assert_eq!(sent.len(), 3);
        let first: serde_json::Value = serde_json::from_str(sent[0].to_text().unwrap()).unwrap();
        assert_eq!(first["clientContent"]["turns"][0]["parts"][0]["text"], "hello");
        let second: serde_json::Value = serde_json::from_str(sent[1].to_text().unwrap()).unwrap();
        assert_eq!(second["realtimeInput"]["audio"]["data"], "AAE=");
        assert!(matches!(sent[2], WsMessage::Close(None)));
    }

    #[test]
    fn test_runner_endpoint_uses_key_and_base_url() {
        let runner = GeminiLiveRunner::new("secret", AgentConfig::default())
            .with_base_url("ws://127.0.0.1:9000/live");
        assert_eq!(runner.endpoint(), "ws://127.0.0.1:9000/live?key=secret");
        assert_eq!(runner.agent.name, "vidur_voice_agent");
    }
}
