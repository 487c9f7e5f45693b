//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application: the
//! root document, the static asset mount, and the two WebSocket endpoints.

use crate::{
    state::AppState,
    ws::{media_stream_handler, ws_handler},
};

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let static_dir = app_state.config.static_dir.clone();

    // Group all routes that require AppState into their own router.
    let ws_router = Router::new()
        .route("/ws/{user_id}", get(ws_handler))
        .route("/media-stream", get(media_stream_handler))
        .with_state(app_state);

    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .merge(ws_router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LogFormat};
    use crate::ws::protocol::ServerMessage;
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use futures_util::{SinkExt, StreamExt};
    use std::{collections::HashMap, net::SocketAddr, path::PathBuf, sync::Mutex, time::Duration};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
    use tracing::Level;
    use vidur_core::{
        Content, LiveEvent, LiveRequest, LiveRequestQueue, LiveRunner, LiveSession, Modality, Part,
        Role,
    };

    struct OpenedSession {
        modality: Modality,
        events_tx: mpsc::UnboundedSender<Result<LiveEvent>>,
        requests: mpsc::UnboundedReceiver<LiveRequest>,
    }

    /// Records every session it opens so tests can drive them.
    #[derive(Default)]
    struct FakeRunner {
        fail: bool,
        sessions: Mutex<HashMap<String, OpenedSession>>,
    }

    #[async_trait]
    impl LiveRunner for FakeRunner {
        async fn open(&self, user_id: &str, modality: Modality) -> Result<LiveSession> {
            if self.fail {
                bail!("remote session refused");
            }
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let (queue, requests) = LiveRequestQueue::new();
            self.sessions.lock().unwrap().insert(
                user_id.to_string(),
                OpenedSession {
                    modality,
                    events_tx,
                    requests,
                },
            );
            Ok(LiveSession::new(
                user_id,
                modality,
                Box::pin(UnboundedReceiverStream::new(events_rx)),
                Arc::new(queue),
            ))
        }
    }

    impl FakeRunner {
        async fn wait_for(&self, user_id: &str) -> OpenedSession {
            for _ in 0..200 {
                if let Some(session) = self.sessions.lock().unwrap().remove(user_id) {
                    return session;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("session for {} was never opened", user_id);
        }

        fn opened_ids(&self) -> Vec<String> {
            self.sessions.lock().unwrap().keys().cloned().collect()
        }
    }

    fn test_config() -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            google_api_key: "test-key".to_string(),
            live_model: "test-model".to_string(),
            live_url: None,
            log_level: Level::INFO,
            log_format: LogFormat::Text,
            prompts_path: PathBuf::from("./prompts"),
            static_dir: PathBuf::from("./static"),
        }
    }

    async fn spawn_app(runner: Arc<FakeRunner>) -> SocketAddr {
        let state = Arc::new(AppState {
            runner,
            config: Arc::new(test_config()),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        addr
    }

    fn model_text(text: &str) -> LiveEvent {
        LiveEvent {
            content: Some(Content {
                role: Role::Model,
                parts: vec![Part::Text(text.to_string())],
            }),
            partial: true,
            ..Default::default()
        }
    }

    async fn next_server_message<S>(ws: &mut S) -> ServerMessage
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return serde_json::from_str(text.as_str()).unwrap();
                }
                Some(Ok(_)) => continue,
                other => panic!("Expected a text frame, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_identified_endpoint_relays_both_ways() {
        let runner = Arc::new(FakeRunner::default());
        let addr = spawn_app(runner.clone()).await;

        let (mut ws, _) = connect_async(format!("ws://{}/ws/alice?is_audio=false", addr))
            .await
            .unwrap();
        let mut session = runner.wait_for("alice").await;
        assert_eq!(session.modality, Modality::Text);

        ws.send(WsMessage::Text(
            r#"{"mime_type":"text/plain","data":"hello"}"#.into(),
        ))
        .await
        .unwrap();
        assert_eq!(
            session.requests.recv().await,
            Some(LiveRequest::Content(Content::user_text("hello")))
        );

        session.events_tx.send(Ok(model_text("Hi!"))).unwrap();
        session
            .events_tx
            .send(Ok(LiveEvent {
                turn_complete: true,
                ..Default::default()
            }))
            .unwrap();

        assert_eq!(next_server_message(&mut ws).await, ServerMessage::text("Hi!"));
        assert_eq!(
            next_server_message(&mut ws).await,
            ServerMessage::TurnStatus {
                turn_complete: true,
                interrupted: false
            }
        );

        ws.close(None).await.unwrap();
        assert_eq!(session.requests.recv().await, Some(LiveRequest::Close));
    }

    #[tokio::test]
    async fn test_identified_endpoint_selects_audio_modality() {
        let runner = Arc::new(FakeRunner::default());
        let addr = spawn_app(runner.clone()).await;

        let (_ws, _) = connect_async(format!("ws://{}/ws/bob?is_audio=true", addr))
            .await
            .unwrap();
        let session = runner.wait_for("bob").await;
        assert_eq!(session.modality, Modality::Audio);
    }

    #[tokio::test]
    async fn test_unsupported_media_type_closes_connection() {
        let runner = Arc::new(FakeRunner::default());
        let addr = spawn_app(runner.clone()).await;

        let (mut ws, _) = connect_async(format!("ws://{}/ws/carol?is_audio=false", addr))
            .await
            .unwrap();
        let mut session = runner.wait_for("carol").await;

        ws.send(WsMessage::Text(
            r#"{"mime_type":"video/mp4","data":"AAAA"}"#.into(),
        ))
        .await
        .unwrap();

        assert_eq!(session.requests.recv().await, Some(LiveRequest::Close));
        assert_eq!(session.requests.recv().await, None);

        // The server closes the socket after the relay ends.
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_identified_endpoint_closes_socket_when_session_fails() {
        let runner = Arc::new(FakeRunner {
            fail: true,
            ..Default::default()
        });
        let addr = spawn_app(runner.clone()).await;

        // The upgrade itself succeeds; the session is opened afterwards.
        let (mut ws, _) = connect_async(format!("ws://{}/ws/dave?is_audio=false", addr))
            .await
            .unwrap();

        let ended = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(other)) => panic!("Unexpected frame {:?}", other),
                }
            }
        })
        .await;
        assert!(ended.is_ok(), "server should close the socket");
        assert!(runner.opened_ids().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_connections_are_isolated() {
        let runner = Arc::new(FakeRunner::default());
        let addr = spawn_app(runner.clone()).await;

        let (mut ws_a, _) = connect_async(format!("ws://{}/ws/user-a?is_audio=false", addr))
            .await
            .unwrap();
        let (mut ws_b, _) = connect_async(format!("ws://{}/ws/user-b?is_audio=false", addr))
            .await
            .unwrap();
        let session_a = runner.wait_for("user-a").await;
        let session_b = runner.wait_for("user-b").await;

        session_a.events_tx.send(Ok(model_text("for a"))).unwrap();
        session_b.events_tx.send(Ok(model_text("for b"))).unwrap();

        assert_eq!(next_server_message(&mut ws_a).await, ServerMessage::text("for a"));
        assert_eq!(next_server_message(&mut ws_b).await, ServerMessage::text("for b"));

        // Ending b's session must not disturb a.
        drop(session_b.events_tx);
        session_a.events_tx.send(Ok(model_text("still a"))).unwrap();
        assert_eq!(next_server_message(&mut ws_a).await, ServerMessage::text("still a"));
    }

    #[tokio::test]
    async fn test_media_stream_opens_anonymous_audio_session() {
        let runner = Arc::new(FakeRunner::default());
        let addr = spawn_app(runner.clone()).await;

        let (_ws, _) = connect_async(format!("ws://{}/media-stream", addr))
            .await
            .unwrap();

        let ids = runner.opened_ids();
        assert_eq!(ids.len(), 1);
        assert!(uuid::Uuid::parse_str(&ids[0]).is_ok());
        let session = runner.wait_for(&ids[0]).await;
        assert_eq!(session.modality, Modality::Audio);
    }

    #[tokio::test]
    async fn test_media_stream_rejects_upgrade_when_session_fails() {
        let runner = Arc::new(FakeRunner {
            fail: true,
            ..Default::default()
        });
        let addr = spawn_app(runner).await;

        let result = connect_async(format!("ws://{}/media-stream", addr)).await;
        assert!(result.is_err());
    }
}
