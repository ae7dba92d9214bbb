//! Shared test harness: ephemeral-port servers and JSON WebSocket clients
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use pairlink_signaling::{SignalingConfig, SignalingServer, SignalingServerHandle};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Start a server on an ephemeral port with the default 30s heartbeat
pub async fn start_server() -> SignalingServerHandle {
    start_server_with(|_| {}).await
}

/// Start a server on an ephemeral port, letting the test tweak the config
pub async fn start_server_with(
    tweak: impl FnOnce(&mut SignalingConfig),
) -> SignalingServerHandle {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let mut config = SignalingConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    tweak(&mut config);

    SignalingServer::new(config)
        .expect("valid test config")
        .start()
        .await
        .expect("server should start on an ephemeral port")
}

/// One client connection speaking JSON text frames
pub struct Client {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    /// Connect and consume the `welcome` greeting
    pub async fn connect(server: &SignalingServerHandle) -> Self {
        let mut client = Self::connect_raw(server).await;
        let welcome = client.recv_json().await;
        assert_eq!(welcome["type"], "welcome");
        client
    }

    /// Connect without consuming anything
    pub async fn connect_raw(server: &SignalingServerHandle) -> Self {
        let url = format!("ws://{}", server.local_addr());
        let (stream, _) = connect_async(url.as_str())
            .await
            .expect("client should connect");
        Self { stream }
    }

    /// Register under `role` and assert the confirmation
    pub async fn register(&mut self, role: &str) {
        self.send_json(serde_json::json!({"type": "register", "role": role}))
            .await;
        let registered = self.recv_json().await;
        assert_eq!(registered["type"], "registered", "got: {registered}");
        assert_eq!(registered["role"], role);
    }

    pub async fn send_json(&mut self, value: Value) {
        self.stream
            .send(Message::Text(value.to_string()))
            .await
            .expect("send should succeed");
    }

    pub async fn send_text(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .expect("send should succeed");
    }

    /// Next JSON text frame, skipping control frames
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("connection closed while waiting for a frame")
                .expect("websocket error while waiting for a frame");
            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(&text).expect("server sends valid JSON")
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    /// Assert that the next message has the given `type`
    pub async fn expect_type(&mut self, kind: &str) -> Value {
        let value = self.recv_json().await;
        assert_eq!(value["type"], kind, "got: {value}");
        value
    }

    /// Assert that nothing arrives for `window` (control frames excepted)
    pub async fn expect_silence(&mut self, window: Duration) {
        let result = tokio::time::timeout(window, async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    other => return other,
                }
            }
        })
        .await;
        if let Ok(frame) = result {
            panic!("expected silence, got: {frame:?}");
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }

    /// Wait for the server to close this connection
    pub async fn expect_closed(mut self, window: Duration) {
        tokio::time::timeout(window, async {
            loop {
                match self.stream.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await
        .expect("connection should close");
    }
}
