#![allow(dead_code)]

//! Mock hub speaking the JSON hub protocol over WebSockets. The handshake
//! is answered automatically; everything after it is scripted by the test.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use super::STEP_TIMEOUT;

const RS: char = '\u{1e}';

enum ConnectionCommand {
    SendRaw(String),
    ForceClose,
}

pub struct MockHubConnection {
    index: usize,
    uri: String,
    message_rx: mpsc::Receiver<Value>,
    command_tx: mpsc::Sender<ConnectionCommand>,
}

impl MockHubConnection {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Request URI of the upgrade, query included.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Next client message, pings included.
    pub async fn recv_message(&mut self) -> Value {
        timeout(STEP_TIMEOUT, self.message_rx.recv())
            .await
            .expect("timed out waiting for hub message")
            .expect("mock hub message channel closed")
    }

    /// Next non-ping client message.
    pub async fn recv_non_ping(&mut self) -> Value {
        loop {
            let message = self.recv_message().await;
            if message.get("type").and_then(Value::as_u64) != Some(6) {
                return message;
            }
        }
    }

    /// Wait for an invocation of `target` and return its invocation id.
    pub async fn recv_invocation(&mut self, target: &str) -> String {
        let message = self.recv_non_ping().await;
        assert_eq!(message["type"], 1, "expected an invocation, got {message}");
        assert_eq!(message["target"], target);
        message["invocationId"]
            .as_str()
            .expect("invocation without id")
            .to_string()
    }

    pub async fn try_recv_message(&mut self, wait: Duration) -> Option<Value> {
        timeout(wait, self.message_rx.recv()).await.ok().flatten()
    }

    pub async fn send_raw(&self, text: impl Into<String>) {
        self.command_tx
            .send(ConnectionCommand::SendRaw(text.into()))
            .await
            .expect("failed to send command to mock hub connection");
    }

    pub async fn send_record(&self, value: Value) {
        self.send_raw(format!("{value}{RS}")).await;
    }

    pub async fn send_completion(&self, invocation_id: &str, result: Value) {
        self.send_record(json!({ "type": 3, "invocationId": invocation_id, "result": result }))
            .await;
    }

    pub async fn send_completion_error(&self, invocation_id: &str, error: &str) {
        self.send_record(json!({ "type": 3, "invocationId": invocation_id, "error": error }))
            .await;
    }

    pub async fn push(&self, target: &str, arguments: Value) {
        self.send_record(json!({ "type": 1, "target": target, "arguments": arguments }))
            .await;
    }

    pub async fn send_close(&self, error: Option<&str>, allow_reconnect: bool) {
        let mut close = json!({ "type": 7, "allowReconnect": allow_reconnect });
        if let Some(error) = error {
            close["error"] = json!(error);
        }
        self.send_record(close).await;
    }

    /// Accept `JoinDashboard` and complete it.
    pub async fn accept_join(&mut self) {
        let id = self.recv_invocation("JoinDashboard").await;
        self.send_completion(&id, Value::Null).await;
    }

    pub async fn force_close(&self) {
        let _ = self.command_tx.send(ConnectionCommand::ForceClose).await;
    }
}

pub struct MockHubServer {
    addr: SocketAddr,
    connection_rx: mpsc::Receiver<MockHubConnection>,
    server_task: JoinHandle<()>,
}

impl MockHubServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let (connection_tx, connection_rx) = mpsc::channel(16);
        let next_connection_index = Arc::new(AtomicUsize::new(0));

        let server_task = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };

                let connection_tx = connection_tx.clone();
                let connection_index = next_connection_index.fetch_add(1, Ordering::SeqCst);

                tokio::spawn(async move {
                    let (uri_tx, mut uri_rx) = mpsc::unbounded_channel();
                    let capture = move |request: &Request,
                                        response: Response|
                          -> Result<Response, ErrorResponse> {
                        let _ = uri_tx.send(request.uri().to_string());
                        Ok(response)
                    };
                    let ws_stream = match accept_hdr_async(stream, capture).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };
                    let uri = uri_rx.try_recv().unwrap_or_default();

                    let (mut ws_sink, mut ws_source) = ws_stream.split();
                    let (message_tx, message_rx) = mpsc::channel(64);
                    let (command_tx, mut command_rx) = mpsc::channel(64);

                    let connection = MockHubConnection {
                        index: connection_index,
                        uri,
                        message_rx,
                        command_tx,
                    };
                    if connection_tx.send(connection).await.is_err() {
                        return;
                    }

                    let mut handshake_done = false;
                    loop {
                        tokio::select! {
                            maybe_command = command_rx.recv() => match maybe_command {
                                Some(ConnectionCommand::SendRaw(text)) => {
                                    if ws_sink.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Some(ConnectionCommand::ForceClose) | None => break,
                            },
                            maybe_message = ws_source.next() => match maybe_message {
                                Some(Ok(Message::Text(text))) => {
                                    for record in text.as_str().split(RS).filter(|r| !r.is_empty()) {
                                        let Ok(value) = serde_json::from_str::<Value>(record) else {
                                            continue;
                                        };
                                        if !handshake_done && value.get("protocol").is_some() {
                                            handshake_done = true;
                                            let reply = Message::Text(format!("{{}}{RS}").into());
                                            if ws_sink.send(reply).await.is_err() {
                                                return;
                                            }
                                            continue;
                                        }
                                        let _ = message_tx.send(value).await;
                                    }
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                        }
                    }
                });
            }
        });

        Ok(Self {
            addr,
            connection_rx,
            server_task,
        })
    }

    /// Hub URL in `http://` form, as the client is configured.
    pub fn hub_url(&self) -> String {
        format!("http://{}/hubs/log", self.addr)
    }

    /// API base whose derived hub URL points at this server.
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub async fn accept_connection(&mut self) -> MockHubConnection {
        timeout(STEP_TIMEOUT, self.connection_rx.recv())
            .await
            .expect("timed out waiting for hub connection")
            .expect("mock hub connection channel closed")
    }

    pub async fn try_accept_connection(&mut self, wait: Duration) -> Option<MockHubConnection> {
        match timeout(wait, self.connection_rx.recv()).await {
            Ok(Some(connection)) => Some(connection),
            _ => None,
        }
    }
}

impl Drop for MockHubServer {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
