//! # Hub Transports
//!
//! A [`HubTransport`] moves text records between the client and the hub.
//!
//! - [`LongPollingTransport`]: `GET {url}?id=..` polls for data (200 with a
//!   body carries records, an empty 200 means "poll again", 204 means the
//!   server closed the connection), `POST` sends, `DELETE` closes. The
//!   bearer token goes in the `Authorization` header of every request.
//! - [`WebSocketTransport`]: one socket, split into read and write halves;
//!   the token goes in the `access_token` query parameter.
//!
//! `receive` and `send` may run concurrently on the same transport.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::{StatusCode, Url};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{LabError, LabResult};

/// Upper bound for one long-poll request. The server answers well before.
const POLL_TIMEOUT: Duration = Duration::from_secs(100);

/// Timeout for long-polling send and close requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Write half of the WebSocket.
type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of the WebSocket.
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Bidirectional text channel to the hub.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Short transport name as used in negotiate responses.
    fn name(&self) -> &'static str;

    /// Transports with inherent keep-alive are not subject to the server
    /// timeout.
    fn has_inherent_keep_alive(&self) -> bool;

    /// Send text (one or more complete records).
    async fn send(&self, text: String) -> LabResult<()>;

    /// Next chunk of text from the server, or `None` once the server has
    /// closed the connection.
    async fn receive(&self) -> LabResult<Option<String>>;

    /// Close the transport. Safe to call more than once.
    async fn close(&self) -> LabResult<()>;
}

// ─── Long polling ───────────────────────────────────────────────────────

pub struct LongPollingTransport {
    http: reqwest::Client,
    url: Url,
    access_token: Option<String>,
}

impl LongPollingTransport {
    /// Open a long-polling connection with the connection token obtained
    /// from negotiate.
    ///
    /// The first poll completes the connection on the server and returns
    /// without data.
    ///
    /// # Errors
    /// Returns [`LabError::ConnectionFailed`] if the URL is invalid or the
    /// initial poll is not answered with `200`.
    pub async fn connect(
        http: reqwest::Client,
        hub_url: &str,
        connection_token: &str,
        access_token: Option<String>,
    ) -> LabResult<Self> {
        let mut url = Url::parse(hub_url).map_err(|e| LabError::ConnectionFailed {
            url: hub_url.to_string(),
            reason: format!("Invalid URL: {e}"),
        })?;
        url.query_pairs_mut().append_pair("id", connection_token);

        let transport = Self {
            http,
            url,
            access_token,
        };

        let response = transport
            .authorized(transport.http.get(transport.url.clone()))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(LabError::ConnectionFailed {
                url: hub_url.to_string(),
                reason: format!("Initial poll returned {}", response.status()),
            });
        }

        tracing::debug!(url = %hub_url, "Long polling transport connected");
        Ok(transport)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl HubTransport for LongPollingTransport {
    fn name(&self) -> &'static str {
        "LongPolling"
    }

    fn has_inherent_keep_alive(&self) -> bool {
        true
    }

    async fn send(&self, text: String) -> LabResult<()> {
        let response = self
            .authorized(self.http.post(self.url.clone()))
            .header(reqwest::header::CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(text)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(LabError::ConnectionLost {
                reason: format!("Send returned {}", response.status()),
            })
        }
    }

    async fn receive(&self) -> LabResult<Option<String>> {
        loop {
            let response = match self
                .authorized(self.http.get(self.url.clone()))
                .timeout(POLL_TIMEOUT)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    tracing::trace!("Long poll timed out, polling again");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match response.status() {
                StatusCode::NO_CONTENT => return Ok(None),
                StatusCode::OK => {
                    let text = response.text().await?;
                    if text.is_empty() {
                        continue;
                    }
                    return Ok(Some(text));
                }
                status => {
                    return Err(LabError::ConnectionLost {
                        reason: format!("Long poll returned {status}"),
                    });
                }
            }
        }
    }

    async fn close(&self) -> LabResult<()> {
        let response = self
            .authorized(self.http.delete(self.url.clone()))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        // 404: the server already dropped the connection.
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(LabError::ConnectionLost {
                reason: format!("Close returned {}", response.status()),
            })
        }
    }
}

// ─── WebSockets ─────────────────────────────────────────────────────────

pub struct WebSocketTransport {
    writer: Mutex<WsWriter>,
    reader: Mutex<WsReader>,
}

impl WebSocketTransport {
    /// Open the socket. `connection_token` is `None` when negotiation was
    /// skipped.
    ///
    /// # Errors
    /// Returns [`LabError::ConnectionFailed`] on an invalid URL or a failed
    /// upgrade.
    pub async fn connect(
        hub_url: &str,
        connection_token: Option<&str>,
        access_token: Option<&str>,
    ) -> LabResult<Self> {
        let url = websocket_url(hub_url, connection_token, access_token)?;
        let (ws, response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| LabError::ConnectionFailed {
                    url: hub_url.to_string(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;

        tracing::info!(url = %hub_url, status = %response.status(), "Hub WebSocket connected");

        let (writer, reader) = ws.split();
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }
}

/// `http(s)://` becomes `ws(s)://`; `id` and `access_token` are appended
/// as query parameters when present.
///
/// # Errors
/// Returns [`LabError::ConnectionFailed`] for an unparseable URL or
/// unsupported scheme.
pub fn websocket_url(
    hub_url: &str,
    connection_token: Option<&str>,
    access_token: Option<&str>,
) -> LabResult<Url> {
    let invalid = |reason: String| LabError::ConnectionFailed {
        url: hub_url.to_string(),
        reason,
    };
    let mut url = Url::parse(hub_url).map_err(|e| invalid(format!("Invalid URL: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("Unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("Cannot switch scheme to '{scheme}'")))?;
    if connection_token.is_some() || access_token.is_some() {
        let mut query = url.query_pairs_mut();
        if let Some(id) = connection_token {
            query.append_pair("id", id);
        }
        if let Some(token) = access_token {
            query.append_pair("access_token", token);
        }
    }
    Ok(url)
}

#[async_trait]
impl HubTransport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "WebSockets"
    }

    fn has_inherent_keep_alive(&self) -> bool {
        false
    }

    async fn send(&self, text: String) -> LabResult<()> {
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| LabError::WebSocket(format!("Send error: {e}")))
    }

    async fn receive(&self) -> LabResult<Option<String>> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_string())),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Hub WebSocket closed by server");
                    return Ok(None);
                }
                Some(Ok(_)) => {
                    // Ping / pong / raw frames
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    async fn close(&self) -> LabResult<()> {
        let mut writer = self.writer.lock().await;
        match writer.close().await {
            Ok(())
            | Err(
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                | tokio_tungstenite::tungstenite::Error::AlreadyClosed,
            ) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
