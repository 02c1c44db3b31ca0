//! # Realtime Hub Connection
//!
//! Push channel to the backend log hub at `{base}/hubs/log`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     HubConnection                         │
//! │                                                           │
//! │  start() ── negotiate ─► transport ─► handshake           │
//! │  invoke() ── Invocation ─► transport.send                 │
//! │                                                           │
//! │  driver (spawned task):                                   │
//! │    receiver task ─► records ─┬─► Completion → oneshot tx  │
//! │                              ├─► Invocation → events tx   │
//! │                              └─► Close      → exit        │
//! │    keep-alive ping every interval (not on long polling)   │
//! │    server timeout (transports without keep-alive)         │
//! │    on loss: fixed reconnect schedule → lifecycle tx       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Reconnection only applies to a connection that was established by a
//! successful [`HubConnection::start`]; a failed start is returned to the
//! caller. Group membership does not survive a reconnect, so consumers
//! re-announce themselves after [`ConnectionEvent::Reconnected`].

pub mod protocol;
pub mod reconnect;
pub mod transport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::dashboard::DashboardStats;
use crate::config::{HubTransportKind, LabConfig};
use crate::error::{LabError, LabResult};
use crate::token::TokenStore;

use protocol::{HubMessage, NegotiateResponse, RECORD_SEPARATOR};
use reconnect::ReconnectSchedule;
use transport::{HubTransport, LongPollingTransport, WebSocketTransport};

/// Hub method that subscribes this connection to dashboard pushes.
pub const JOIN_DASHBOARD: &str = "JoinDashboard";

/// Server-to-client method names.
pub mod targets {
    pub const RECEIVE_DASHBOARD_STATS: &str = "ReceiveDashboardStats";
    pub const UPDATE_DASHBOARD: &str = "UpdateDashboard";
    pub const RECEIVE_CHECK_IN: &str = "ReceiveCheckIn";
    pub const RECEIVE_CHECK_OUT: &str = "ReceiveCheckOut";
    pub const USER_STATUS_CHANGED: &str = "UserStatusChanged";
}

/// Broadcast capacity for hub and lifecycle events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Negotiate redirects followed before giving up.
const MAX_NEGOTIATE_REDIRECTS: usize = 10;

/// How long `stop` waits for the driver task before aborting it.
const DRIVER_STOP_GRACE: Duration = Duration::from_secs(1);

const SERVER_TIMEOUT_MESSAGE: &str =
    "Server timeout elapsed without receiving a message from the server.";

/// Supplies the current bearer token for each connect attempt.
pub type AccessTokenFactory = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Pending invocation awaiting its completion by `invocationId`.
type PendingInvocation = oneshot::Sender<LabResult<Value>>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

/// A server push, decoded by target name (case-insensitive).
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// `ReceiveDashboardStats(payload)`: full replacement counters.
    DashboardStats(DashboardStats),
    /// `UpdateDashboard()`.
    UpdateDashboard,
    /// `ReceiveCheckIn()`.
    CheckIn,
    /// `ReceiveCheckOut()`.
    CheckOut,
    /// `UserStatusChanged()`; carries nothing the dashboard uses.
    UserStatusChanged,
    Other {
        target: String,
        arguments: Vec<Value>,
    },
}

impl HubEvent {
    pub fn from_invocation(target: &str, arguments: Vec<Value>) -> Self {
        let matches = |name: &str| target.eq_ignore_ascii_case(name);
        if matches(targets::RECEIVE_DASHBOARD_STATS) {
            match arguments
                .first()
                .cloned()
                .map(serde_json::from_value::<DashboardStats>)
            {
                Some(Ok(stats)) => HubEvent::DashboardStats(stats),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Malformed dashboard stats push");
                    HubEvent::Other {
                        target: target.to_string(),
                        arguments,
                    }
                }
                None => HubEvent::Other {
                    target: target.to_string(),
                    arguments,
                },
            }
        } else if matches(targets::UPDATE_DASHBOARD) {
            HubEvent::UpdateDashboard
        } else if matches(targets::RECEIVE_CHECK_IN) {
            HubEvent::CheckIn
        } else if matches(targets::RECEIVE_CHECK_OUT) {
            HubEvent::CheckOut
        } else if matches(targets::USER_STATUS_CHANGED) {
            HubEvent::UserStatusChanged
        } else {
            HubEvent::Other {
                target: target.to_string(),
                arguments,
            }
        }
    }

    /// Events that invalidate the dashboard and trigger a refetch.
    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            HubEvent::UpdateDashboard | HubEvent::CheckIn | HubEvent::CheckOut
        )
    }
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// `start()` succeeded.
    Connected,
    /// The connection was lost; reconnect attempt `attempt` (1-based) is
    /// scheduled.
    Reconnecting { attempt: u32 },
    /// A reconnect attempt succeeded.
    Reconnected,
    /// The connection is closed for good. `reason` is `None` after `stop()`.
    Closed { reason: Option<String> },
}

/// Connection settings, usually derived from [`LabConfig`].
#[derive(Debug, Clone)]
pub struct HubOptions {
    pub url: String,
    pub transport: HubTransportKind,
    pub skip_negotiation: bool,
    pub handshake_timeout: Duration,
    pub invoke_timeout: Duration,
    pub server_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub reconnect: ReconnectSchedule,
}

impl HubOptions {
    pub fn from_config(config: &LabConfig) -> Self {
        Self {
            url: config.hub_url(),
            transport: config.hub.transport,
            skip_negotiation: config.hub.skip_negotiation,
            handshake_timeout: Duration::from_secs(config.timeouts.hub_handshake_timeout_secs),
            invoke_timeout: Duration::from_secs(config.timeouts.hub_invoke_timeout_secs),
            server_timeout: Duration::from_secs(config.timeouts.hub_server_timeout_secs),
            keep_alive_interval: Duration::from_secs(config.timeouts.hub_keep_alive_secs),
            reconnect: ReconnectSchedule::from_millis(&config.hub.reconnect_delays_ms),
        }
    }
}

fn transport_name(kind: HubTransportKind) -> &'static str {
    match kind {
        HubTransportKind::LongPolling => "LongPolling",
        HubTransportKind::WebSockets => "WebSockets",
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct HubInner {
    options: HubOptions,
    token_factory: AccessTokenFactory,
    http: reqwest::Client,
    state: watch::Sender<HubState>,
    events: broadcast::Sender<HubEvent>,
    lifecycle: broadcast::Sender<ConnectionEvent>,
    transport: Mutex<Option<Arc<dyn HubTransport>>>,
    pending: Mutex<HashMap<String, PendingInvocation>>,
    next_invocation_id: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl HubInner {
    fn state(&self) -> HubState {
        *self.state.borrow()
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn set_transport(&self, transport: Option<Arc<dyn HubTransport>>) {
        *lock(&self.transport) = transport;
    }

    fn connected_transport(&self) -> LabResult<Arc<dyn HubTransport>> {
        if self.state() != HubState::Connected {
            return Err(LabError::NotConnected);
        }
        lock(&self.transport).clone().ok_or(LabError::NotConnected)
    }

    fn fail_pending(&self, reason: &str) {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(LabError::ConnectionLost {
                reason: reason.to_string(),
            }));
        }
    }

    /// Final transition when the driver gives up on its own.
    fn finish_closed(&self, reason: Option<String>) {
        if self.is_shutting_down() {
            return;
        }
        self.state.send_replace(HubState::Disconnected);
        tracing::warn!(reason = reason.as_deref().unwrap_or("none"), "Hub connection closed");
        let _ = self.lifecycle.send(ConnectionEvent::Closed { reason });
    }
}

/// Client side of the realtime hub.
pub struct HubConnection {
    inner: Arc<HubInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl HubConnection {
    /// Create a disconnected hub connection.
    ///
    /// # Errors
    /// Returns [`LabError::ConfigError`] if the HTTP client cannot be built.
    pub fn new(options: HubOptions, token_factory: AccessTokenFactory) -> LabResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("lab-access-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LabError::ConfigError {
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        let (state, _) = watch::channel(HubState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (lifecycle, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(HubInner {
                options,
                token_factory,
                http,
                state,
                events,
                lifecycle,
                transport: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_invocation_id: AtomicU64::new(0),
                shutdown,
            }),
            driver: Mutex::new(None),
        })
    }

    /// Hub connection for `config`, authenticated with the token in `tokens`.
    ///
    /// # Errors
    /// See [`HubConnection::new`].
    pub fn from_config(config: &LabConfig, tokens: &TokenStore) -> LabResult<Self> {
        let tokens = tokens.clone();
        Self::new(HubOptions::from_config(config), Arc::new(move || tokens.get()))
    }

    pub fn url(&self) -> &str {
        &self.inner.options.url
    }

    pub fn state(&self) -> HubState {
        self.inner.state()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<HubState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to server pushes. Subscribe before `start` to see every
    /// event.
    pub fn events(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribe to lifecycle notifications.
    pub fn lifecycle(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.lifecycle.subscribe()
    }

    /// Negotiate, connect the transport and complete the handshake.
    ///
    /// # Errors
    /// Fails if the connection is not disconnected, or with the negotiate,
    /// transport, handshake or timeout error. No reconnect is attempted.
    pub async fn start(&self) -> LabResult<()> {
        let mut previous = HubState::Disconnected;
        let transitioned = self.inner.state.send_if_modified(|state| {
            previous = *state;
            if *state == HubState::Disconnected {
                *state = HubState::Connecting;
                true
            } else {
                false
            }
        });
        if !transitioned {
            return Err(LabError::ProtocolError {
                reason: format!("Cannot start a hub connection in the {previous:?} state"),
            });
        }
        self.inner.shutdown.send_replace(false);

        tracing::info!(url = %self.inner.options.url, transport = transport_name(self.inner.options.transport), "Starting hub connection");

        let timeout = self.inner.options.handshake_timeout;
        let established = match tokio::time::timeout(timeout, establish(&self.inner)).await {
            Ok(result) => result,
            Err(_) => Err(LabError::Timeout {
                seconds: timeout.as_secs(),
            }),
        };

        let (transport, buffer) = match established {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(error = %e, "Hub connection failed to start");
                self.inner.state.send_replace(HubState::Disconnected);
                return Err(e);
            }
        };

        if self.inner.is_shutting_down() {
            let _ = transport.close().await;
            self.inner.state.send_replace(HubState::Disconnected);
            return Err(LabError::ConnectionFailed {
                url: self.inner.options.url.clone(),
                reason: "The connection was stopped during negotiation".into(),
            });
        }

        self.inner.set_transport(Some(Arc::clone(&transport)));
        self.inner.state.send_replace(HubState::Connected);
        let _ = self.inner.lifecycle.send(ConnectionEvent::Connected);
        tracing::info!(url = %self.inner.options.url, transport = transport.name(), "Hub connected");

        let handle = tokio::spawn(drive(Arc::clone(&self.inner), transport, buffer));
        if let Some(old) = lock(&self.driver).replace(handle) {
            old.abort();
        }
        Ok(())
    }

    /// Invoke a hub method and wait for its completion.
    ///
    /// # Errors
    /// [`LabError::NotConnected`] unless connected; [`LabError::Invocation`]
    /// when the server reports an error; [`LabError::Timeout`];
    /// [`LabError::ConnectionLost`] when the connection drops first.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> LabResult<Value> {
        let transport = self.inner.connected_transport()?;
        let id = self
            .inner
            .next_invocation_id
            .fetch_add(1, Ordering::SeqCst)
            .to_string();

        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending).insert(id.clone(), tx);

        let message = HubMessage::Invocation {
            invocation_id: Some(id.clone()),
            target: target.to_string(),
            arguments,
        }
        .encode();

        tracing::debug!(target, id = %id, "Invoking hub method");
        if let Err(e) = transport.send(message).await {
            lock(&self.inner.pending).remove(&id);
            return Err(e);
        }

        let timeout = self.inner.options.invoke_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LabError::ConnectionLost {
                reason: "Invocation dropped by the connection driver".into(),
            }),
            Err(_) => {
                lock(&self.inner.pending).remove(&id);
                Err(LabError::Timeout {
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    /// Invoke a hub method without waiting for a result.
    ///
    /// # Errors
    /// [`LabError::NotConnected`] unless connected, or the transport error.
    pub async fn send(&self, target: &str, arguments: Vec<Value>) -> LabResult<()> {
        let transport = self.inner.connected_transport()?;
        let message = HubMessage::Invocation {
            invocation_id: None,
            target: target.to_string(),
            arguments,
        }
        .encode();
        transport.send(message).await
    }

    /// Stop the connection. Pending invocations fail and the lifecycle
    /// channel reports `Closed { reason: None }`. Stopping a disconnected
    /// connection is a no-op.
    ///
    /// # Errors
    /// The transport close error, after the connection has been torn down.
    pub async fn stop(&self) -> LabResult<()> {
        if self.state() == HubState::Disconnected {
            return Ok(());
        }
        self.inner.state.send_replace(HubState::Disconnecting);
        self.inner.shutdown.send_replace(true);

        let transport = lock(&self.inner.transport).take();
        let close_result = match transport {
            Some(transport) => transport.close().await,
            None => Ok(()),
        };

        let handle = lock(&self.driver).take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(DRIVER_STOP_GRACE, &mut handle).await.is_err() {
                tracing::debug!("Hub driver did not exit in time, aborting");
                handle.abort();
            }
        }

        self.inner
            .fail_pending("Invocation canceled due to the underlying connection being closed");
        self.inner.state.send_replace(HubState::Disconnected);
        let _ = self
            .inner
            .lifecycle
            .send(ConnectionEvent::Closed { reason: None });
        tracing::info!(url = %self.inner.options.url, "Hub connection stopped");

        close_result
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.inner.shutdown.send_replace(true);
        if let Some(handle) = lock(&self.driver).take() {
            handle.abort();
        }
    }
}

// ─── Connection establishment ───────────────────────────────────────────

/// Negotiate (unless skipped), connect the transport and handshake.
/// Returns the transport and any records received after the handshake.
async fn establish(inner: &HubInner) -> LabResult<(Arc<dyn HubTransport>, String)> {
    let token = (inner.token_factory)();
    let options = &inner.options;

    let transport: Arc<dyn HubTransport> = match options.transport {
        HubTransportKind::WebSockets if options.skip_negotiation => Arc::new(
            WebSocketTransport::connect(&options.url, None, token.as_deref()).await?,
        ),
        kind => {
            let (url, negotiated, token) = negotiate(inner, token).await?;
            let name = transport_name(kind);
            if !negotiated.supports(name) {
                return Err(LabError::ConnectionFailed {
                    url,
                    reason: format!("The server does not support the {name} transport"),
                });
            }
            let id = negotiated
                .transport_id()
                .ok_or_else(|| LabError::ConnectionFailed {
                    url: url.clone(),
                    reason: "Negotiate response has no connection id".into(),
                })?;
            match kind {
                HubTransportKind::LongPolling => Arc::new(
                    LongPollingTransport::connect(inner.http.clone(), &url, id, token).await?,
                ),
                HubTransportKind::WebSockets => Arc::new(
                    WebSocketTransport::connect(&url, Some(id), token.as_deref()).await?,
                ),
            }
        }
    };

    match handshake(transport.as_ref()).await {
        Ok(rest) => Ok((transport, rest)),
        Err(e) => {
            let _ = transport.close().await;
            Err(e)
        }
    }
}

fn negotiate_url(hub_url: &str) -> LabResult<Url> {
    let mut url = Url::parse(hub_url).map_err(|e| LabError::ConnectionFailed {
        url: hub_url.to_string(),
        reason: format!("Invalid URL: {e}"),
    })?;
    let path = format!("{}/negotiate", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().append_pair(
        "negotiateVersion",
        &protocol::NEGOTIATE_VERSION.to_string(),
    );
    Ok(url)
}

/// `POST {url}/negotiate`, following redirects. Returns the final hub URL,
/// the response and the token to use with it.
async fn negotiate(
    inner: &HubInner,
    mut token: Option<String>,
) -> LabResult<(String, NegotiateResponse, Option<String>)> {
    let mut url = inner.options.url.clone();

    for _ in 0..MAX_NEGOTIATE_REDIRECTS {
        let mut request = inner
            .http
            .post(negotiate_url(&url)?)
            .timeout(inner.options.handshake_timeout);
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| LabError::ConnectionFailed {
            url: url.clone(),
            reason: format!("Negotiate request failed: {e}"),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(LabError::ConnectionFailed {
                url,
                reason: format!("Negotiate returned {status}"),
            });
        }

        let body: NegotiateResponse =
            response.json().await.map_err(|e| LabError::ProtocolError {
                reason: format!("Invalid negotiate response: {e}"),
            })?;
        tracing::debug!(url = %url, connection_id = ?body.connection_id, "Negotiated");

        if let Some(error) = body.error {
            return Err(LabError::ConnectionFailed { url, reason: error });
        }
        if let Some(redirect) = body.url {
            tracing::debug!(from = %url, to = %redirect, "Negotiate redirect");
            url = redirect;
            if body.access_token.is_some() {
                token = body.access_token;
            }
            continue;
        }
        return Ok((url, body, token));
    }

    Err(LabError::ConnectionFailed {
        url,
        reason: "Negotiate redirection limit exceeded".into(),
    })
}

/// Send the handshake and wait for its answer record.
async fn handshake(transport: &dyn HubTransport) -> LabResult<String> {
    transport.send(protocol::handshake_request()).await?;

    let mut buffer = String::new();
    loop {
        let chunk = transport
            .receive()
            .await?
            .ok_or_else(|| LabError::Handshake {
                reason: "Server closed the connection before the handshake completed".into(),
            })?;
        buffer.push_str(&chunk);
        if let Some(end) = buffer.find(RECORD_SEPARATOR) {
            let rest = buffer.split_off(end + RECORD_SEPARATOR.len_utf8());
            buffer.truncate(end);
            protocol::parse_handshake(&buffer)?;
            tracing::debug!(transport = transport.name(), "Hub handshake complete");
            return Ok(rest);
        }
    }
}

// ─── Driver ─────────────────────────────────────────────────────────────

/// Why a connection stopped serving messages.
struct LoopExit {
    error: Option<String>,
    allow_reconnect: bool,
}

impl LoopExit {
    fn lost(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            allow_reconnect: true,
        }
    }

    fn stopped() -> Self {
        Self {
            error: None,
            allow_reconnect: false,
        }
    }
}

enum ReconnectOutcome {
    Reconnected(Arc<dyn HubTransport>, String),
    GaveUp { reason: Option<String> },
    Stopped,
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) -> bool {
    *shutdown.borrow_and_update()
}

async fn drive(inner: Arc<HubInner>, mut transport: Arc<dyn HubTransport>, mut buffer: String) {
    let mut shutdown = inner.shutdown.subscribe();

    loop {
        let exit = serve(&inner, &transport, &mut buffer, &mut shutdown).await;
        buffer.clear();

        if inner.is_shutting_down() {
            break;
        }

        inner.set_transport(None);
        inner.fail_pending(exit.error.as_deref().unwrap_or("Connection closed"));
        if let Err(e) = transport.close().await {
            tracing::debug!(error = %e, "Closing lost transport failed");
        }

        if !exit.allow_reconnect {
            inner.finish_closed(exit.error);
            break;
        }

        match reconnect(&inner, exit.error, &mut shutdown).await {
            ReconnectOutcome::Reconnected(next, rest) => {
                if inner.is_shutting_down() {
                    let _ = next.close().await;
                    break;
                }
                transport = next;
                buffer = rest;
                inner.set_transport(Some(Arc::clone(&transport)));
                inner.state.send_replace(HubState::Connected);
                tracing::info!(transport = transport.name(), "Hub reconnected");
                let _ = inner.lifecycle.send(ConnectionEvent::Reconnected);
            }
            ReconnectOutcome::GaveUp { reason } => {
                inner.finish_closed(reason);
                break;
            }
            ReconnectOutcome::Stopped => break,
        }
    }

    tracing::debug!("Hub driver exiting");
}

/// Serve one established connection until it is lost, closed by the
/// server, or stopped.
async fn serve(
    inner: &HubInner,
    transport: &Arc<dyn HubTransport>,
    buffer: &mut String,
    shutdown: &mut watch::Receiver<bool>,
) -> LoopExit {
    if let Some(exit) = process_records(inner, buffer) {
        return exit;
    }

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<LabResult<Option<String>>>(16);
    let _receiver = AbortOnDrop(tokio::spawn({
        let transport = Arc::clone(transport);
        async move {
            loop {
                let chunk = transport.receive().await;
                let done = !matches!(chunk, Ok(Some(_)));
                if chunk_tx.send(chunk).await.is_err() || done {
                    break;
                }
            }
        }
    }));

    // Long polling keeps itself alive; only the other transports ping and
    // watch the server timeout.
    let inherent_keep_alive = transport.has_inherent_keep_alive();
    let keep_alive = inner.options.keep_alive_interval;
    let mut ping = tokio::time::interval_at(Instant::now() + keep_alive, keep_alive);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let server_timeout = (!inherent_keep_alive).then_some(inner.options.server_timeout);
    let mut deadline = Instant::now() + server_timeout.unwrap_or_default();

    loop {
        if shutdown_requested(shutdown) {
            return LoopExit::stopped();
        }

        let timed_out = async {
            if server_timeout.is_some() {
                tokio::time::sleep_until(deadline).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            chunk = chunk_rx.recv() => match chunk {
                Some(Ok(Some(text))) => {
                    if let Some(timeout) = server_timeout {
                        deadline = Instant::now() + timeout;
                    }
                    buffer.push_str(&text);
                    if let Some(exit) = process_records(inner, buffer) {
                        return exit;
                    }
                }
                Some(Ok(None)) | None => {
                    return LoopExit::lost("Server closed the connection");
                }
                Some(Err(e)) => return LoopExit::lost(e.to_string()),
            },
            _ = ping.tick(), if !inherent_keep_alive => {
                tracing::trace!("Sending hub keep-alive ping");
                if let Err(e) = transport.send(HubMessage::Ping.encode()).await {
                    return LoopExit::lost(e.to_string());
                }
            }
            () = timed_out => return LoopExit::lost(SERVER_TIMEOUT_MESSAGE),
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return LoopExit::stopped();
                }
            }
        }
    }
}

/// Dispatch every complete record in `buffer`. Returns an exit when the
/// server sent a close message.
fn process_records(inner: &HubInner, buffer: &mut String) -> Option<LoopExit> {
    for record in protocol::drain_records(buffer) {
        let message = match HubMessage::decode(&record) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, raw = %record, "Ignoring malformed hub message");
                continue;
            }
        };

        match message {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                if invocation_id.is_some() {
                    tracing::warn!(target = %target, "Server expects a result from a client method; none is sent");
                }
                let event = HubEvent::from_invocation(&target, arguments);
                tracing::debug!(target = %target, ?event, "Hub event");
                let _ = inner.events.send(event);
            }
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                let pending = lock(&inner.pending).remove(&invocation_id);
                match pending {
                    Some(tx) => {
                        let outcome = match error {
                            Some(message) => Err(LabError::Invocation { message }),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                    None => {
                        tracing::debug!(id = %invocation_id, "Completion for unknown invocation");
                    }
                }
            }
            HubMessage::Ping => {}
            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                tracing::info!(error = ?error, allow_reconnect, "Hub closed by server");
                return Some(LoopExit {
                    error: error.or_else(|| Some("Server closed the connection".into())),
                    allow_reconnect,
                });
            }
            HubMessage::Other(kind) => {
                tracing::trace!(kind, "Ignoring hub message");
            }
        }
    }
    None
}

/// Walk the reconnect schedule until a connection is re-established, the
/// schedule is exhausted, or the connection is stopped.
async fn reconnect(
    inner: &HubInner,
    mut last_error: Option<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> ReconnectOutcome {
    inner.state.send_replace(HubState::Reconnecting);
    let mut attempts = 0u32;

    while let Some(delay) = inner.options.reconnect.next_delay(attempts) {
        attempts += 1;
        tracing::warn!(
            attempt = attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = last_error.as_deref().unwrap_or("none"),
            "Hub connection lost, reconnecting"
        );
        let _ = inner
            .lifecycle
            .send(ConnectionEvent::Reconnecting { attempt: attempts });

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
        if shutdown_requested(shutdown) || inner.is_shutting_down() {
            return ReconnectOutcome::Stopped;
        }

        let timeout = inner.options.handshake_timeout;
        match tokio::time::timeout(timeout, establish(inner)).await {
            Ok(Ok((transport, rest))) => return ReconnectOutcome::Reconnected(transport, rest),
            Ok(Err(e)) => last_error = Some(e.to_string()),
            Err(_) => {
                last_error = Some(
                    LabError::Timeout {
                        seconds: timeout.as_secs(),
                    }
                    .to_string(),
                );
            }
        }
    }

    if attempts == 0 {
        return ReconnectOutcome::GaveUp { reason: last_error };
    }
    tracing::error!(attempts, last_error = last_error.as_deref().unwrap_or("none"), "Hub reconnect gave up");
    ReconnectOutcome::GaveUp {
        reason: Some(LabError::ReconnectExhausted { attempts }.to_string()),
    }
}

// ─── Live feed seam ─────────────────────────────────────────────────────

/// The push channel as seen by the dashboard controller.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    fn events(&self) -> broadcast::Receiver<HubEvent>;

    fn lifecycle(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Start the connection and join the dashboard group.
    async fn connect(&self) -> LabResult<()>;

    /// (Re-)announce this connection to the dashboard group.
    async fn join_dashboard(&self) -> LabResult<()>;

    async fn disconnect(&self) -> LabResult<()>;
}

#[async_trait]
impl LiveFeed for HubConnection {
    fn events(&self) -> broadcast::Receiver<HubEvent> {
        HubConnection::events(self)
    }

    fn lifecycle(&self) -> broadcast::Receiver<ConnectionEvent> {
        HubConnection::lifecycle(self)
    }

    /// A failed join stops the connection again, so a feed that reports an
    /// error never delivers events.
    async fn connect(&self) -> LabResult<()> {
        self.start().await?;
        if self.state() == HubState::Connected {
            if let Err(e) = self.join_dashboard().await {
                tracing::warn!(error = %e, "Joining the dashboard group failed, stopping hub");
                if let Err(stop) = self.stop().await {
                    tracing::debug!(error = %stop, "Stopping hub after failed join failed");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn join_dashboard(&self) -> LabResult<()> {
        self.invoke(JOIN_DASHBOARD, Vec::new()).await.map(|_| ())
    }

    async fn disconnect(&self) -> LabResult<()> {
        self.stop().await
    }
}
