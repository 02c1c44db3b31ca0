mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use lab_access_client::api::dashboard::DashboardStats;
use lab_access_client::config::HubTransportKind;
use lab_access_client::hub::{ConnectionEvent, HubEvent, HubState, LiveFeed};
use lab_access_client::{HubConnection, LabConfig, LabError, TokenStore};
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast, mpsc};

use support::STEP_TIMEOUT;
use support::mock_backend::{Handler, MockBackend, MockResponse, RecordedRequest};
use support::mock_hub::{MockHubConnection, MockHubServer};

const RS: char = '\u{1e}';

fn websocket_config(api_url: String, delays_ms: &[u64]) -> LabConfig {
    let mut config = LabConfig::new(api_url);
    config.hub.transport = HubTransportKind::WebSockets;
    config.hub.skip_negotiation = true;
    config.hub.reconnect_delays_ms = delays_ms.to_vec();
    config.timeouts.hub_handshake_timeout_secs = 2;
    config.timeouts.hub_invoke_timeout_secs = 2;
    config
}

async fn start_hub_or_skip(test_name: &str) -> Option<MockHubServer> {
    match MockHubServer::start().await {
        Ok(server) => Some(server),
        Err(err) => {
            eprintln!("Skipping {test_name}: unable to start mock hub: {err}");
            None
        }
    }
}

async fn next_lifecycle(rx: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(STEP_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for lifecycle event")
        .expect("lifecycle channel closed")
}

/// Start `hub` through the live feed seam and complete its `JoinDashboard`.
async fn connect_and_join(
    hub: &Arc<HubConnection>,
    server: &mut MockHubServer,
) -> MockHubConnection {
    let connect = tokio::spawn({
        let hub = Arc::clone(hub);
        async move { LiveFeed::connect(hub.as_ref()).await }
    });
    let mut connection = server.accept_connection().await;
    connection.accept_join().await;
    connect
        .await
        .expect("connect task panicked")
        .expect("connect failed");
    connection
}

#[tokio::test]
async fn websocket_connect_sends_token_and_joins_dashboard() {
    let Some(mut server) = start_hub_or_skip("websocket_connect_sends_token_and_joins_dashboard").await
    else {
        return;
    };
    let config = websocket_config(server.api_url(), &[]);
    let hub = Arc::new(
        HubConnection::from_config(&config, &TokenStore::in_memory(Some("tok".into()))).unwrap(),
    );
    let mut lifecycle = hub.lifecycle();

    let connection = connect_and_join(&hub, &mut server).await;
    assert!(connection.uri().starts_with("/hubs/log"));
    assert!(connection.uri().contains("access_token=tok"));
    assert_eq!(hub.state(), HubState::Connected);
    assert_eq!(next_lifecycle(&mut lifecycle).await, ConnectionEvent::Connected);
}

#[tokio::test]
async fn server_pushes_become_typed_events() {
    let Some(mut server) = start_hub_or_skip("server_pushes_become_typed_events").await else {
        return;
    };
    let config = websocket_config(server.api_url(), &[]);
    let hub = Arc::new(HubConnection::from_config(&config, &TokenStore::in_memory(None)).unwrap());
    let mut events = hub.events();

    let connection = connect_and_join(&hub, &mut server).await;

    connection.push("ReceiveCheckIn", json!([])).await;
    connection
        .push(
            "receiveDashboardStats",
            json!([{ "totalRuangan": 4, "aktifSekarang": 2, "totalKelas": 8, "totalAkses": 77 }]),
        )
        .await;
    // Two records in one frame.
    connection
        .send_raw(format!(
            "{}{RS}{}{RS}",
            json!({"type":1,"target":"ReceiveCheckOut","arguments":[]}),
            json!({"type":1,"target":"UpdateDashboard","arguments":[]})
        ))
        .await;

    let mut received = Vec::new();
    for _ in 0..4 {
        received.push(
            tokio::time::timeout(STEP_TIMEOUT, events.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert_eq!(
        received,
        vec![
            HubEvent::CheckIn,
            HubEvent::DashboardStats(DashboardStats {
                total_rooms: 4,
                active_now: 2,
                total_classes: 8,
                total_access_events: 77,
            }),
            HubEvent::CheckOut,
            HubEvent::UpdateDashboard,
        ]
    );
}

#[tokio::test]
async fn invocation_results_and_errors() {
    let Some(mut server) = start_hub_or_skip("invocation_results_and_errors").await else {
        return;
    };
    let config = websocket_config(server.api_url(), &[]);
    let hub = Arc::new(HubConnection::from_config(&config, &TokenStore::in_memory(None)).unwrap());
    let mut connection = connect_and_join(&hub, &mut server).await;

    let call = tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { hub.invoke("GetStatus", vec![json!(1)]).await }
    });
    let id = connection.recv_invocation("GetStatus").await;
    connection.send_completion(&id, json!({"ok": true})).await;
    assert_eq!(call.await.unwrap().unwrap(), json!({"ok": true}));

    let call = tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { hub.invoke("Broken", vec![]).await }
    });
    let id = connection.recv_invocation("Broken").await;
    connection.send_completion_error(&id, "Method failed").await;
    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, LabError::Invocation { ref message } if message == "Method failed"));
}

#[tokio::test]
async fn failed_join_stops_the_connection() {
    let Some(mut server) = start_hub_or_skip("failed_join_stops_the_connection").await else {
        return;
    };
    let config = websocket_config(server.api_url(), &[0]);
    let hub = Arc::new(HubConnection::from_config(&config, &TokenStore::in_memory(None)).unwrap());

    let connect = tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { LiveFeed::connect(hub.as_ref()).await }
    });
    let mut connection = server.accept_connection().await;
    let id = connection.recv_invocation("JoinDashboard").await;
    connection.send_completion_error(&id, "Group unavailable").await;

    let err = connect.await.unwrap().unwrap_err();
    assert!(matches!(err, LabError::Invocation { ref message } if message == "Group unavailable"));
    assert_eq!(hub.state(), HubState::Disconnected);
    assert!(server.try_accept_connection(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn server_close_without_reconnect_closes_for_good() {
    let Some(mut server) = start_hub_or_skip("server_close_without_reconnect_closes_for_good").await
    else {
        return;
    };
    let config = websocket_config(server.api_url(), &[0, 0]);
    let hub = Arc::new(HubConnection::from_config(&config, &TokenStore::in_memory(None)).unwrap());
    let mut lifecycle = hub.lifecycle();
    let connection = connect_and_join(&hub, &mut server).await;
    assert_eq!(next_lifecycle(&mut lifecycle).await, ConnectionEvent::Connected);

    connection.send_close(Some("Server shutting down"), false).await;
    assert_eq!(
        next_lifecycle(&mut lifecycle).await,
        ConnectionEvent::Closed {
            reason: Some("Server shutting down".into())
        }
    );
    assert_eq!(hub.state(), HubState::Disconnected);
    assert!(server.try_accept_connection(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn dropped_connection_reconnects_on_schedule() {
    let Some(mut server) = start_hub_or_skip("dropped_connection_reconnects_on_schedule").await
    else {
        return;
    };
    let config = websocket_config(server.api_url(), &[0, 50]);
    let hub = Arc::new(HubConnection::from_config(&config, &TokenStore::in_memory(None)).unwrap());
    let mut lifecycle = hub.lifecycle();
    let first = connect_and_join(&hub, &mut server).await;
    assert_eq!(next_lifecycle(&mut lifecycle).await, ConnectionEvent::Connected);

    first.force_close().await;
    assert_eq!(
        next_lifecycle(&mut lifecycle).await,
        ConnectionEvent::Reconnecting { attempt: 1 }
    );

    let mut second = server.accept_connection().await;
    assert_eq!(second.index(), 1);
    assert_eq!(next_lifecycle(&mut lifecycle).await, ConnectionEvent::Reconnected);
    assert_eq!(hub.state(), HubState::Connected);

    // Group membership is re-announced by the consumer.
    let join = tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { hub.join_dashboard().await }
    });
    second.accept_join().await;
    join.await.unwrap().unwrap();
}

#[tokio::test]
async fn reconnect_exhaustion_reports_closed() {
    let Some(mut server) = start_hub_or_skip("reconnect_exhaustion_reports_closed").await else {
        return;
    };
    let config = websocket_config(server.api_url(), &[100, 100]);
    let hub = Arc::new(HubConnection::from_config(&config, &TokenStore::in_memory(None)).unwrap());
    let mut lifecycle = hub.lifecycle();
    let connection = connect_and_join(&hub, &mut server).await;
    assert_eq!(next_lifecycle(&mut lifecycle).await, ConnectionEvent::Connected);

    // Stop accepting, then drop the live socket.
    drop(server);
    connection.force_close().await;

    assert_eq!(
        next_lifecycle(&mut lifecycle).await,
        ConnectionEvent::Reconnecting { attempt: 1 }
    );
    assert_eq!(
        next_lifecycle(&mut lifecycle).await,
        ConnectionEvent::Reconnecting { attempt: 2 }
    );
    match next_lifecycle(&mut lifecycle).await {
        ConnectionEvent::Closed { reason: Some(reason) } => {
            assert!(reason.contains('2'), "unexpected reason: {reason}");
        }
        other => panic!("expected Closed, got {other:?}"),
    }
    assert_eq!(hub.state(), HubState::Disconnected);
}

#[tokio::test]
async fn silent_server_times_out() {
    let Some(mut server) = start_hub_or_skip("silent_server_times_out").await else {
        return;
    };
    let mut config = websocket_config(server.api_url(), &[]);
    config.timeouts.hub_server_timeout_secs = 1;
    let hub = Arc::new(HubConnection::from_config(&config, &TokenStore::in_memory(None)).unwrap());
    let mut lifecycle = hub.lifecycle();
    let _connection = connect_and_join(&hub, &mut server).await;
    assert_eq!(next_lifecycle(&mut lifecycle).await, ConnectionEvent::Connected);

    match next_lifecycle(&mut lifecycle).await {
        ConnectionEvent::Closed { reason: Some(reason) } => {
            assert!(reason.contains("Server timeout"), "unexpected reason: {reason}");
        }
        other => panic!("expected Closed, got {other:?}"),
    }
}

#[tokio::test]
async fn stop_fails_pending_invocations() {
    let Some(mut server) = start_hub_or_skip("stop_fails_pending_invocations").await else {
        return;
    };
    let config = websocket_config(server.api_url(), &[0]);
    let hub = Arc::new(HubConnection::from_config(&config, &TokenStore::in_memory(None)).unwrap());
    let mut lifecycle = hub.lifecycle();
    let mut connection = connect_and_join(&hub, &mut server).await;
    assert_eq!(next_lifecycle(&mut lifecycle).await, ConnectionEvent::Connected);

    let call = tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { hub.invoke("NeverAnswered", vec![]).await }
    });
    connection.recv_invocation("NeverAnswered").await;

    hub.stop().await.unwrap();
    assert!(matches!(
        call.await.unwrap(),
        Err(LabError::ConnectionLost { .. })
    ));
    assert_eq!(
        next_lifecycle(&mut lifecycle).await,
        ConnectionEvent::Closed { reason: None }
    );
    assert_eq!(hub.state(), HubState::Disconnected);
    assert!(matches!(
        hub.invoke("After", vec![]).await,
        Err(LabError::NotConnected)
    ));

    // A stopped connection does not come back by itself.
    assert!(server.try_accept_connection(Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn failed_start_is_not_retried() {
    let config = websocket_config("http://127.0.0.1:9/api".into(), &[0, 0]);
    let hub = HubConnection::from_config(&config, &TokenStore::in_memory(None)).unwrap();
    let mut lifecycle = hub.lifecycle();

    assert!(LiveFeed::connect(&hub).await.is_err());
    assert_eq!(hub.state(), HubState::Disconnected);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(lifecycle.try_recv().is_err());
}

// ─── Long polling ───────────────────────────────────────────────────────

/// Scripted long-polling hub on the mock HTTP backend.
struct LongPollingHub {
    outgoing_tx: mpsc::UnboundedSender<String>,
    outgoing_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    polls: AtomicUsize,
    closed: AtomicBool,
}

impl LongPollingHub {
    fn new() -> Arc<Self> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            outgoing_tx,
            outgoing_rx: Mutex::new(outgoing_rx),
            polls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn handle_send(&self, body: &str) {
        for record in body.split(RS).filter(|r| !r.is_empty()) {
            let Ok(message) = serde_json::from_str::<Value>(record) else {
                continue;
            };
            if message.get("protocol").is_some() {
                let _ = self.outgoing_tx.send(format!("{{}}{RS}"));
            } else if let Some(id) = message.get("invocationId").and_then(Value::as_str) {
                let completion = json!({ "type": 3, "invocationId": id, "result": null });
                let _ = self.outgoing_tx.send(format!("{completion}{RS}"));
            }
        }
    }

    async fn handle(self: Arc<Self>, request: RecordedRequest) -> MockResponse {
        match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/hubs/log/negotiate") => MockResponse::json(
                200,
                json!({
                    "connectionId": "conn-1",
                    "connectionToken": "ctok-1",
                    "negotiateVersion": 1,
                    "availableTransports": [
                        { "transport": "LongPolling", "transferFormats": ["Text"] }
                    ]
                }),
            ),
            ("GET", "/hubs/log") => {
                if self.closed.load(Ordering::SeqCst) {
                    return MockResponse::text(204, "");
                }
                if self.polls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return MockResponse::text(200, "");
                }
                let mut rx = self.outgoing_rx.lock().await;
                match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
                    Ok(Some(text)) => MockResponse::text(200, text),
                    _ => MockResponse::text(200, ""),
                }
            }
            ("POST", "/hubs/log") => {
                self.handle_send(&request.body);
                MockResponse::text(200, "")
            }
            ("DELETE", "/hubs/log") => {
                self.closed.store(true, Ordering::SeqCst);
                MockResponse::text(200, "")
            }
            _ => MockResponse::not_found(),
        }
    }
}

#[tokio::test]
async fn long_polling_negotiates_and_joins() {
    let script = LongPollingHub::new();
    let handler: Handler = {
        let script = Arc::clone(&script);
        Arc::new(move |request| Box::pin(Arc::clone(&script).handle(request)))
    };
    let backend = match MockBackend::start(handler).await {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("Skipping long_polling_negotiates_and_joins: {err}");
            return;
        }
    };

    let mut config = LabConfig::new(backend.api_url());
    config.timeouts.hub_keep_alive_secs = 1;
    let hub =
        HubConnection::from_config(&config, &TokenStore::in_memory(Some("tok".into()))).unwrap();

    tokio::time::timeout(STEP_TIMEOUT, LiveFeed::connect(&hub))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    assert_eq!(hub.state(), HubState::Connected);

    // Long polling has its own keep-alive: no ping within two intervals.
    tokio::time::sleep(Duration::from_millis(2_200)).await;
    assert_eq!(hub.state(), HubState::Connected);

    let requests = backend.requests();
    let negotiate = requests
        .iter()
        .find(|r| r.is("POST", "/hubs/log/negotiate"))
        .unwrap();
    assert_eq!(negotiate.query.as_deref(), Some("negotiateVersion=1"));
    assert_eq!(negotiate.bearer(), Some("tok"));

    let poll = requests.iter().find(|r| r.is("GET", "/hubs/log")).unwrap();
    assert_eq!(poll.query.as_deref(), Some("id=ctok-1"));
    assert_eq!(poll.bearer(), Some("tok"));

    assert!(
        requests
            .iter()
            .any(|r| r.is("POST", "/hubs/log") && r.body.contains("JoinDashboard"))
    );

    assert!(
        !requests
            .iter()
            .any(|r| r.is("POST", "/hubs/log") && r.body.contains("\"type\":6"))
    );

    LiveFeed::disconnect(&hub).await.unwrap();
    assert_eq!(hub.state(), HubState::Disconnected);
    assert_eq!(backend.count("DELETE", "/hubs/log"), 1);
}
