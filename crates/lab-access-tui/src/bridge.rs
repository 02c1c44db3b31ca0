//! Async bridge: owns the library services and runs every awaited
//! operation on background tasks, reporting back as [`AppEvent`] variants.
//!
//! Long-lived tasks forward library state (session snapshots, dashboard
//! snapshots, notices, cache invalidations) into the TUI event channel.
//! Key handlers never await; they call the `spawn_*` helpers here.

use std::sync::Arc;

use lab_access_client::activity;
use lab_access_client::api::{CardApi, RoomApi};
use lab_access_client::forms::{CardForm, ChangePasswordForm, LoginForm, RoomForm};
use lab_access_client::notice::messages;
use lab_access_client::{
    ApiClient, AuthGuard, DashboardController, DashboardOptions, HubConnection, LabConfig,
    LabError, LabResult, Mutations, Notifier, QueryCache, QueryKey, SessionStore, TokenStore,
    UnauthorizedHook,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::event::AppEvent;

pub type EventSender = mpsc::UnboundedSender<AppEvent>;

// ─── Services ────────────────────────────────────────────────────────────

/// The library objects shared by the console.
pub struct Services {
    pub api: ApiClient,
    pub notifier: Notifier,
    pub session: Arc<SessionStore<ApiClient>>,
    pub dashboard: DashboardController<ApiClient, HubConnection>,
    pub mutations: Mutations<ApiClient>,
}

impl Services {
    /// Wire the services for `config`. The dashboard and the mutations
    /// report `401`s to the session store.
    ///
    /// # Errors
    /// The token file cannot be opened or an HTTP client cannot be built.
    pub fn from_config(config: &LabConfig) -> LabResult<Self> {
        let tokens = TokenStore::open(config.token_path())?;
        let api = ApiClient::new(config, tokens.clone())?;
        let notifier = Notifier::new();
        let session = Arc::new(SessionStore::new(
            api.clone(),
            tokens.clone(),
            notifier.clone(),
        ));

        let hub = HubConnection::from_config(config, &tokens)?;
        let on_unauthorized: UnauthorizedHook = {
            let session = Arc::clone(&session);
            Arc::new(move |err: &LabError| {
                session.handle_api_error(err);
            })
        };
        let dashboard = DashboardController::new(
            api.clone(),
            hub,
            tokens,
            notifier.clone(),
            DashboardOptions::from_config(config),
        )
        .with_unauthorized_hook(Arc::clone(&on_unauthorized));

        let mutations = Mutations::new(api.clone(), notifier.clone(), QueryCache::new())
            .with_unauthorized_hook(on_unauthorized);

        tracing::debug!(api = %api.base_url(), hub = %config.hub_url(), "Services ready");
        Ok(Self {
            api,
            notifier,
            session,
            dashboard,
            mutations,
        })
    }

    /// Common handling of a failed list fetch: log, notify, and reset the
    /// session on `401`.
    fn report_failure(&self, tx: &EventSender, key: QueryKey, err: &LabError) {
        tracing::error!(error = %err, ?key, "Fetch failed");
        self.notifier
            .error(err.user_message(messages::GENERIC_FAILURE));
        if let Some(route) = self.session.handle_api_error(err) {
            let _ = tx.send(AppEvent::Redirect(route));
        }
        let _ = tx.send(AppEvent::LoadFailed(key));
    }
}

// ─── Forwarders ──────────────────────────────────────────────────────────

fn forward_watch<T, F>(mut rx: watch::Receiver<T>, tx: EventSender, wrap: F) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> AppEvent + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let value = rx.borrow_and_update().clone();
            if tx.send(wrap(value)).is_err() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

fn forward_broadcast<T, F>(mut rx: broadcast::Receiver<T>, tx: EventSender, wrap: F) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> AppEvent + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(value) => {
                    if tx.send(wrap(value)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Console fell behind a broadcast channel");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Forward session snapshots, dashboard snapshots, notices and cache
/// invalidations for the lifetime of the console.
pub fn spawn_forwarders(services: &Arc<Services>, tx: &EventSender) -> Vec<JoinHandle<()>> {
    vec![
        forward_watch(services.session.subscribe(), tx.clone(), AppEvent::Session),
        forward_watch(services.dashboard.subscribe(), tx.clone(), AppEvent::Dashboard),
        forward_broadcast(services.notifier.subscribe(), tx.clone(), AppEvent::Notice),
        forward_broadcast(
            services.mutations.cache().subscribe(),
            tx.clone(),
            AppEvent::Invalidated,
        ),
    ]
}

/// Run the auth guard while the protected area is shown. Aborting the
/// returned task unmounts it.
pub fn spawn_guard(services: &Arc<Services>, tx: &EventSender) -> JoinHandle<()> {
    let guard = AuthGuard::new(Arc::clone(&services.session));
    let tx = tx.clone();
    tokio::spawn(async move {
        let (redirect_tx, mut redirect_rx) = mpsc::unbounded_channel();
        let forward = async {
            while let Some(route) = redirect_rx.recv().await {
                if tx.send(AppEvent::Redirect(route)).is_err() {
                    break;
                }
            }
        };
        tokio::select! {
            () = guard.run(redirect_tx) => {}
            () = forward => {}
        }
    })
}

// ─── Dashboard lifecycle ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardCommand {
    Mount,
    Unmount,
    ToggleMode,
    Refresh,
}

/// Apply dashboard commands one at a time, so a quick mount / unmount
/// sequence cannot interleave.
pub fn spawn_dashboard_worker(
    services: Arc<Services>,
    tx: EventSender,
) -> mpsc::UnboundedSender<DashboardCommand> {
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            tracing::debug!(?command, "Dashboard command");
            let dashboard = &services.dashboard;
            match command {
                DashboardCommand::Mount => {
                    if dashboard.is_mounted() {
                        continue;
                    }
                    if let Some(route) = dashboard.mount().await {
                        let _ = tx.send(AppEvent::Redirect(route));
                    }
                }
                DashboardCommand::Unmount => dashboard.unmount().await,
                DashboardCommand::ToggleMode => dashboard.toggle_mode().await,
                DashboardCommand::Refresh => dashboard.refresh().await,
            }
        }
    });
    command_tx
}

// ─── Fetches ─────────────────────────────────────────────────────────────

/// Fetch the access log and the filter option lists concurrently.
pub fn spawn_load_activity(services: &Arc<Services>, tx: &EventSender) {
    let services = Arc::clone(services);
    let tx = tx.clone();
    tokio::spawn(async move {
        let (rows, options) = tokio::join!(
            services.api.access_logs(),
            activity::load_options(&services.api, services.api.tokens()),
        );
        let _ = tx.send(AppEvent::OptionsLoaded(options));
        match rows {
            Ok(rows) => {
                tracing::debug!(rows = rows.len(), "Access log loaded");
                let _ = tx.send(AppEvent::ActivityLoaded(rows));
            }
            Err(e) => services.report_failure(&tx, QueryKey::AccessLogs, &e),
        }
    });
}

/// Fetch only the filter option lists (used by the card owner picker).
pub fn spawn_load_options(services: &Arc<Services>, tx: &EventSender) {
    let services = Arc::clone(services);
    let tx = tx.clone();
    tokio::spawn(async move {
        let options = activity::load_options(&services.api, services.api.tokens()).await;
        let _ = tx.send(AppEvent::OptionsLoaded(options));
    });
}

pub fn spawn_load_cards(services: &Arc<Services>, tx: &EventSender) {
    let services = Arc::clone(services);
    let tx = tx.clone();
    tokio::spawn(async move {
        match services.api.list_cards().await {
            Ok(cards) => {
                let _ = tx.send(AppEvent::CardsLoaded(cards));
            }
            Err(e) => services.report_failure(&tx, QueryKey::Cards, &e),
        }
    });
}

pub fn spawn_load_rooms(services: &Arc<Services>, tx: &EventSender) {
    let services = Arc::clone(services);
    let tx = tx.clone();
    tokio::spawn(async move {
        match services.api.list_rooms().await {
            Ok(rooms) => {
                let _ = tx.send(AppEvent::RoomsLoaded(rooms));
            }
            Err(e) => services.report_failure(&tx, QueryKey::Rooms, &e),
        }
    });
}

// ─── Session actions ─────────────────────────────────────────────────────

/// Entering the login view with a stored token resumes the session.
pub fn spawn_resume(services: &Arc<Services>, tx: &EventSender) {
    if !services.session.tokens().has_token() {
        return;
    }
    let services = Arc::clone(services);
    let tx = tx.clone();
    tokio::spawn(async move {
        if let Some(route) = services.session.resume().await {
            let _ = tx.send(AppEvent::Redirect(route));
        }
    });
}

pub fn spawn_login(services: &Arc<Services>, tx: &EventSender, form: LoginForm) {
    let services = Arc::clone(services);
    let tx = tx.clone();
    tokio::spawn(async move {
        let outcome = services.session.submit_login(&form).await;
        let _ = tx.send(AppEvent::LoginFinished(outcome));
    });
}

pub fn spawn_change_password(services: &Arc<Services>, tx: &EventSender, form: ChangePasswordForm) {
    let services = Arc::clone(services);
    let tx = tx.clone();
    tokio::spawn(async move {
        let changed = services.session.change_password(&form).await;
        let _ = tx.send(AppEvent::PasswordChanged(changed));
    });
}

// ─── Mutations ───────────────────────────────────────────────────────────

pub fn spawn_submit_card(services: &Arc<Services>, tx: &EventSender, form: CardForm) {
    let services = Arc::clone(services);
    let tx = tx.clone();
    tokio::spawn(async move {
        let outcome = services.mutations.submit_card(&form).await;
        let _ = tx.send(AppEvent::CardSubmitted(outcome));
    });
}

pub fn spawn_delete_card(services: &Arc<Services>, id: i64) {
    let services = Arc::clone(services);
    tokio::spawn(async move {
        services.mutations.delete_card(id).await;
    });
}

pub fn spawn_submit_room(services: &Arc<Services>, tx: &EventSender, form: RoomForm) {
    let services = Arc::clone(services);
    let tx = tx.clone();
    tokio::spawn(async move {
        let outcome = services.mutations.submit_room(&form).await;
        let _ = tx.send(AppEvent::RoomSubmitted(outcome));
    });
}

pub fn spawn_delete_room(services: &Arc<Services>, id: i64) {
    let services = Arc::clone(services);
    tokio::spawn(async move {
        services.mutations.delete_room(id).await;
    });
}
