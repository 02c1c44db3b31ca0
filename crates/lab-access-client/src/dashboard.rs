//! # Dashboard Controller
//!
//! Keeps the dashboard counters and usage chart in sync with the backend.
//!
//! ```text
//!   Init ──mount──► LoadingBaseline ──baseline done──► Live
//!                        │
//!                        └─(after connect delay) connect feed + JoinDashboard
//!
//!   Live:  UpdateDashboard / ReceiveCheckIn / ReceiveCheckOut
//!            → refetch stats + chart for the selected mode
//!          ReceiveDashboardStats(payload) → replace stats
//!          Reconnected → JoinDashboard again
//! ```
//!
//! Fetch failures become notices and never stop the controller; push
//! channel failures are logged and swallowed. Every asynchronous state
//! write first checks the liveness flag cleared by [`DashboardController::unmount`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::api::dashboard::{ChartMode, ChartPoint, DashboardApi, DashboardStats};
use crate::config::LabConfig;
use crate::error::{LabError, UnauthorizedHook};
use crate::hub::{ConnectionEvent, HubEvent, LiveFeed};
use crate::notice::{Notifier, messages};
use crate::route::Route;
use crate::token::TokenStore;

/// Lifecycle phase of the dashboard view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DashboardPhase {
    #[default]
    Init,
    LoadingBaseline,
    Live,
}

/// Push channel status as shown by the live indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LiveStatus {
    #[default]
    Offline,
    Connecting,
    Live,
    Reconnecting { attempt: u32 },
}

/// Snapshot of everything the dashboard view renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardState {
    pub phase: DashboardPhase,
    pub stats: DashboardStats,
    pub chart: Vec<ChartPoint>,
    pub mode: ChartMode,
    pub live: LiveStatus,
}

/// Controller settings.
#[derive(Debug, Clone)]
pub struct DashboardOptions {
    /// Delay between mount and opening the push channel.
    pub connect_delay: Duration,
    /// Periodic stats refresh; `None` disables it.
    pub poll_interval: Option<Duration>,
    pub default_mode: ChartMode,
    /// Open the push channel at all.
    pub live_enabled: bool,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(500),
            poll_interval: None,
            default_mode: ChartMode::Monthly,
            live_enabled: true,
        }
    }
}

impl DashboardOptions {
    pub fn from_config(config: &LabConfig) -> Self {
        Self {
            connect_delay: Duration::from_millis(config.hub.connect_delay_ms),
            poll_interval: (config.dashboard.poll_interval_secs > 0)
                .then(|| Duration::from_secs(config.dashboard.poll_interval_secs)),
            default_mode: config.dashboard.default_chart_mode,
            live_enabled: config.hub.enabled,
        }
    }
}

struct ControllerInner<A, F> {
    api: A,
    feed: F,
    tokens: TokenStore,
    notifier: Notifier,
    options: DashboardOptions,
    state: watch::Sender<DashboardState>,
    alive: AtomicBool,
    on_unauthorized: Option<UnauthorizedHook>,
}

impl<A, F> ControllerInner<A, F>
where
    A: DashboardApi + 'static,
    F: LiveFeed + 'static,
{
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Apply `f` to the state unless the view has been unmounted.
    fn update(&self, f: impl FnOnce(&mut DashboardState)) {
        if self.is_alive() {
            self.state.send_modify(f);
        }
    }

    fn report(&self, err: &LabError, notice: &str) {
        if !self.is_alive() {
            return;
        }
        self.notifier.error(notice);
        if err.is_unauthorized() {
            if let Some(hook) = &self.on_unauthorized {
                hook(err);
            }
        }
    }

    async fn load_stats(&self) {
        match self.api.overview_stats().await {
            Ok(stats) => self.update(|s| s.stats = stats),
            Err(e) => {
                tracing::error!(error = %e, "Failed to load dashboard stats");
                self.report(&e, messages::STATS_LOAD_FAILED);
            }
        }
    }

    async fn load_chart(&self, mode: ChartMode) {
        match self.api.chart_series(mode).await {
            Ok(points) => self.update(|s| {
                if s.mode == mode {
                    s.chart = points;
                } else {
                    tracing::debug!(?mode, selected = ?s.mode, "Discarding chart for a deselected mode");
                }
            }),
            Err(e) => {
                tracing::error!(error = %e, ?mode, "Failed to load chart");
                self.report(&e, messages::CHART_LOAD_FAILED);
            }
        }
    }

    /// Refetch stats and the chart for the currently selected mode.
    async fn refresh(&self) {
        let mode = self.state.borrow().mode;
        tokio::join!(self.load_stats(), self.load_chart(mode));
    }

    fn set_live(&self, live: LiveStatus) {
        self.update(|s| s.live = live);
    }
}

/// Dashboard state owner. Call [`mount`](Self::mount) when the view opens
/// and [`unmount`](Self::unmount) when it closes.
pub struct DashboardController<A, F> {
    inner: Arc<ControllerInner<A, F>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<A, F> DashboardController<A, F>
where
    A: DashboardApi + 'static,
    F: LiveFeed + 'static,
{
    pub fn new(
        api: A,
        feed: F,
        tokens: TokenStore,
        notifier: Notifier,
        options: DashboardOptions,
    ) -> Self {
        let (state, _) = watch::channel(DashboardState {
            mode: options.default_mode,
            ..DashboardState::default()
        });
        Self {
            inner: Arc::new(ControllerInner {
                api,
                feed,
                tokens,
                notifier,
                options,
                state,
                alive: AtomicBool::new(false),
                on_unauthorized: None,
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Install a handler for `401` responses (typically the session
    /// store's error handler). Must be called before `mount`.
    #[must_use]
    pub fn with_unauthorized_hook(mut self, hook: UnauthorizedHook) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.on_unauthorized = Some(hook);
        } else {
            tracing::warn!("Unauthorized hook ignored: controller already mounted");
        }
        self
    }

    pub fn snapshot(&self) -> DashboardState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.inner.state.subscribe()
    }

    pub fn feed(&self) -> &F {
        &self.inner.feed
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.is_alive()
    }

    /// Open the dashboard. Returns the login route, without fetching, when
    /// no token is stored. Otherwise loads the baseline (stats and chart
    /// concurrently) while the push channel is opened in the background.
    pub async fn mount(&self) -> Option<Route> {
        if !self.inner.tokens.has_token() {
            tracing::info!("No auth token, dashboard redirects to login");
            return Some(Route::Login);
        }

        self.inner.alive.store(true, Ordering::SeqCst);
        self.inner.update(|s| s.phase = DashboardPhase::LoadingBaseline);

        let mut tasks = Vec::new();
        if self.inner.options.live_enabled {
            tasks.push(tokio::spawn(event_loop(
                Arc::clone(&self.inner),
                self.inner.feed.events(),
                self.inner.feed.lifecycle(),
            )));
            tasks.push(tokio::spawn(connect_after_delay(Arc::clone(&self.inner))));
        }
        if let Some(interval) = self.inner.options.poll_interval {
            tasks.push(tokio::spawn(poll_loop(Arc::clone(&self.inner), interval)));
        }
        self.lock_tasks().extend(tasks);

        let mode = self.inner.state.borrow().mode;
        tokio::join!(self.inner.load_stats(), self.inner.load_chart(mode));

        self.inner.update(|s| s.phase = DashboardPhase::Live);
        tracing::debug!("Dashboard baseline loaded");
        None
    }

    /// Switch the chart mode. Only the chart series is refetched; switching
    /// to the selected mode does nothing.
    pub async fn set_mode(&self, mode: ChartMode) {
        if self.inner.state.borrow().mode == mode {
            return;
        }
        self.inner.update(|s| s.mode = mode);
        self.inner.load_chart(mode).await;
    }

    pub async fn toggle_mode(&self) {
        let next = self.inner.state.borrow().mode.toggled();
        self.set_mode(next).await;
    }

    /// Refetch stats and chart now.
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Close the dashboard: stop writing state and stop the push channel.
    /// Errors while stopping are swallowed.
    pub async fn unmount(&self) {
        if !self.inner.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let tasks: Vec<_> = self.lock_tasks().drain(..).collect();
        for task in tasks {
            task.abort();
        }
        if self.inner.options.live_enabled {
            if let Err(e) = self.inner.feed.disconnect().await {
                tracing::debug!(error = %e, "Stopping dashboard feed failed");
            }
        }
        self.inner.state.send_modify(|s| {
            s.phase = DashboardPhase::Init;
            s.live = LiveStatus::Offline;
        });
        tracing::debug!("Dashboard unmounted");
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A, F> Drop for DashboardController<A, F> {
    fn drop(&mut self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

async fn connect_after_delay<A, F>(inner: Arc<ControllerInner<A, F>>)
where
    A: DashboardApi + 'static,
    F: LiveFeed + 'static,
{
    tokio::time::sleep(inner.options.connect_delay).await;
    if !inner.is_alive() {
        return;
    }

    inner.set_live(LiveStatus::Connecting);
    match inner.feed.connect().await {
        Ok(()) => {
            if inner.is_alive() {
                tracing::info!("Dashboard live feed connected");
                inner.set_live(LiveStatus::Live);
            } else if let Err(e) = inner.feed.disconnect().await {
                tracing::debug!(error = %e, "Stopping late dashboard feed failed");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dashboard live feed unavailable");
            inner.set_live(LiveStatus::Offline);
        }
    }
}

async fn event_loop<A, F>(
    inner: Arc<ControllerInner<A, F>>,
    mut events: broadcast::Receiver<HubEvent>,
    mut lifecycle: broadcast::Receiver<ConnectionEvent>,
) where
    A: DashboardApi + 'static,
    F: LiveFeed + 'static,
{
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(HubEvent::DashboardStats(stats)) => {
                    tracing::debug!(?stats, "Dashboard stats pushed");
                    inner.update(|s| s.stats = stats);
                }
                Ok(event) if event.is_delta() => {
                    tracing::debug!(?event, "Dashboard delta, refreshing");
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move { inner.refresh().await });
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dashboard fell behind the hub, refreshing");
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move { inner.refresh().await });
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = lifecycle.recv() => match event {
                Ok(ConnectionEvent::Connected) => inner.set_live(LiveStatus::Live),
                Ok(ConnectionEvent::Reconnecting { attempt }) => {
                    inner.set_live(LiveStatus::Reconnecting { attempt });
                }
                Ok(ConnectionEvent::Reconnected) => {
                    inner.set_live(LiveStatus::Live);
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        if let Err(e) = inner.feed.join_dashboard().await {
                            tracing::warn!(error = %e, "Re-joining dashboard group failed");
                        }
                    });
                }
                Ok(ConnectionEvent::Closed { reason }) => {
                    tracing::info!(reason = reason.as_deref().unwrap_or("stopped"), "Dashboard live feed closed");
                    inner.set_live(LiveStatus::Offline);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
        if !inner.is_alive() {
            break;
        }
    }
}

async fn poll_loop<A, F>(inner: Arc<ControllerInner<A, F>>, period: Duration)
where
    A: DashboardApi + 'static,
    F: LiveFeed + 'static,
{
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        interval.tick().await;
        if !inner.is_alive() {
            break;
        }
        inner.load_stats().await;
    }
}
