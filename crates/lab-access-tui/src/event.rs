//! Application events bridging library state and terminal input.
//!
//! [`AppEvent`] is the single event type consumed by the main TUI loop.
//! Terminal events arrive via crossterm's `EventStream`, state changes and
//! fetch results via a `tokio::sync::mpsc` channel fed by the bridge tasks,
//! and ticks from a periodic timer.

use lab_access_client::activity::FilterOptions;
use lab_access_client::api::cards::Card;
use lab_access_client::api::logs::ActivityLogRow;
use lab_access_client::api::rooms::Room;
use lab_access_client::crud::SubmitOutcome;
use lab_access_client::notice::{Notice, NoticeLevel};
use lab_access_client::{DashboardState, QueryKey, Route, Session};

/// Every event the TUI main loop can receive.
#[derive(Debug)]
pub enum AppEvent {
    /// A crossterm terminal event (key press, mouse, resize).
    Terminal(crossterm::event::Event),
    /// Render tick.
    Tick,

    // ── Library state ───────────────────────────────────────────────
    /// New session snapshot.
    Session(Session),
    /// New dashboard snapshot.
    Dashboard(DashboardState),
    /// A user-facing notice.
    Notice(Notice),
    /// Navigate to a route (login redirects, post-login navigation).
    Redirect(Route),
    /// A cached list went stale and should be refetched.
    Invalidated(QueryKey),

    // ── Fetch results ───────────────────────────────────────────────
    ActivityLoaded(Vec<ActivityLogRow>),
    /// `None` keeps the current option lists.
    OptionsLoaded(Option<FilterOptions>),
    CardsLoaded(Vec<Card>),
    RoomsLoaded(Vec<Room>),
    /// A list fetch failed; the loading flag of that view is cleared.
    LoadFailed(QueryKey),

    // ── Form results ────────────────────────────────────────────────
    LoginFinished(lab_access_client::session::LoginOutcome),
    CardSubmitted(SubmitOutcome),
    RoomSubmitted(SubmitOutcome),
    PasswordChanged(bool),

    /// Request application quit.
    Quit,
}

/// Severity levels for log entries shown in the Log tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

/// Where a log entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOrigin {
    /// A notice the library showed to the user.
    Notice,
    /// Console bookkeeping (startup, live feed changes, navigation).
    Console,
}

/// A single log entry for the scrollable log panel.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub time: chrono::DateTime<chrono::Local>,
    pub level: LogLevel,
    pub origin: LogOrigin,
    pub message: String,
}

impl LogEntry {
    pub fn info(msg: impl Into<String>) -> Self {
        Self::at(LogLevel::Info, LogOrigin::Console, msg)
    }

    pub fn warn(msg: impl Into<String>) -> Self {
        Self::at(LogLevel::Warn, LogOrigin::Console, msg)
    }

    fn at(level: LogLevel, origin: LogOrigin, msg: impl Into<String>) -> Self {
        Self {
            time: chrono::Local::now(),
            level,
            origin,
            message: msg.into(),
        }
    }

    /// Log entry for a notice. Dismissals carry no text and map to `None`.
    pub fn from_notice(notice: &Notice) -> Option<Self> {
        let level = match notice.level {
            NoticeLevel::Success => LogLevel::Success,
            NoticeLevel::Loading => LogLevel::Info,
            NoticeLevel::Error => LogLevel::Error,
            NoticeLevel::Dismiss => return None,
        };
        Some(Self::at(level, LogOrigin::Notice, notice.message.clone()))
    }
}
