//! Application state for the console.
//!
//! [`App`] holds all mutable state consumed by the rendering and event-loop
//! layers: the current route and session snapshot, per-view state (forms,
//! tables, filter selection), notices and the log.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use lab_access_client::activity::{ActivityFilter, FilterField, STATUS_CHECKIN, STATUS_CHECKOUT};
use lab_access_client::api::cards::{Card, CardStatus};
use lab_access_client::api::rooms::Room;
use lab_access_client::crud::SubmitOutcome;
use lab_access_client::dashboard::LiveStatus;
use lab_access_client::forms::{
    CardForm, ChangePasswordForm, LoginForm, OwnerKind, RoomForm, ValidationErrors,
};
use lab_access_client::guard::{self, GuardView};
use lab_access_client::notice::{Notice, NoticeLevel};
use lab_access_client::session::LoginOutcome;
use lab_access_client::{DashboardState, QueryKey, Route, Session};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::{self, DashboardCommand, EventSender, Services};
use crate::event::{AppEvent, LogEntry};

/// Maximum number of log entries retained.
const LOG_CAP: usize = 500;

/// How long a notice stays in the status bar.
const TOAST_TTL: Duration = Duration::from_secs(4);

// ─── Tab Enum ────────────────────────────────────────────────────────────

/// Top-level tabs of the protected area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    Dashboard,
    Activity,
    Cards,
    Rooms,
    Profile,
    Log,
}

impl Tab {
    /// Ordered list used for tab bar rendering and keyboard navigation.
    pub fn all() -> &'static [Tab] {
        &[
            Tab::Dashboard,
            Tab::Activity,
            Tab::Cards,
            Tab::Rooms,
            Tab::Profile,
            Tab::Log,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            Tab::Dashboard => "Dashboard",
            Tab::Activity => "Aktivitas",
            Tab::Cards => "Kartu",
            Tab::Rooms => "Lab",
            Tab::Profile => "Profil",
            Tab::Log => "Log",
        }
    }

    pub fn next(self) -> Self {
        let tabs = Self::all();
        let idx = tabs.iter().position(|&t| t == self).unwrap_or(0);
        tabs[(idx + 1) % tabs.len()]
    }

    pub fn prev(self) -> Self {
        let tabs = Self::all();
        let idx = tabs.iter().position(|&t| t == self).unwrap_or(0);
        tabs[(idx + tabs.len() - 1) % tabs.len()]
    }

    /// Route shown by this tab; the log tab is console-only.
    pub fn route(self) -> Option<Route> {
        match self {
            Tab::Dashboard => Some(Route::Dashboard),
            Tab::Activity => Some(Route::Activity),
            Tab::Cards => Some(Route::Cards),
            Tab::Rooms => Some(Route::Rooms),
            Tab::Profile => Some(Route::Profile),
            Tab::Log => None,
        }
    }

    pub fn from_route(route: Route) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.route() == Some(route))
    }
}

/// Apply a key to a single-line text field. Returns `true` when handled.
fn edit_text(value: &mut String, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            value.push(c);
            true
        }
        KeyCode::Backspace => {
            value.pop();
            true
        }
        _ => false,
    }
}

/// What a form editor wants after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditorAction {
    None,
    Submit,
    Cancel,
}

// ─── Login view ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Username,
    Password,
}

#[derive(Debug, Default)]
pub struct LoginView {
    pub form: LoginForm,
    pub focus: Option<LoginField>,
    pub errors: ValidationErrors,
    pub submitting: bool,
}

impl LoginView {
    pub fn focused(&self) -> LoginField {
        self.focus.unwrap_or(LoginField::Username)
    }

    fn toggle_focus(&mut self) {
        self.focus = Some(match self.focused() {
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::Username,
        });
    }

    fn handle_key(&mut self, key: KeyEvent) -> EditorAction {
        match key.code {
            KeyCode::Enter => EditorAction::Submit,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.toggle_focus();
                EditorAction::None
            }
            _ => {
                let field = match self.focused() {
                    LoginField::Username => &mut self.form.username,
                    LoginField::Password => &mut self.form.password,
                };
                edit_text(field, key);
                EditorAction::None
            }
        }
    }
}

// ─── Activity view ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ActivityView {
    pub filter: ActivityFilter,
    /// Index into [`FilterField::ALL`].
    pub field: usize,
    /// Text being typed into a date field.
    pub editing: Option<String>,
    pub loading: bool,
    pub scroll: usize,
}

impl ActivityView {
    pub fn selected_field(&self) -> FilterField {
        FilterField::ALL[self.field % FilterField::ALL.len()]
    }

    fn is_date(field: FilterField) -> bool {
        matches!(field, FilterField::StartDate | FilterField::EndDate)
    }

    /// Values a selector field cycles through, "no filter" first.
    pub fn choices(&self, field: FilterField) -> Vec<String> {
        let options = self.filter.options();
        let values: Vec<String> = match field {
            FilterField::Lab => options.labs.iter().map(|r| r.id.to_string()).collect(),
            FilterField::Kelas => options.kelas.iter().map(|k| k.id.to_string()).collect(),
            FilterField::User => options.users.iter().map(|u| u.id.to_string()).collect(),
            FilterField::Status => vec![STATUS_CHECKIN.to_string(), STATUS_CHECKOUT.to_string()],
            FilterField::StartDate | FilterField::EndDate => Vec::new(),
        };
        std::iter::once(String::new()).chain(values).collect()
    }

    fn cycle(&mut self, forward: bool) {
        let field = self.selected_field();
        let choices = self.choices(field);
        let len = choices.len();
        if len <= 1 {
            return;
        }
        let current = self.filter.criteria().get(field);
        let idx = choices.iter().position(|c| c == current).unwrap_or(0);
        let next = if forward {
            (idx + 1) % len
        } else {
            (idx + len - 1) % len
        };
        self.filter.set(field, choices[next].clone());
        self.scroll = 0;
    }

    fn move_field(&mut self, forward: bool) {
        let len = FilterField::ALL.len();
        self.field = if forward {
            (self.field + 1) % len
        } else {
            (self.field + len - 1) % len
        };
    }

    /// Keys while a date is being typed. Enter commits through the
    /// by-name change handler.
    fn handle_edit_key(&mut self, key: KeyEvent) {
        let Some(buffer) = self.editing.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.editing = None,
            KeyCode::Enter => {
                let value = buffer.trim().to_string();
                self.editing = None;
                self.filter.set_field(self.selected_field().name(), value);
                self.scroll = 0;
            }
            _ => {
                edit_text(buffer, key);
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.move_field(false),
            KeyCode::Down | KeyCode::Char('j') => self.move_field(true),
            KeyCode::Left | KeyCode::Char('h') => self.cycle(false),
            KeyCode::Right | KeyCode::Char('l' | ' ') => self.cycle(true),
            KeyCode::Enter if Self::is_date(self.selected_field()) => {
                self.editing = Some(self.filter.criteria().get(self.selected_field()).to_string());
            }
            KeyCode::Backspace | KeyCode::Delete => {
                self.filter.set(self.selected_field(), "");
                self.scroll = 0;
            }
            KeyCode::Char('x') => {
                self.filter.reset();
                self.scroll = 0;
            }
            KeyCode::PageDown => {
                let max = self.filter.filtered().len().saturating_sub(1);
                self.scroll = (self.scroll + 10).min(max);
            }
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(10),
            _ => {}
        }
    }
}

// ─── Card editor ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardField {
    Uid,
    Status,
    Keterangan,
    Owner,
    OwnerId,
}

impl CardField {
    pub const ALL: [CardField; 5] = [
        CardField::Uid,
        CardField::Status,
        CardField::Keterangan,
        CardField::Owner,
        CardField::OwnerId,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CardField::Uid => "UID",
            CardField::Status => "Status",
            CardField::Keterangan => "Keterangan",
            CardField::Owner => "Pemilik",
            CardField::OwnerId => "ID Pemilik",
        }
    }
}

#[derive(Debug)]
pub struct CardEditor {
    pub form: CardForm,
    pub field: CardField,
    pub owner: OwnerKind,
    pub errors: ValidationErrors,
    pub submitting: bool,
}

impl CardEditor {
    pub fn create() -> Self {
        Self {
            form: CardForm::default(),
            field: CardField::Uid,
            owner: OwnerKind::User,
            errors: ValidationErrors::new(),
            submitting: false,
        }
    }

    pub fn edit(card: &Card) -> Self {
        let form = CardForm::edit(card);
        let owner = form.owner_kind();
        Self {
            form,
            field: CardField::Uid,
            owner,
            errors: ValidationErrors::new(),
            submitting: false,
        }
    }

    pub fn owner_id(&self) -> &str {
        match self.owner {
            OwnerKind::User => &self.form.user_id,
            OwnerKind::Class => &self.form.kelas_id,
        }
    }

    /// Validation message shown under `field`.
    pub fn error_for(&self, field: CardField) -> Option<&str> {
        match field {
            CardField::Uid => self.errors.get("uid"),
            CardField::Status => self.errors.get("status"),
            CardField::Keterangan | CardField::Owner => None,
            CardField::OwnerId => match self.owner {
                OwnerKind::User => self.errors.get("userId"),
                OwnerKind::Class => self.errors.get("kelasId"),
            },
        }
    }

    fn owner_id_mut(&mut self) -> &mut String {
        match self.owner {
            OwnerKind::User => &mut self.form.user_id,
            OwnerKind::Class => &mut self.form.kelas_id,
        }
    }

    /// Switch between user and class ownership, carrying the typed id over.
    fn toggle_owner(&mut self) {
        let id = std::mem::take(self.owner_id_mut());
        self.owner = match self.owner {
            OwnerKind::User => OwnerKind::Class,
            OwnerKind::Class => OwnerKind::User,
        };
        *self.owner_id_mut() = id;
    }

    fn cycle_status(&mut self) {
        let idx = CardStatus::parse(&self.form.status)
            .and_then(|s| CardStatus::ALL.iter().position(|x| *x == s))
            .unwrap_or(0);
        let next = CardStatus::ALL[(idx + 1) % CardStatus::ALL.len()];
        self.form.status = next.as_str().to_string();
    }

    fn move_field(&mut self, forward: bool) {
        let all = CardField::ALL;
        let idx = all.iter().position(|f| *f == self.field).unwrap_or(0);
        self.field = if forward {
            all[(idx + 1) % all.len()]
        } else {
            all[(idx + all.len() - 1) % all.len()]
        };
    }

    fn handle_key(&mut self, key: KeyEvent) -> EditorAction {
        match key.code {
            KeyCode::Esc => return EditorAction::Cancel,
            KeyCode::Enter => return EditorAction::Submit,
            KeyCode::Tab | KeyCode::Down => self.move_field(true),
            KeyCode::BackTab | KeyCode::Up => self.move_field(false),
            _ => match self.field {
                CardField::Status => {
                    if matches!(key.code, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) {
                        self.cycle_status();
                    }
                }
                CardField::Owner => {
                    if matches!(key.code, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) {
                        self.toggle_owner();
                    }
                }
                CardField::Uid => {
                    edit_text(&mut self.form.uid, key);
                }
                CardField::Keterangan => {
                    edit_text(&mut self.form.keterangan, key);
                }
                CardField::OwnerId => {
                    edit_text(self.owner_id_mut(), key);
                }
            },
        }
        EditorAction::None
    }
}

#[derive(Debug, Default)]
pub struct CardsView {
    pub items: Vec<Card>,
    pub selected: usize,
    pub editor: Option<CardEditor>,
    pub confirm_delete: Option<i64>,
    pub loading: bool,
}

impl CardsView {
    pub fn selected_card(&self) -> Option<&Card> {
        self.items.get(self.selected)
    }
}

// ─── Room editor ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RoomEditor {
    pub form: RoomForm,
    pub errors: ValidationErrors,
    pub submitting: bool,
}

impl RoomEditor {
    pub fn edit(room: &Room) -> Self {
        Self {
            form: RoomForm::edit(room),
            ..Self::default()
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> EditorAction {
        match key.code {
            KeyCode::Esc => EditorAction::Cancel,
            KeyCode::Enter => EditorAction::Submit,
            _ => {
                edit_text(&mut self.form.nama, key);
                EditorAction::None
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RoomsView {
    pub items: Vec<Room>,
    pub selected: usize,
    pub editor: Option<RoomEditor>,
    pub confirm_delete: Option<i64>,
    pub loading: bool,
}

impl RoomsView {
    pub fn selected_room(&self) -> Option<&Room> {
        self.items.get(self.selected)
    }
}

// ─── Profile view ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ProfileView {
    pub form: ChangePasswordForm,
    /// 0: old password, 1: new password, 2: confirmation.
    pub field: usize,
    pub editing: bool,
    pub submitting: bool,
}

impl ProfileView {
    fn handle_key(&mut self, key: KeyEvent) -> EditorAction {
        match key.code {
            KeyCode::Esc => return EditorAction::Cancel,
            KeyCode::Enter => return EditorAction::Submit,
            KeyCode::Tab | KeyCode::Down => self.field = (self.field + 1) % 3,
            KeyCode::BackTab | KeyCode::Up => self.field = (self.field + 2) % 3,
            _ => {
                let value = match self.field {
                    0 => &mut self.form.old_password,
                    1 => &mut self.form.new_password,
                    _ => &mut self.form.confirm_password,
                };
                edit_text(value, key);
            }
        }
        EditorAction::None
    }
}

// ─── Main App State ──────────────────────────────────────────────────────

/// All mutable console state.
pub struct App {
    services: Arc<Services>,
    tx: EventSender,
    dashboard_tx: mpsc::UnboundedSender<DashboardCommand>,
    guard_task: Option<JoinHandle<()>>,

    // ── Navigation ──────────────────────────────────────────────────
    pub route: Route,
    pub active_tab: Tab,
    pub session: Session,
    pub show_help: bool,
    pub should_quit: bool,

    // ── Views ───────────────────────────────────────────────────────
    pub login: LoginView,
    pub dashboard: DashboardState,
    pub activity: ActivityView,
    pub cards: CardsView,
    pub rooms: RoomsView,
    pub profile: ProfileView,

    // ── Notices / log ───────────────────────────────────────────────
    pub toast: Option<(Notice, Instant)>,
    pub log_entries: VecDeque<LogEntry>,
    pub log_auto_scroll: bool,
    pub scroll_offset: u16,

    pub started_at: Instant,
}

impl App {
    pub fn new(
        services: Arc<Services>,
        tx: EventSender,
        dashboard_tx: mpsc::UnboundedSender<DashboardCommand>,
    ) -> Self {
        Self {
            services,
            tx,
            dashboard_tx,
            guard_task: None,

            route: Route::Login,
            active_tab: Tab::Dashboard,
            session: Session::empty(),
            show_help: false,
            should_quit: false,

            login: LoginView::default(),
            dashboard: DashboardState::default(),
            activity: ActivityView::default(),
            cards: CardsView::default(),
            rooms: RoomsView::default(),
            profile: ProfileView::default(),

            toast: None,
            log_entries: VecDeque::with_capacity(LOG_CAP),
            log_auto_scroll: true,
            scroll_offset: 0,

            started_at: Instant::now(),
        }
    }

    /// The console opens on the login view; a stored session is resumed.
    pub fn start(&mut self) {
        self.log(LogEntry::info("Console started"));
        bridge::spawn_resume(&self.services, &self.tx);
    }

    /// Stop background work tied to the protected area.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.guard_task.take() {
            task.abort();
        }
        self.services.dashboard.unmount().await;
    }

    /// What the protected area renders for the current session.
    pub fn guard_view(&self) -> GuardView {
        guard::view(&self.session)
    }

    /// Elapsed time since the app started.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Push a log entry, evicting the oldest if at capacity.
    pub fn log(&mut self, entry: LogEntry) {
        if self.log_entries.len() >= LOG_CAP {
            self.log_entries.pop_front();
        }
        self.log_entries.push_back(entry);
    }

    fn send_dashboard(&self, command: DashboardCommand) {
        if self.dashboard_tx.send(command).is_err() {
            tracing::warn!(?command, "Dashboard worker is gone");
        }
    }

    // ── Navigation ──────────────────────────────────────────────────

    fn navigate(&mut self, route: Route) {
        tracing::debug!(from = %self.route, to = %route, "Navigate");
        if route == Route::Login {
            self.leave_protected();
            return;
        }

        if self.route == Route::Login {
            self.route = route;
            self.guard_task = Some(bridge::spawn_guard(&self.services, &self.tx));
            // Re-entering shows the requested tab from scratch.
            let tab = Tab::from_route(route).unwrap_or(Tab::Dashboard);
            self.active_tab = tab;
            self.on_enter_tab(tab);
        } else if let Some(tab) = Tab::from_route(route) {
            self.switch_tab(tab);
        }
    }

    fn leave_protected(&mut self) {
        if self.route == Route::Login {
            return;
        }
        if let Some(task) = self.guard_task.take() {
            task.abort();
        }
        self.send_dashboard(DashboardCommand::Unmount);
        self.route = Route::Login;
        self.login.form.password.clear();
        self.login.errors = ValidationErrors::new();
        self.cards.editor = None;
        self.rooms.editor = None;
        self.profile = ProfileView::default();
        self.activity.editing = None;
        self.show_help = false;
    }

    fn switch_tab(&mut self, tab: Tab) {
        if tab == self.active_tab {
            return;
        }
        if self.active_tab == Tab::Dashboard {
            self.send_dashboard(DashboardCommand::Unmount);
        }
        self.active_tab = tab;
        self.scroll_offset = 0;
        if let Some(route) = tab.route() {
            self.route = route;
        }
        self.on_enter_tab(tab);
    }

    fn on_enter_tab(&mut self, tab: Tab) {
        match tab {
            Tab::Dashboard => self.send_dashboard(DashboardCommand::Mount),
            Tab::Activity => self.reload(QueryKey::AccessLogs),
            Tab::Cards => self.reload(QueryKey::Cards),
            Tab::Rooms => self.reload(QueryKey::Rooms),
            Tab::Profile | Tab::Log => {}
        }
    }

    fn reload(&mut self, key: QueryKey) {
        if self.route == Route::Login {
            return;
        }
        match key {
            QueryKey::AccessLogs => {
                self.activity.loading = true;
                bridge::spawn_load_activity(&self.services, &self.tx);
            }
            QueryKey::Cards => {
                self.cards.loading = true;
                bridge::spawn_load_cards(&self.services, &self.tx);
            }
            QueryKey::Rooms => {
                self.rooms.loading = true;
                bridge::spawn_load_rooms(&self.services, &self.tx);
            }
            QueryKey::Classes | QueryKey::Users => {
                bridge::spawn_load_options(&self.services, &self.tx);
            }
        }
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Process an incoming [`AppEvent`], updating state accordingly.
    ///
    /// Returns `true` if the app should quit.
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Terminal(crossterm::event::Event::Key(key))
                if key.kind == KeyEventKind::Press =>
            {
                self.handle_key(key);
            }
            AppEvent::Tick => {
                if self
                    .toast
                    .as_ref()
                    .is_some_and(|(_, shown)| shown.elapsed() >= TOAST_TTL)
                {
                    self.toast = None;
                }
            }
            AppEvent::Session(session) => self.session = session,
            AppEvent::Dashboard(state) => {
                self.note_live_change(state.live);
                self.dashboard = state;
            }
            AppEvent::Notice(notice) => self.show_notice(notice),
            AppEvent::Redirect(route) => self.navigate(route),
            AppEvent::Invalidated(key) => self.reload(key),
            AppEvent::ActivityLoaded(rows) => {
                self.activity.loading = false;
                self.activity.filter.set_rows(rows);
                self.activity.scroll = 0;
            }
            AppEvent::OptionsLoaded(options) => {
                if let Some(options) = options {
                    self.activity.filter.set_options(options);
                }
            }
            AppEvent::CardsLoaded(cards) => {
                self.cards.loading = false;
                self.cards.items = cards;
                self.cards.selected = self.cards.selected.min(self.cards.items.len().saturating_sub(1));
            }
            AppEvent::RoomsLoaded(rooms) => {
                self.rooms.loading = false;
                self.rooms.items = rooms;
                self.rooms.selected = self.rooms.selected.min(self.rooms.items.len().saturating_sub(1));
            }
            AppEvent::LoadFailed(key) => {
                self.log(LogEntry::warn(format!("Could not load {key:?}")));
                match key {
                    QueryKey::AccessLogs => self.activity.loading = false,
                    QueryKey::Cards => self.cards.loading = false,
                    QueryKey::Rooms => self.rooms.loading = false,
                    QueryKey::Classes | QueryKey::Users => {}
                }
            }
            AppEvent::LoginFinished(outcome) => self.finish_login(outcome),
            AppEvent::CardSubmitted(outcome) => {
                if let Some(editor) = self.cards.editor.as_mut() {
                    editor.submitting = false;
                    match outcome {
                        SubmitOutcome::Saved => self.cards.editor = None,
                        SubmitOutcome::Invalid(errors) => editor.errors = errors,
                        SubmitOutcome::Failed => {}
                    }
                }
            }
            AppEvent::RoomSubmitted(outcome) => {
                if let Some(editor) = self.rooms.editor.as_mut() {
                    editor.submitting = false;
                    match outcome {
                        SubmitOutcome::Saved => self.rooms.editor = None,
                        SubmitOutcome::Invalid(errors) => editor.errors = errors,
                        SubmitOutcome::Failed => {}
                    }
                }
            }
            AppEvent::PasswordChanged(changed) => {
                self.profile.submitting = false;
                if changed {
                    self.profile = ProfileView::default();
                }
            }
            AppEvent::Quit => self.should_quit = true,
            AppEvent::Terminal(_) => {}
        }
        self.should_quit
    }

    fn show_notice(&mut self, notice: Notice) {
        if notice.level == NoticeLevel::Dismiss {
            if self
                .toast
                .as_ref()
                .is_some_and(|(shown, _)| shown.id.is_some() && shown.id == notice.id)
            {
                self.toast = None;
            }
            return;
        }
        if let Some(entry) = LogEntry::from_notice(&notice) {
            self.log(entry);
        }
        self.toast = Some((notice, Instant::now()));
    }

    fn note_live_change(&mut self, next: LiveStatus) {
        if next == self.dashboard.live {
            return;
        }
        match next {
            LiveStatus::Live => self.log(LogEntry::info("Live feed connected")),
            LiveStatus::Reconnecting { attempt } => {
                self.log(LogEntry::warn(format!("Live feed lost, reconnect attempt {attempt}")));
            }
            LiveStatus::Offline if self.dashboard.live == LiveStatus::Live => {
                self.log(LogEntry::warn("Live feed offline"));
            }
            LiveStatus::Offline | LiveStatus::Connecting => {}
        }
    }

    fn finish_login(&mut self, outcome: LoginOutcome) {
        self.login.submitting = false;
        match outcome {
            LoginOutcome::Invalid(errors) => self.login.errors = errors,
            LoginOutcome::Failed => {}
            LoginOutcome::Redirect(route) => {
                self.login.form.password.clear();
                self.login.errors = ValidationErrors::new();
                self.navigate(route);
            }
        }
    }

    /// Whether keys go to a text field rather than to the shortcuts.
    pub fn is_text_entry(&self) -> bool {
        self.route == Route::Login
            || self.cards.editor.is_some()
            || self.rooms.editor.is_some()
            || self.activity.editing.is_some()
            || self.profile.editing
    }

    fn handle_key(&mut self, key: KeyEvent) {
        // Global: Ctrl+C quits
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc) {
                self.show_help = false;
            }
            return;
        }

        if self.route == Route::Login {
            self.handle_login_key(key);
            return;
        }
        if self.is_text_entry() {
            self.handle_entry_key(key);
            return;
        }

        // Pending delete confirmation swallows the next key.
        if let Some(id) = self.cards.confirm_delete.take() {
            if key.code == KeyCode::Char('y') {
                bridge::spawn_delete_card(&self.services, id);
            }
            return;
        }
        if let Some(id) = self.rooms.confirm_delete.take() {
            if key.code == KeyCode::Char('y') {
                bridge::spawn_delete_room(&self.services, id);
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.show_help = true,

            // Tab switching by number
            KeyCode::Char(c @ '1'..='9') => {
                let idx = (c as usize) - ('1' as usize);
                if let Some(&tab) = Tab::all().get(idx) {
                    self.switch_tab(tab);
                }
            }

            // Tab switching by Tab/Shift+Tab
            KeyCode::Tab => self.switch_tab(self.active_tab.next()),
            KeyCode::BackTab => self.switch_tab(self.active_tab.prev()),

            _ => self.handle_tab_key(key),
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) {
        if self.login.submitting || self.session.is_loading {
            return;
        }
        if key.code == KeyCode::Esc {
            self.should_quit = true;
            return;
        }
        if self.login.handle_key(key) == EditorAction::Submit {
            self.login.submitting = true;
            self.login.errors = ValidationErrors::new();
            bridge::spawn_login(&self.services, &self.tx, self.login.form.clone());
        }
    }

    fn handle_entry_key(&mut self, key: KeyEvent) {
        if self.activity.editing.is_some() {
            self.activity.handle_edit_key(key);
        } else if let Some(editor) = self.cards.editor.as_mut() {
            if editor.submitting {
                return;
            }
            match editor.handle_key(key) {
                EditorAction::Submit => {
                    editor.submitting = true;
                    editor.errors = ValidationErrors::new();
                    let form = editor.form.clone();
                    bridge::spawn_submit_card(&self.services, &self.tx, form);
                }
                EditorAction::Cancel => self.cards.editor = None,
                EditorAction::None => {}
            }
        } else if let Some(editor) = self.rooms.editor.as_mut() {
            if editor.submitting {
                return;
            }
            match editor.handle_key(key) {
                EditorAction::Submit => {
                    editor.submitting = true;
                    editor.errors = ValidationErrors::new();
                    let form = editor.form.clone();
                    bridge::spawn_submit_room(&self.services, &self.tx, form);
                }
                EditorAction::Cancel => self.rooms.editor = None,
                EditorAction::None => {}
            }
        } else if self.profile.editing {
            if self.profile.submitting {
                return;
            }
            match self.profile.handle_key(key) {
                EditorAction::Submit => {
                    self.profile.submitting = true;
                    bridge::spawn_change_password(&self.services, &self.tx, self.profile.form.clone());
                }
                EditorAction::Cancel => self.profile = ProfileView::default(),
                EditorAction::None => {}
            }
        }
    }

    fn handle_tab_key(&mut self, key: KeyEvent) {
        match self.active_tab {
            Tab::Dashboard => match key.code {
                KeyCode::Char('m') => self.send_dashboard(DashboardCommand::ToggleMode),
                KeyCode::Char('r') => self.send_dashboard(DashboardCommand::Refresh),
                _ => {}
            },
            Tab::Activity => match key.code {
                KeyCode::Char('r') => self.reload(QueryKey::AccessLogs),
                _ => self.activity.handle_key(key),
            },
            Tab::Cards => self.handle_cards_key(key),
            Tab::Rooms => self.handle_rooms_key(key),
            Tab::Profile => match key.code {
                KeyCode::Char('p') => {
                    self.profile = ProfileView {
                        editing: true,
                        ..ProfileView::default()
                    };
                }
                KeyCode::Char('o') => {
                    // Stop the guard first so the emptied session is not
                    // treated as a lost one.
                    self.navigate(Route::Login);
                    self.services.session.logout();
                }
                _ => {}
            },
            Tab::Log => match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    self.log_auto_scroll = false;
                    self.scroll_offset = self.scroll_offset.saturating_sub(1);
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.log_auto_scroll = false;
                    self.scroll_offset = self.scroll_offset.saturating_add(1);
                }
                KeyCode::End | KeyCode::Char('G') => self.log_auto_scroll = true,
                _ => {}
            },
        }
    }

    fn handle_cards_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.cards.selected = self.cards.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let max = self.cards.items.len().saturating_sub(1);
                self.cards.selected = (self.cards.selected + 1).min(max);
            }
            KeyCode::Char('n') => {
                self.cards.editor = Some(CardEditor::create());
                self.ensure_owner_options();
            }
            KeyCode::Char('e') | KeyCode::Enter => {
                if let Some(card) = self.cards.selected_card() {
                    self.cards.editor = Some(CardEditor::edit(card));
                    self.ensure_owner_options();
                }
            }
            KeyCode::Char('d') => {
                self.cards.confirm_delete = self.cards.selected_card().map(|c| c.id);
            }
            KeyCode::Char('r') => self.reload(QueryKey::Cards),
            _ => {}
        }
    }

    fn handle_rooms_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.rooms.selected = self.rooms.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let max = self.rooms.items.len().saturating_sub(1);
                self.rooms.selected = (self.rooms.selected + 1).min(max);
            }
            KeyCode::Char('n') => self.rooms.editor = Some(RoomEditor::default()),
            KeyCode::Char('e') | KeyCode::Enter => {
                if let Some(room) = self.rooms.selected_room() {
                    self.rooms.editor = Some(RoomEditor::edit(room));
                }
            }
            KeyCode::Char('d') => {
                self.rooms.confirm_delete = self.rooms.selected_room().map(|r| r.id);
            }
            KeyCode::Char('r') => self.reload(QueryKey::Rooms),
            _ => {}
        }
    }

    /// The card owner picker shows names from the option lists.
    fn ensure_owner_options(&mut self) {
        let options = self.activity.filter.options();
        if options.users.is_empty() && options.kelas.is_empty() {
            self.reload(QueryKey::Users);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;
    use lab_access_client::activity::FilterOptions;
    use lab_access_client::api::directory::{ClassInfo, UserAccount};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn type_text(editor: &mut CardEditor, text: &str) {
        for c in text.chars() {
            editor.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_tab_cycle_and_routes() {
        assert_eq!(Tab::Dashboard.next(), Tab::Activity);
        assert_eq!(Tab::Dashboard.prev(), Tab::Log);
        assert_eq!(Tab::from_route(Route::Cards), Some(Tab::Cards));
        assert_eq!(Tab::from_route(Route::Classes), None);
        assert_eq!(Tab::Log.route(), None);
    }

    #[test]
    fn test_edit_text_ignores_control_chords() {
        let mut value = String::from("ab");
        assert!(edit_text(&mut value, key(KeyCode::Char('c'))));
        assert!(edit_text(&mut value, key(KeyCode::Backspace)));
        let ctrl = KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            ..key(KeyCode::Char('u'))
        };
        assert!(!edit_text(&mut value, ctrl));
        assert_eq!(value, "ab");
    }

    #[test]
    fn test_login_view_focus_and_submit() {
        let mut view = LoginView::default();
        for c in "admin".chars() {
            view.handle_key(key(KeyCode::Char(c)));
        }
        view.handle_key(key(KeyCode::Tab));
        for c in "rahasia".chars() {
            view.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(view.form, LoginForm::new("admin", "rahasia"));
        assert_eq!(view.handle_key(key(KeyCode::Enter)), EditorAction::Submit);
    }

    #[test]
    fn test_card_editor_owner_toggle_carries_id() {
        let mut editor = CardEditor::create();
        type_text(&mut editor, "04A1");
        editor.field = CardField::OwnerId;
        type_text(&mut editor, "7");
        assert_eq!(editor.form.user_id, "7");

        editor.field = CardField::Owner;
        editor.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(editor.owner, OwnerKind::Class);
        assert_eq!(editor.form.kelas_id, "7");
        assert!(editor.form.user_id.is_empty());
        assert_eq!(editor.form.validate().unwrap().kelas_id, 7);
    }

    #[test]
    fn test_card_editor_status_cycles() {
        let mut editor = CardEditor::create();
        let initial = editor.form.status.clone();
        editor.field = CardField::Status;
        editor.handle_key(key(KeyCode::Right));
        assert_ne!(editor.form.status, initial);
        editor.handle_key(key(KeyCode::Right));
        assert_eq!(editor.form.status, initial);
    }

    #[test]
    fn test_card_editor_keys() {
        let mut editor = CardEditor::create();
        type_text(&mut editor, "04A1");
        assert_eq!(editor.form.uid, "04A1");
        assert_eq!(editor.handle_key(key(KeyCode::Down)), EditorAction::None);
        assert_eq!(editor.field, CardField::Status);
        assert_eq!(editor.handle_key(key(KeyCode::Esc)), EditorAction::Cancel);
    }

    #[test]
    fn test_activity_selector_cycles_through_options() {
        let mut view = ActivityView::default();
        view.filter.set_options(FilterOptions {
            labs: Vec::new(),
            kelas: vec![
                ClassInfo {
                    id: 3,
                    nama: "XI RPL 1".into(),
                },
                ClassInfo {
                    id: 4,
                    nama: "XI RPL 2".into(),
                },
            ],
            users: vec![UserAccount {
                id: 9,
                username: "budi".into(),
                role: "SISWA".into(),
            }],
        });

        view.field = 1;
        assert_eq!(view.selected_field(), FilterField::Kelas);
        view.handle_key(key(KeyCode::Right));
        assert_eq!(view.filter.criteria().kelas, "3");
        view.handle_key(key(KeyCode::Right));
        assert_eq!(view.filter.criteria().kelas, "4");
        view.handle_key(key(KeyCode::Right));
        assert_eq!(view.filter.criteria().kelas, "");
        view.handle_key(key(KeyCode::Left));
        assert_eq!(view.filter.criteria().kelas, "4");

        view.handle_key(key(KeyCode::Char('x')));
        assert!(view.filter.criteria().is_empty());
    }

    #[test]
    fn test_activity_date_entry_commits_on_enter() {
        let mut view = ActivityView {
            field: 4,
            ..ActivityView::default()
        };
        assert_eq!(view.selected_field(), FilterField::StartDate);
        view.handle_key(key(KeyCode::Enter));
        assert_eq!(view.editing.as_deref(), Some(""));
        for c in "2024-05-01".chars() {
            view.handle_edit_key(key(KeyCode::Char(c)));
        }
        view.handle_edit_key(key(KeyCode::Enter));
        assert!(view.editing.is_none());
        assert_eq!(view.filter.criteria().start_date, "2024-05-01");

        // Esc abandons the typed text.
        view.handle_key(key(KeyCode::Enter));
        view.handle_edit_key(key(KeyCode::Backspace));
        view.handle_edit_key(key(KeyCode::Esc));
        assert_eq!(view.filter.criteria().start_date, "2024-05-01");
    }

    #[test]
    fn test_profile_fields_cycle() {
        let mut view = ProfileView::default();
        view.handle_key(key(KeyCode::Char('a')));
        view.handle_key(key(KeyCode::Tab));
        view.handle_key(key(KeyCode::Char('b')));
        view.handle_key(key(KeyCode::BackTab));
        view.handle_key(key(KeyCode::BackTab));
        view.handle_key(key(KeyCode::Char('c')));
        assert_eq!(view.form.old_password, "a");
        assert_eq!(view.form.new_password, "b");
        assert_eq!(view.form.confirm_password, "c");
    }
}
