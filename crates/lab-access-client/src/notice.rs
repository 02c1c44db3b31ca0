//! Transient user-facing notices ("toasts").
//!
//! Operations that the UI surfaces as short messages publish a [`Notice`]
//! on a [`Notifier`]. Loading notices carry an id so that a later success
//! or [`Notice::dismiss`] can replace them.

use tokio::sync::broadcast;

/// Default broadcast capacity for notice channels.
pub const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// User-visible notice texts.
pub mod messages {
    pub const LOGIN_SUCCESS: &str = "Login berhasil!";
    pub const LOGIN_FAILED: &str = "Terjadi kesalahan saat login!";
    pub const LOGOUT_NOTICE_ID: &str = "logout";
    pub const LOGOUT_PENDING: &str = "Melakukan logout...";
    pub const LOGOUT_SUCCESS: &str = "Logout berhasil!";
    pub const LOGIN_REQUIRED: &str = "Anda harus login terlebih dahulu!";
    pub const WELCOME_BACK: &str = "Selamat datang kembali!";

    pub const CHART_LOAD_FAILED: &str = "Terjadi kesalahan saat load chart!";
    pub const STATS_LOAD_FAILED: &str = "Gagal memuat statistik dashboard!";

    pub const CARD_CREATED: &str = "Berhasil membuat data kartu!";
    pub const CARD_UPDATED: &str = "Berhasil mengupdate data kartu!";
    pub const CARD_DELETED: &str = "Berhasil menghapus data kartu!";
    pub const ROOM_CREATED: &str = "Berhasil membuat data ruangan!";
    pub const ROOM_UPDATED: &str = "Berhasil mengupdate data ruangan!";
    pub const ROOM_DELETED: &str = "Berhasil menghapus data ruangan!";
    pub const GENERIC_FAILURE: &str = "Terjadi kesalahan!";

    pub const PASSWORD_MISMATCH: &str = "Password tidak cocok";
    pub const PASSWORD_TOO_SHORT: &str = "Password minimal 6 karakter";
    pub const PASSWORD_CHANGE_FAILED: &str = "Gagal mengubah password";
    pub const PASSWORD_CHANGED: &str = "Password berhasil diubah!";
}

/// Severity / kind of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
    Loading,
    /// Removes the notice with the same id.
    Dismiss,
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub id: Option<&'static str>,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            id: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            id: None,
            message: message.into(),
        }
    }

    pub fn loading(id: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Loading,
            id: Some(id),
            message: message.into(),
        }
    }

    pub fn dismiss(id: &'static str) -> Self {
        Self {
            level: NoticeLevel::Dismiss,
            id: Some(id),
            message: String::new(),
        }
    }
}

/// Broadcasts notices to any number of subscribers.
///
/// Emitting with no subscribers is not an error; the notice is only logged.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn emit(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::warn!(message = %notice.message, "Notice"),
            NoticeLevel::Dismiss => tracing::trace!(id = ?notice.id, "Notice dismissed"),
            _ => tracing::debug!(level = ?notice.level, message = %notice.message, "Notice"),
        }
        let _ = self.tx.send(notice);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(Notice::success(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Notice::error(message));
    }
}
