//! # Form Validation
//!
//! Client-side validation for the console forms. Each form holds raw text
//! field values and `validate()` turns them into a request payload or a set
//! of per-field messages, before anything is sent to the backend.

use crate::api::auth::{ChangePasswordRequest, LoginRequest};
use crate::api::cards::{Card, CardPayload, CardStatus};
use crate::api::rooms::{Room, RoomPayload};
use crate::error::LabError;
use crate::notice::messages;

/// Minimum accepted length of a new password.
pub const MIN_PASSWORD_LEN: usize = 6;

const OWNER_REQUIRED_USER: &str =
    "Wajib memilih salah satu antara Pemilik (User ID) atau Kelas, tidak boleh keduanya.";
const OWNER_REQUIRED_CLASS: &str =
    "Wajib memilih salah satu antara Pemilik atau Kelas, tidak boleh keduanya.";

/// Field-level validation messages, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<(&'static str, String)>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push((field, message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// First message attached to `field`.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, m)| m.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.errors.iter().map(|(f, m)| (*f, m.as_str()))
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.errors.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationErrors> for LabError {
    fn from(errors: ValidationErrors) -> Self {
        match errors.errors.into_iter().next() {
            Some((field, message)) => LabError::Validation {
                field: field.to_string(),
                message,
            },
            None => LabError::Validation {
                field: String::new(),
                message: String::new(),
            },
        }
    }
}

// ─── Login ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// # Errors
    /// Empty username or password.
    pub fn validate(&self) -> Result<LoginRequest, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.username.is_empty() {
            errors.add("username", "Username harus diisi.");
        }
        if self.password.is_empty() {
            errors.add("password", "Password harus diisi.");
        }
        errors.into_result(|| LoginRequest::new(&self.username, &self.password))
    }
}

// ─── Card ───────────────────────────────────────────────────────────────

/// Who a card belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    User,
    Class,
}

/// Create / edit form for an access card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardForm {
    /// Id of the card being edited; `None` in create mode.
    pub editing: Option<i64>,
    pub uid: String,
    pub status: String,
    pub keterangan: String,
    pub user_id: String,
    pub kelas_id: String,
}

impl Default for CardForm {
    fn default() -> Self {
        Self {
            editing: None,
            uid: String::new(),
            status: CardStatus::default().as_str().to_string(),
            keterangan: String::new(),
            user_id: String::new(),
            kelas_id: String::new(),
        }
    }
}

impl CardForm {
    /// Edit form prefilled from `card`. A card with a user owner keeps only
    /// the user id; otherwise only the class id is kept.
    pub fn edit(card: &Card) -> Self {
        let owner = card.user_id.filter(|id| *id != 0);
        Self {
            editing: Some(card.id),
            uid: card.uid.clone(),
            status: if card.status.is_empty() {
                CardStatus::default().as_str().to_string()
            } else {
                card.status.clone()
            },
            keterangan: card.keterangan.clone().unwrap_or_default(),
            user_id: owner.map(|id| id.to_string()).unwrap_or_default(),
            kelas_id: if owner.is_none() {
                card.kelas_id
                    .filter(|id| *id != 0)
                    .map(|id| id.to_string())
                    .unwrap_or_default()
            } else {
                String::new()
            },
        }
    }

    pub fn is_edit(&self) -> bool {
        self.editing.is_some()
    }

    pub fn owner_kind(&self) -> OwnerKind {
        if self.kelas_id.is_empty() {
            OwnerKind::User
        } else {
            OwnerKind::Class
        }
    }

    /// Select an owner, clearing the other owner field.
    pub fn select_owner(&mut self, kind: OwnerKind, id: i64) {
        match kind {
            OwnerKind::User => {
                self.user_id = id.to_string();
                self.kelas_id.clear();
            }
            OwnerKind::Class => {
                self.kelas_id = id.to_string();
                self.user_id.clear();
            }
        }
    }

    /// # Errors
    /// Missing uid or status, an unknown status, a non-numeric owner id, or
    /// anything other than exactly one owner.
    pub fn validate(&self) -> Result<CardPayload, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.uid.is_empty() {
            errors.add("uid", "UID harus diisi.");
        }
        if self.status.is_empty() {
            errors.add("status", "Status harus diisi.");
        } else if CardStatus::parse(&self.status).is_none() {
            errors.add("status", "Status tidak valid.");
        }

        let has_user = !self.user_id.is_empty();
        let has_class = !self.kelas_id.is_empty();
        if has_user == has_class {
            errors.add("userId", OWNER_REQUIRED_USER);
            errors.add("kelasId", OWNER_REQUIRED_CLASS);
        }

        let user_id = parse_id(&self.user_id, "userId", &mut errors);
        let kelas_id = parse_id(&self.kelas_id, "kelasId", &mut errors);

        errors.into_result(|| CardPayload {
            uid: self.uid.clone(),
            status: self.status.clone(),
            keterangan: self.keterangan.clone(),
            user_id,
            kelas_id,
        })
    }
}

/// Empty ids submit as `0`.
fn parse_id(value: &str, field: &'static str, errors: &mut ValidationErrors) -> i64 {
    if value.is_empty() {
        return 0;
    }
    value.trim().parse().unwrap_or_else(|_| {
        errors.add(field, "ID tidak valid.");
        0
    })
}

// ─── Room ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomForm {
    pub editing: Option<i64>,
    pub nama: String,
}

impl RoomForm {
    pub fn edit(room: &Room) -> Self {
        Self {
            editing: Some(room.id),
            nama: room.nama.clone(),
        }
    }

    pub fn is_edit(&self) -> bool {
        self.editing.is_some()
    }

    /// # Errors
    /// Blank name.
    pub fn validate(&self) -> Result<RoomPayload, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.nama.trim().is_empty() {
            errors.add("nama", "Nama ruangan harus diisi.");
        }
        errors.into_result(|| RoomPayload {
            nama: self.nama.trim().to_string(),
        })
    }
}

// ─── Change password ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ChangePasswordForm {
    /// Mismatch is checked before length; only the first failure is
    /// reported.
    ///
    /// # Errors
    /// Confirmation differs from the new password, or the new password is
    /// shorter than [`MIN_PASSWORD_LEN`].
    pub fn validate(&self) -> Result<ChangePasswordRequest, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.new_password != self.confirm_password {
            errors.add("confirmPassword", messages::PASSWORD_MISMATCH);
        } else if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            errors.add("newPassword", messages::PASSWORD_TOO_SHORT);
        }
        errors.into_result(|| ChangePasswordRequest {
            old_password: self.old_password.clone(),
            new_password: self.new_password.clone(),
            confirm_password: self.confirm_password.clone(),
        })
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_requires_both_fields() {
        let errors = LoginForm::default().validate().unwrap_err();
        assert_eq!(errors.get("username"), Some("Username harus diisi."));
        assert_eq!(errors.get("password"), Some("Password harus diisi."));

        let request = LoginForm::new("admin", "x").validate().unwrap();
        assert_eq!(request.username, "admin");
    }

    #[test]
    fn test_card_defaults_to_aktif() {
        assert_eq!(CardForm::default().status, "AKTIF");
    }

    #[test]
    fn test_card_owner_exclusive() {
        let mut form = CardForm {
            uid: "04AB".into(),
            ..CardForm::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("userId"), Some(OWNER_REQUIRED_USER));
        assert_eq!(errors.get("kelasId"), Some(OWNER_REQUIRED_CLASS));

        form.user_id = "3".into();
        form.kelas_id = "5".into();
        assert_eq!(form.validate().unwrap_err().len(), 2);

        form.kelas_id.clear();
        let payload = form.validate().unwrap();
        assert_eq!(payload.user_id, 3);
        assert_eq!(payload.kelas_id, 0);
    }

    #[test]
    fn test_card_required_fields() {
        let form = CardForm {
            status: String::new(),
            kelas_id: "1".into(),
            ..CardForm::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("uid"), Some("UID harus diisi."));
        assert_eq!(errors.get("status"), Some("Status harus diisi."));
        assert_eq!(errors.get("kelasId"), None);
    }

    #[test]
    fn test_card_rejects_non_numeric_owner() {
        let form = CardForm {
            uid: "A".into(),
            user_id: "abc".into(),
            ..CardForm::default()
        };
        assert_eq!(form.validate().unwrap_err().get("userId"), Some("ID tidak valid."));
    }

    #[test]
    fn test_card_edit_prefill_prefers_user() {
        let card = Card {
            id: 9,
            uid: "X1".into(),
            status: "NONAKTIF".into(),
            keterangan: None,
            user_id: Some(4),
            kelas_id: Some(2),
            user_username: None,
            kelas_nama: None,
        };
        let form = CardForm::edit(&card);
        assert_eq!(form.editing, Some(9));
        assert_eq!(form.user_id, "4");
        assert_eq!(form.kelas_id, "");
        assert_eq!(form.owner_kind(), OwnerKind::User);

        let mut form = form;
        form.select_owner(OwnerKind::Class, 2);
        assert_eq!(form.user_id, "");
        assert_eq!(form.kelas_id, "2");
    }

    #[test]
    fn test_room_name_required() {
        assert_eq!(
            RoomForm::default().validate().unwrap_err().get("nama"),
            Some("Nama ruangan harus diisi.")
        );
        let payload = RoomForm {
            editing: None,
            nama: " Lab RPL ".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(payload.nama, "Lab RPL");
    }

    #[test]
    fn test_change_password_rules() {
        let mut form = ChangePasswordForm {
            old_password: "lama".into(),
            new_password: "abc".into(),
            confirm_password: "abcd".into(),
        };
        assert_eq!(
            form.validate().unwrap_err().get("confirmPassword"),
            Some("Password tidak cocok")
        );

        form.confirm_password = "abc".into();
        assert_eq!(
            form.validate().unwrap_err().get("newPassword"),
            Some("Password minimal 6 karakter")
        );

        form.new_password = "abcdef".into();
        form.confirm_password = "abcdef".into();
        assert!(form.validate().is_ok());

        form.clear();
        assert_eq!(form, ChangePasswordForm::default());
    }

    #[test]
    fn test_validation_errors_into_lab_error() {
        let errors = LoginForm::default().validate().unwrap_err();
        let err: LabError = errors.into();
        assert_eq!(err.to_string(), "username: Username harus diisi.");
    }
}
