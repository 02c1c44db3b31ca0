//! Card and room mutations with notices and list invalidation.
//!
//! A successful mutation invalidates the matching [`QueryKey`] so open list
//! views refetch. Failures become error notices carrying the server message
//! (or "Terjadi kesalahan!"). A `401` is also passed to the unauthorized
//! hook so the session can be reset; nothing else leaves the mutation.

use std::fmt;

use tokio::sync::broadcast;

use crate::api::cards::CardApi;
use crate::api::rooms::RoomApi;
use crate::error::{LabError, UnauthorizedHook};
use crate::forms::{CardForm, RoomForm, ValidationErrors};
use crate::notice::{Notifier, messages};

const QUERY_CHANNEL_CAPACITY: usize = 32;

/// Cached list queries that mutations can invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Cards,
    Rooms,
    Classes,
    Users,
    AccessLogs,
}

/// Invalidation broadcast for list views.
#[derive(Debug, Clone)]
pub struct QueryCache {
    tx: broadcast::Sender<QueryKey>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(QUERY_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.tx.subscribe()
    }

    /// Mark `key` stale. No-op when nobody is listening.
    pub fn invalidate(&self, key: QueryKey) {
        tracing::debug!(?key, "Invalidating query");
        let _ = self.tx.send(key);
    }
}

/// Result of submitting a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Client-side validation failed; nothing was sent.
    Invalid(ValidationErrors),
    Saved,
    /// The request failed; an error notice was emitted.
    Failed,
}

impl SubmitOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SubmitOutcome::Saved)
    }
}

/// Card and room mutations against `api`.
#[derive(Clone)]
pub struct Mutations<A> {
    api: A,
    notifier: Notifier,
    cache: QueryCache,
    on_unauthorized: Option<UnauthorizedHook>,
}

impl<A: fmt::Debug> fmt::Debug for Mutations<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutations")
            .field("api", &self.api)
            .field("notifier", &self.notifier)
            .field("cache", &self.cache)
            .field("on_unauthorized", &self.on_unauthorized.is_some())
            .finish()
    }
}

impl<A> Mutations<A>
where
    A: CardApi + RoomApi,
{
    pub fn new(api: A, notifier: Notifier, cache: QueryCache) -> Self {
        Self {
            api,
            notifier,
            cache,
            on_unauthorized: None,
        }
    }

    /// Install a handler for `401` responses.
    #[must_use]
    pub fn with_unauthorized_hook(mut self, hook: UnauthorizedHook) -> Self {
        self.on_unauthorized = Some(hook);
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn fail(&self, action: &'static str, err: &LabError) {
        tracing::warn!(action, error = %err, "Mutation failed");
        self.notifier
            .error(err.user_message(messages::GENERIC_FAILURE));
        if err.is_unauthorized() {
            if let Some(hook) = &self.on_unauthorized {
                hook(err);
            }
        }
    }

    /// Create or update a card depending on the form's edit mode.
    pub async fn submit_card(&self, form: &CardForm) -> SubmitOutcome {
        let payload = match form.validate() {
            Ok(payload) => payload,
            Err(errors) => return SubmitOutcome::Invalid(errors),
        };

        let (result, success) = match form.editing {
            Some(id) => (
                self.api.update_card(id, &payload).await,
                messages::CARD_UPDATED,
            ),
            None => (self.api.create_card(&payload).await, messages::CARD_CREATED),
        };

        match result {
            Ok(()) => {
                tracing::info!(uid = %payload.uid, edit = form.is_edit(), "Card saved");
                self.cache.invalidate(QueryKey::Cards);
                self.notifier.success(success);
                SubmitOutcome::Saved
            }
            Err(e) => {
                self.fail("save card", &e);
                SubmitOutcome::Failed
            }
        }
    }

    pub async fn delete_card(&self, id: i64) -> bool {
        match self.api.delete_card(id).await {
            Ok(()) => {
                tracing::info!(id, "Card deleted");
                self.cache.invalidate(QueryKey::Cards);
                self.notifier.success(messages::CARD_DELETED);
                true
            }
            Err(e) => {
                self.fail("delete card", &e);
                false
            }
        }
    }

    /// Create or update a room depending on the form's edit mode.
    pub async fn submit_room(&self, form: &RoomForm) -> SubmitOutcome {
        let payload = match form.validate() {
            Ok(payload) => payload,
            Err(errors) => return SubmitOutcome::Invalid(errors),
        };

        let (result, success) = match form.editing {
            Some(id) => (
                self.api.update_room(id, &payload).await,
                messages::ROOM_UPDATED,
            ),
            None => (self.api.create_room(&payload).await, messages::ROOM_CREATED),
        };

        match result {
            Ok(()) => {
                tracing::info!(nama = %payload.nama, edit = form.is_edit(), "Room saved");
                self.cache.invalidate(QueryKey::Rooms);
                self.notifier.success(success);
                SubmitOutcome::Saved
            }
            Err(e) => {
                self.fail("save room", &e);
                SubmitOutcome::Failed
            }
        }
    }

    pub async fn delete_room(&self, id: i64) -> bool {
        match self.api.delete_room(id).await {
            Ok(()) => {
                tracing::info!(id, "Room deleted");
                self.cache.invalidate(QueryKey::Rooms);
                self.notifier.success(messages::ROOM_DELETED);
                true
            }
            Err(e) => {
                self.fail("delete room", &e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::cards::{Card, CardPayload};
    use crate::api::rooms::{Room, RoomPayload};
    use crate::error::LabResult;
    use crate::notice::NoticeLevel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeBackend {
        fail_with: Option<String>,
        fail_status: Option<u16>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn record(&self, call: String) -> LabResult<()> {
            self.calls.lock().unwrap().push(call);
            match &self.fail_with {
                Some(message) => Err(LabError::from_status(
                    self.fail_status.unwrap_or(400),
                    Some(message.clone()),
                )),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl CardApi for FakeBackend {
        async fn list_cards(&self) -> LabResult<Vec<Card>> {
            Ok(Vec::new())
        }
        async fn get_card(&self, _id: i64) -> LabResult<Card> {
            Err(LabError::from_status(404, None))
        }
        async fn create_card(&self, payload: &CardPayload) -> LabResult<()> {
            self.record(format!("create card {} {} {}", payload.uid, payload.user_id, payload.kelas_id))
        }
        async fn update_card(&self, id: i64, payload: &CardPayload) -> LabResult<()> {
            self.record(format!("update card {id} {}", payload.uid))
        }
        async fn delete_card(&self, id: i64) -> LabResult<()> {
            self.record(format!("delete card {id}"))
        }
        async fn check_card(&self, _uid: &str) -> LabResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    #[async_trait]
    impl RoomApi for FakeBackend {
        async fn list_rooms(&self) -> LabResult<Vec<Room>> {
            Ok(Vec::new())
        }
        async fn get_room(&self, _id: i64) -> LabResult<Room> {
            Err(LabError::from_status(404, None))
        }
        async fn create_room(&self, payload: &RoomPayload) -> LabResult<()> {
            self.record(format!("create room {}", payload.nama))
        }
        async fn update_room(&self, id: i64, payload: &RoomPayload) -> LabResult<()> {
            self.record(format!("update room {id} {}", payload.nama))
        }
        async fn delete_room(&self, id: i64) -> LabResult<()> {
            self.record(format!("delete room {id}"))
        }
    }

    fn mutations(backend: FakeBackend) -> (Mutations<FakeBackend>, Notifier) {
        let notifier = Notifier::new();
        (
            Mutations::new(backend, notifier.clone(), QueryCache::new()),
            notifier,
        )
    }

    #[tokio::test]
    async fn test_create_card_invalidates_cards() {
        let (mutations, notifier) = mutations(FakeBackend::default());
        let mut notices = notifier.subscribe();
        let mut invalidated = mutations.cache().subscribe();

        let mut form = CardForm {
            uid: "04A1B2".into(),
            ..CardForm::default()
        };
        form.select_owner(crate::forms::OwnerKind::User, 7);

        assert_eq!(mutations.submit_card(&form).await, SubmitOutcome::Saved);
        assert_eq!(
            mutations.api.calls.lock().unwrap().as_slice(),
            ["create card 04A1B2 7 0"]
        );
        assert_eq!(invalidated.try_recv().unwrap(), QueryKey::Cards);
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.message, messages::CARD_CREATED);
    }

    #[tokio::test]
    async fn test_edit_mode_updates() {
        let (mutations, notifier) = mutations(FakeBackend::default());
        let mut notices = notifier.subscribe();
        let form = CardForm {
            editing: Some(3),
            uid: "X".into(),
            kelas_id: "2".into(),
            ..CardForm::default()
        };

        assert!(mutations.submit_card(&form).await.is_saved());
        assert_eq!(mutations.api.calls.lock().unwrap()[0], "update card 3 X");
        assert_eq!(notices.try_recv().unwrap().message, messages::CARD_UPDATED);
    }

    #[tokio::test]
    async fn test_invalid_form_sends_nothing() {
        let (mutations, _) = mutations(FakeBackend::default());
        let outcome = mutations.submit_card(&CardForm::default()).await;
        assert!(matches!(outcome, SubmitOutcome::Invalid(_)));
        assert!(mutations.api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_shows_server_message() {
        let (mutations, notifier) = mutations(FakeBackend {
            fail_with: Some("UID sudah terdaftar".into()),
            ..FakeBackend::default()
        });
        let mut notices = notifier.subscribe();
        let mut invalidated = mutations.cache().subscribe();
        let form = CardForm {
            uid: "X".into(),
            user_id: "1".into(),
            ..CardForm::default()
        };

        assert_eq!(mutations.submit_card(&form).await, SubmitOutcome::Failed);
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "UID sudah terdaftar");
        assert!(invalidated.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_without_message_uses_fallback() {
        let (mutations, notifier) = mutations(FakeBackend {
            fail_with: Some(String::new()),
            ..FakeBackend::default()
        });
        let mut notices = notifier.subscribe();
        assert!(!mutations.delete_card(1).await);
        assert_eq!(notices.try_recv().unwrap().message, messages::GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn test_unauthorized_failure_calls_hook() {
        let seen = Arc::new(AtomicUsize::new(0));
        let (mutations, notifier) = mutations(FakeBackend {
            fail_with: Some(String::new()),
            fail_status: Some(401),
            ..FakeBackend::default()
        });
        let mutations = mutations.with_unauthorized_hook({
            let seen = Arc::clone(&seen);
            Arc::new(move |err: &LabError| {
                assert!(err.is_unauthorized());
                seen.fetch_add(1, Ordering::SeqCst);
            })
        });
        let mut notices = notifier.subscribe();
        let form = CardForm {
            uid: "X".into(),
            user_id: "1".into(),
            ..CardForm::default()
        };

        assert_eq!(mutations.submit_card(&form).await, SubmitOutcome::Failed);
        assert!(!mutations.delete_room(2).await);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_other_failures_skip_hook() {
        let seen = Arc::new(AtomicUsize::new(0));
        let (mutations, _) = mutations(FakeBackend {
            fail_with: Some("Ruangan dipakai".into()),
            ..FakeBackend::default()
        });
        let mutations = mutations.with_unauthorized_hook({
            let seen = Arc::clone(&seen);
            Arc::new(move |_: &LabError| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        });

        assert!(!mutations.delete_room(2).await);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_room_mutations() {
        let (mutations, notifier) = mutations(FakeBackend::default());
        let mut notices = notifier.subscribe();
        let mut invalidated = mutations.cache().subscribe();

        let outcome = mutations
            .submit_room(&RoomForm {
                editing: None,
                nama: "  Lab RPL ".into(),
            })
            .await;
        assert!(outcome.is_saved());
        assert!(mutations.delete_room(4).await);

        assert_eq!(
            mutations.api.calls.lock().unwrap().as_slice(),
            ["create room Lab RPL", "delete room 4"]
        );
        assert_eq!(invalidated.try_recv().unwrap(), QueryKey::Rooms);
        assert_eq!(notices.try_recv().unwrap().message, messages::ROOM_CREATED);
        assert_eq!(notices.try_recv().unwrap().message, messages::ROOM_DELETED);
    }
}
