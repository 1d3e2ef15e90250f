//! The canonical ordered session collection and its selection.
//!
//! Every mutating operation mirrors the (restricted-filtered) collection to
//! the storage port before returning. Mutations aimed at a session or
//! message that no longer exists are silent no-ops: a generation request in
//! flight must tolerate its target being deleted between awaits.

use crate::storage::SnapshotStorage;
use shared::chat::{ChatSession, Message, MessagePatch};

pub struct SessionStore {
    sessions: Vec<ChatSession>,
    current: Option<String>,
    storage: Box<dyn SnapshotStorage>,
}

impl SessionStore {
    /// An empty store; call [`SessionStore::hydrate`] to pull the persisted
    /// collection in.
    pub fn new(storage: Box<dyn SnapshotStorage>) -> Self {
        Self {
            sessions: Vec::new(),
            current: None,
            storage,
        }
    }

    /// Load the persisted collection, dropping restricted-titled entries,
    /// and select the most recent session if nothing is selected yet.
    /// A broken snapshot logs and leaves the store empty.
    pub fn hydrate(&mut self) {
        match self.storage.load() {
            Ok(sessions) => {
                self.sessions = sessions.into_iter().filter(|s| !s.is_restricted()).collect();
            }
            Err(e) => {
                tracing::warn!("failed to load session snapshot: {e:#}");
                self.sessions = Vec::new();
            }
        }
        if self.current.is_none() {
            self.current = self.sessions.first().map(|s| s.id.clone());
        }
    }

    /// Create a session at the front of the list (most-recent-first), make
    /// it current, and return its id.
    pub fn create_session(&mut self, restricted: bool) -> String {
        let session = ChatSession::new(restricted);
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.current = Some(id.clone());
        self.persist();
        id
    }

    /// Append a user message and its response placeholder, in order, as one
    /// atomic pair. No-op if the session vanished.
    pub fn append_message_pair(&mut self, session_id: &str, user: Message, placeholder: Message) {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
            return;
        };
        session.push_pair(user, placeholder);
        self.persist();
    }

    /// Merge `patch` into the message, leaving unset fields untouched.
    /// No-op if the session or message vanished.
    pub fn update_message(&mut self, session_id: &str, message_id: &str, patch: MessagePatch) {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
            return;
        };
        let Some(message) = session.message_mut(message_id) else {
            return;
        };
        patch.apply(message);
        self.persist();
    }

    /// Overwrite the title (one-time post-first-exchange summarization).
    pub fn rename_session(&mut self, session_id: &str, title: &str) {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == session_id) else {
            return;
        };
        session.title = title.to_string();
        self.persist();
    }

    /// Remove the session. If it was current, the selection is cleared —
    /// no fallback to another session.
    pub fn delete_session(&mut self, session_id: &str) {
        self.sessions.retain(|s| s.id != session_id);
        if self.current.as_deref() == Some(session_id) {
            self.current = None;
        }
        self.persist();
    }

    /// Select a session by id; ids that do not exist are ignored so the
    /// selection can never dangle.
    pub fn select_session(&mut self, session_id: &str) {
        if self.sessions.iter().any(|s| s.id == session_id) {
            self.current = Some(session_id.to_string());
        }
    }

    pub fn current(&self) -> Option<&ChatSession> {
        let id = self.current.as_deref()?;
        self.get(id)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn get(&self, session_id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    /// Most-recent-first view of the whole collection.
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Drop every restricted session (runs when the alternate mode is
    /// re-unlocked, so stale restricted threads never pile up).
    pub fn remove_restricted(&mut self) {
        let selected_restricted = self
            .current()
            .map(|s| s.is_restricted())
            .unwrap_or(false);
        self.sessions.retain(|s| !s.is_restricted());
        if selected_restricted {
            self.current = None;
        }
        self.persist();
    }

    /// Wipe everything, selection included.
    pub fn purge(&mut self) {
        self.sessions.clear();
        self.current = None;
        self.persist();
    }

    /// Mirror the collection to durable storage, minus restricted entries.
    /// Storage failures are logged and swallowed; in-memory state is
    /// already authoritative.
    fn persist(&self) {
        let snapshot: Vec<ChatSession> = self
            .sessions
            .iter()
            .filter(|s| !s.is_restricted())
            .cloned()
            .collect();
        if let Err(e) = self.storage.save(&snapshot) {
            tracing::warn!("failed to persist session snapshot: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use shared::chat::{MessageKind, DEFAULT_SESSION_TITLE};
    use std::sync::Arc;

    struct SharedStorage(Arc<MemoryStorage>);

    impl SnapshotStorage for SharedStorage {
        fn load(&self) -> anyhow::Result<Vec<ChatSession>> {
            self.0.load()
        }
        fn save(&self, sessions: &[ChatSession]) -> anyhow::Result<()> {
            self.0.save(sessions)
        }
    }

    fn store_with(backing: Arc<MemoryStorage>) -> SessionStore {
        SessionStore::new(Box::new(SharedStorage(backing)))
    }

    fn fresh_store() -> SessionStore {
        store_with(Arc::new(MemoryStorage::new()))
    }

    fn pair() -> (Message, Message) {
        (
            Message::user("hello", MessageKind::Text),
            Message::placeholder(MessageKind::Text),
        )
    }

    #[test]
    fn test_create_prepends_and_selects() {
        let mut store = fresh_store();
        let first = store.create_session(false);
        let second = store.create_session(false);
        assert_eq!(store.sessions()[0].id, second);
        assert_eq!(store.sessions()[1].id, first);
        assert_eq!(store.current_id(), Some(second.as_str()));
    }

    #[test]
    fn test_selection_never_dangles() {
        let mut store = fresh_store();
        let a = store.create_session(false);
        let b = store.create_session(false);

        store.select_session("not-a-session");
        assert_eq!(store.current_id(), Some(b.as_str()));

        store.select_session(&a);
        store.delete_session(&a);
        // Deleting the current session clears the selection, no fallback.
        assert_eq!(store.current_id(), None);
        assert_eq!(store.sessions().len(), 1);

        store.delete_session(&b);
        assert!(store.sessions().is_empty());
        assert_eq!(store.current_id(), None);
    }

    #[test]
    fn test_delete_non_current_keeps_selection() {
        let mut store = fresh_store();
        let a = store.create_session(false);
        let b = store.create_session(false);
        store.delete_session(&a);
        assert_eq!(store.current_id(), Some(b.as_str()));
    }

    #[test]
    fn test_append_pair_is_atomic_and_ordered() {
        let mut store = fresh_store();
        let id = store.create_session(false);
        let (user, placeholder) = pair();
        let placeholder_id = placeholder.id.clone();
        store.append_message_pair(&id, user, placeholder);

        let session = store.get(&id).unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].id, placeholder_id);
    }

    #[test]
    fn test_mutations_on_missing_targets_are_noops() {
        let mut store = fresh_store();
        let id = store.create_session(false);
        let (user, placeholder) = pair();
        let placeholder_id = placeholder.id.clone();
        store.append_message_pair(&id, user, placeholder);

        store.delete_session(&id);
        let (user, placeholder) = pair();
        store.append_message_pair(&id, user, placeholder);
        store.update_message(&id, &placeholder_id, MessagePatch::content("late"));
        store.rename_session(&id, "late title");
        assert!(store.sessions().is_empty());

        // Unknown message inside a live session is equally silent.
        let id = store.create_session(false);
        store.update_message(&id, "missing-message", MessagePatch::content("late"));
        assert!(store.get(&id).unwrap().messages.is_empty());
    }

    #[test]
    fn test_update_message_is_idempotent() {
        let mut store = fresh_store();
        let id = store.create_session(false);
        let (user, placeholder) = pair();
        let placeholder_id = placeholder.id.clone();
        store.append_message_pair(&id, user, placeholder);

        let patch = MessagePatch::content("Hi there");
        store.update_message(&id, &placeholder_id, patch.clone());
        let once = store.get(&id).unwrap().clone();
        store.update_message(&id, &placeholder_id, patch);
        assert_eq!(store.get(&id).unwrap(), &once);
    }

    #[test]
    fn test_restricted_sessions_never_persisted() {
        let backing = Arc::new(MemoryStorage::new());
        let mut store = store_with(backing.clone());
        store.create_session(true);
        let visible = store.create_session(false);
        assert_eq!(store.sessions().len(), 2);

        let persisted = backing.load().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, visible);
    }

    #[test]
    fn test_hydrate_round_trip_filters_restricted() {
        let backing = Arc::new(MemoryStorage::new());
        // Seed the slot directly with a restricted entry, as if an older
        // writer had leaked one.
        let mut restricted = ChatSession::new(true);
        restricted.push_pair(
            Message::user("secret", MessageKind::Text),
            Message::placeholder(MessageKind::Text),
        );
        let normal = ChatSession::new(false);
        backing.save(&[restricted, normal.clone()]).unwrap();

        let mut store = store_with(backing);
        store.hydrate();
        assert_eq!(store.sessions(), std::slice::from_ref(&normal));
        // Most recent (first) session becomes current.
        assert_eq!(store.current_id(), Some(normal.id.as_str()));
    }

    #[test]
    fn test_hydrate_keeps_existing_selection() {
        let backing = Arc::new(MemoryStorage::new());
        let mut store = store_with(backing.clone());
        let id = store.create_session(false);
        store.create_session(false);
        store.select_session(&id);
        store.hydrate();
        assert_eq!(store.current_id(), Some(id.as_str()));
    }

    #[test]
    fn test_rename_session() {
        let mut store = fresh_store();
        let id = store.create_session(false);
        assert_eq!(store.get(&id).unwrap().title, DEFAULT_SESSION_TITLE);
        store.rename_session(&id, "Mushuk rasmi");
        assert_eq!(store.get(&id).unwrap().title, "Mushuk rasmi");
    }

    #[test]
    fn test_remove_restricted_clears_restricted_selection() {
        let mut store = fresh_store();
        let normal = store.create_session(false);
        store.create_session(true); // becomes current
        store.remove_restricted();
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.current_id(), None);
        store.select_session(&normal);
        store.remove_restricted();
        assert_eq!(store.current_id(), Some(normal.as_str()));
    }

    #[test]
    fn test_purge_empties_everything() {
        let backing = Arc::new(MemoryStorage::new());
        let mut store = store_with(backing.clone());
        store.create_session(false);
        store.create_session(true);
        store.purge();
        assert!(store.sessions().is_empty());
        assert_eq!(store.current_id(), None);
        assert!(backing.load().unwrap().is_empty());
    }
}
