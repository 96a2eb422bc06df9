//! Session Registry
//!
//! Every websocket connection owns one `Session`: its conversation history,
//! the recording being assembled, and the interrupt token of the turn in
//! flight. `SessionStore` is the process-wide registry of sessions keyed by
//! identifier. A reconnect with a known identifier attaches to the same
//! session, and the session is removed only when its last connection
//! releases it. Attach and release are atomic per key; tasks that still hold
//! a session after it was removed see it as closed and their writes become
//! no-ops.

use crate::conversation::{History, Turn};
use crate::frame::{FrameAssembler, FrameError, RecordingState};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-connection state owned by the `SessionStore`.
#[derive(Debug)]
pub struct Session {
    id: String,
    history: Mutex<History>,
    assembler: Mutex<FrameAssembler>,
    interrupt: Mutex<CancellationToken>,
    connections: AtomicUsize,
    closed: AtomicBool,
}

impl Session {
    fn new(id: String, system_prompt: &str) -> Self {
        Self {
            id,
            history: Mutex::new(History::new(system_prompt)),
            assembler: Mutex::new(FrameAssembler::new()),
            interrupt: Mutex::new(CancellationToken::new()),
            connections: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True once the session has been removed from its store.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn history(&self) -> History {
        self.history.lock().await.clone()
    }

    /// Appends a turn. Ignored once the session is closed.
    pub async fn append(&self, turn: Turn) -> bool {
        if self.is_closed() {
            debug!(session_id = %self.id, "Dropping turn for closed session");
            return false;
        }
        self.history.lock().await.push(turn);
        true
    }

    /// Commits a working copy of the history that extends the current one.
    pub async fn commit(&self, working: History) -> bool {
        if self.is_closed() {
            debug!(session_id = %self.id, "Dropping history commit for closed session");
            return false;
        }
        self.history.lock().await.merge_from(working)
    }

    pub async fn accept_frame(&self, frame: &[u8]) -> Result<RecordingState, FrameError> {
        let mut assembler = self.assembler.lock().await;
        assembler.accept(frame)?;
        Ok(assembler.state())
    }

    /// Takes the assembled recording, leaving the assembler idle and empty.
    pub async fn finalize_recording(&self) -> Bytes {
        self.assembler.lock().await.finalize()
    }

    pub async fn reset_recording(&self) {
        self.assembler.lock().await.reset();
    }

    pub async fn recording_state(&self) -> RecordingState {
        self.assembler.lock().await.state()
    }

    pub async fn buffered_bytes(&self) -> usize {
        self.assembler.lock().await.len()
    }

    /// Number of connections currently attached.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Signals every turn started before this call to stop at its next checkpoint.
    pub async fn interrupt(&self) {
        self.interrupt.lock().await.cancel();
    }

    /// Starts a new turn. Its token is cancelled by the next `interrupt`,
    /// together with any earlier turn still pending or in flight. An
    /// interrupt that landed before this call does not carry over.
    pub async fn begin_turn(&self) -> CancellationToken {
        let mut current = self.interrupt.lock().await;
        if current.is_cancelled() {
            *current = CancellationToken::new();
        }
        current.child_token()
    }

    pub async fn is_interrupted(&self) -> bool {
        self.interrupt.lock().await.is_cancelled()
    }
}

/// Process-wide registry of live sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    system_prompt: Arc<str>,
}

impl SessionStore {
    pub fn new(system_prompt: impl Into<Arc<str>>) -> Self {
        Self {
            sessions: DashMap::new(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Attaches a connection to the session for `id`, creating it with a
    /// fresh history if absent.
    ///
    /// An existing session (a reconnect) keeps its history but has its
    /// interrupt state reset. Every call must be paired with one `release`.
    pub async fn get_or_create(&self, id: &str) -> Arc<Session> {
        let mut created = false;
        let session = {
            let entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
                created = true;
                Arc::new(Session::new(id.to_string(), &self.system_prompt))
            });
            // Counted under the shard lock so a concurrent release sees it.
            entry.connections.fetch_add(1, Ordering::AcqRel);
            entry.clone()
        };

        if created {
            info!(session_id = %id, "Created session");
        } else {
            info!(
                session_id = %id,
                connections = session.connections(),
                "Restoring session"
            );
            session.begin_turn().await;
        }
        session
    }

    /// Detaches one connection from `session`. The last connection to leave
    /// removes it from the store and marks it closed; returns whether that
    /// happened. Releasing a session that is no longer registered is a no-op.
    pub fn release(&self, session: &Arc<Session>) -> bool {
        let removed = self
            .sessions
            .remove_if(session.id(), |_, live| {
                Arc::ptr_eq(live, session) && live.connections.fetch_sub(1, Ordering::AcqRel) == 1
            })
            .is_some();

        if removed {
            session.closed.store(true, Ordering::Release);
            info!(session_id = %session.id(), "Removed session");
        } else if session.is_closed() {
            debug!(session_id = %session.id(), "Session already removed");
        } else {
            debug!(
                session_id = %session.id(),
                connections = session.connections(),
                "Connection released; session still attached"
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::frame::CONTAINER_SIGNATURE;

    #[tokio::test]
    async fn test_get_or_create_builds_singleton_system_turn() {
        let store = SessionStore::new("system prompt");
        let session = store.get_or_create("abc").await;

        let history = session.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].role, Role::System);
        assert!(!session.is_interrupted().await);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_returns_existing_session() {
        let store = SessionStore::new("sys");
        let first = store.get_or_create("abc").await;
        first.append(Turn::user("hello")).await;
        first.interrupt().await;

        let second = store.get_or_create("abc").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.history().await.len(), 2);
        assert!(!second.is_interrupted().await);
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_closes_session() {
        let store = SessionStore::new("sys");
        let session = store.get_or_create("abc").await;

        assert!(store.release(&session));
        assert!(!store.release(&session));
        assert!(store.is_empty());
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_overlapping_reconnect_survives_old_teardown() {
        let store = SessionStore::new("sys");
        let old = store.get_or_create("sid").await;
        let new = store.get_or_create("sid").await;
        assert_eq!(new.connections(), 2);

        assert!(!store.release(&old));
        assert!(!new.is_closed());
        assert_eq!(store.len(), 1);
        assert!(new.append(Turn::user("still here")).await);
        assert_eq!(new.history().await.len(), 2);

        assert!(store.release(&new));
        assert!(new.is_closed());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_release_of_replaced_session_leaves_new_one() {
        let store = SessionStore::new("sys");
        let stale = store.get_or_create("sid").await;
        store.release(&stale);
        let fresh = store.get_or_create("sid").await;

        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(!store.release(&stale));
        assert!(!fresh.is_closed());
        assert_eq!(fresh.connections(), 1);
    }

    #[tokio::test]
    async fn test_stale_writes_after_removal_are_noops() {
        let store = SessionStore::new("sys");
        let session = store.get_or_create("abc").await;
        store.release(&session);

        assert!(!session.append(Turn::user("late")).await);
        let mut working = session.history().await;
        working.push(Turn::assistant("late reply"));
        assert!(!session.commit(working).await);
        assert_eq!(session.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_current_turn_only() {
        let store = SessionStore::new("sys");
        let session = store.get_or_create("abc").await;

        let turn = session.begin_turn().await;
        session.interrupt().await;
        assert!(turn.is_cancelled());

        let next = session.begin_turn().await;
        assert!(!next.is_cancelled());
        assert!(!session.is_interrupted().await);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_every_pending_turn() {
        let store = SessionStore::new("sys");
        let session = store.get_or_create("abc").await;

        let first = session.begin_turn().await;
        let second = session.begin_turn().await;
        session.interrupt().await;

        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_session() {
        let store = Arc::new(SessionStore::new("sys"));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.get_or_create("shared").await }));
        }
        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(store.len(), 1);
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(sessions[0].connections(), 16);
    }

    #[tokio::test]
    async fn test_frames_flow_through_session_assembler() {
        let store = SessionStore::new("sys");
        let session = store.get_or_create("abc").await;

        assert!(session.accept_frame(b"noise").await.is_err());
        assert_eq!(session.recording_state().await, RecordingState::Idle);

        let state = session.accept_frame(&CONTAINER_SIGNATURE).await.unwrap();
        assert_eq!(state, RecordingState::Recording);
        session.accept_frame(b"more").await.unwrap();
        assert_eq!(session.buffered_bytes().await, 8);

        assert_eq!(session.finalize_recording().await.len(), 8);
        assert_eq!(session.buffered_bytes().await, 0);
    }
}
