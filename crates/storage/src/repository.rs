use async_trait::async_trait;
use clinic_core::Clock;
use clinic_core::model::{
    ActivityDraft, ActivityId, CurriculumEntryDraft, CurriculumId, Evaluation, EvaluationKey,
    PatientId, ProtocolDraft, ProtocolTree, Session, SessionId, SessionStatus, SessionTarget,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by store adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Unknown id, or an id that belongs to another tenant.
    #[error("not found")]
    NotFound,

    /// The store understood the request and refused it.
    #[error("rejected by store: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response status {0}")]
    Status(u16),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether repeating the same request may succeed. Client-side statuses
    /// such as 401 are not transient; 408, 429 and 5xx are.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Network(_) | StorageError::Connection(_) => true,
            StorageError::Status(code) => *code == 408 || *code == 429 || *code >= 500,
            StorageError::NotFound | StorageError::Rejected(_) | StorageError::Serialization(_) => {
                false
            }
        }
    }
}

/// Everything needed to resume a session: header, raw protocol and the
/// evaluations recorded so far.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBundle {
    pub session: Session,
    pub protocol: ProtocolDraft,
    pub evaluations: Vec<Evaluation>,
}

/// Result of a start call. `existing` is set when the store handed back a
/// session that was already in progress for the same patient and protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedSession {
    pub session: Session,
    pub existing: bool,
    pub message: Option<String>,
}

/// One create-or-overwrite write keyed by the evaluation's composite key.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationUpsert {
    pub session_id: SessionId,
    pub evaluation: Evaluation,
}

/// Contract of the remote evaluation store.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Fetch the session header, its protocol and recorded evaluations.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown or foreign ids, or other
    /// storage errors.
    async fn fetch_session(&self, id: SessionId) -> Result<SessionBundle, StorageError>;

    /// Start a session, or return the one already in progress.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the protocol does not exist.
    async fn start_session(
        &self,
        patient_id: PatientId,
        target: SessionTarget,
    ) -> Result<StartedSession, StorageError>;

    /// Idempotent upsert of one evaluation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Rejected` if the session no longer accepts
    /// evaluations, or other storage errors.
    async fn upsert_evaluation(&self, upsert: &EvaluationUpsert) -> Result<(), StorageError>;

    /// Transition the session to `FINALIZADA`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Rejected` when the store's own completeness check
    /// fails or the session is already closed.
    async fn finalize_session(&self, id: SessionId) -> Result<Session, StorageError>;
}

//
// ─── IN-MEMORY STORE ───────────────────────────────────────────────────────────
//

#[derive(Default)]
struct InMemoryState {
    next_session_id: u64,
    curricula: HashMap<CurriculumId, Vec<CurriculumEntryDraft>>,
    activities: HashMap<ActivityId, ActivityDraft>,
    sessions: HashMap<SessionId, Session>,
    evaluations: HashMap<SessionId, BTreeMap<EvaluationKey, Evaluation>>,
}

impl InMemoryState {
    fn protocol_for(&self, target: SessionTarget) -> Option<ProtocolDraft> {
        match target {
            SessionTarget::Curriculum(id) => self.curricula.get(&id).map(|entries| ProtocolDraft {
                entries: entries.clone(),
            }),
            SessionTarget::Activity(id) => self.activities.get(&id).map(|activity| ProtocolDraft {
                entries: vec![CurriculumEntryDraft {
                    order: 1,
                    activity: activity.clone(),
                }],
            }),
        }
    }

    fn open_session(&self, id: SessionId) -> Result<&Session, StorageError> {
        let session = self.sessions.get(&id).ok_or(StorageError::NotFound)?;
        if session.status.is_terminal() {
            return Err(StorageError::Rejected(format!(
                "session {id} is {}",
                session.status
            )));
        }
        Ok(session)
    }
}

/// In-memory store with the same semantics as the remote one: session reuse
/// per (patient, protocol), upsert by composite key, and its own completeness
/// check on finalize.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    clock: Clock,
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(InMemoryState::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, InMemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Register a curriculum made of the given ordered entries.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the store lock is poisoned.
    pub fn insert_curriculum(
        &self,
        id: CurriculumId,
        entries: Vec<CurriculumEntryDraft>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        for entry in &entries {
            guard
                .activities
                .insert(entry.activity.id, entry.activity.clone());
        }
        guard.curricula.insert(id, entries);
        Ok(())
    }

    /// Register a stand-alone activity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the store lock is poisoned.
    pub fn insert_activity(&self, activity: ActivityDraft) -> Result<(), StorageError> {
        self.lock()?.activities.insert(activity.id, activity);
        Ok(())
    }

    /// Administrative cancellation, outside the evaluation engine's authority.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown sessions.
    pub fn cancel_session(&self, id: SessionId) -> Result<Session, StorageError> {
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let session = guard.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        session.status = SessionStatus::Cancelada;
        session.finished_at = Some(now);
        Ok(session.clone())
    }

    /// Evaluations recorded for a session, ordered by composite key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the store lock is poisoned.
    pub fn evaluations(&self, id: SessionId) -> Result<Vec<Evaluation>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .evaluations
            .get(&id)
            .map(|by_key| by_key.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl EvaluationStore for InMemoryStore {
    async fn fetch_session(&self, id: SessionId) -> Result<SessionBundle, StorageError> {
        let guard = self.lock()?;
        let session = guard.sessions.get(&id).cloned().ok_or(StorageError::NotFound)?;
        let protocol = guard
            .protocol_for(session.target)
            .ok_or(StorageError::NotFound)?;
        let evaluations = guard
            .evaluations
            .get(&id)
            .map(|by_key| by_key.values().cloned().collect())
            .unwrap_or_default();
        Ok(SessionBundle {
            session,
            protocol,
            evaluations,
        })
    }

    async fn start_session(
        &self,
        patient_id: PatientId,
        target: SessionTarget,
    ) -> Result<StartedSession, StorageError> {
        let now = self.clock.now();
        let mut guard = self.lock()?;

        if let Some(existing) = guard.sessions.values().find(|session| {
            session.patient_id == patient_id && session.target == target && session.is_in_progress()
        }) {
            return Ok(StartedSession {
                session: existing.clone(),
                existing: true,
                message: Some(format!("session {} already in progress", existing.id)),
            });
        }

        if guard.protocol_for(target).is_none() {
            return Err(StorageError::NotFound);
        }

        guard.next_session_id += 1;
        let id = SessionId::new(guard.next_session_id);
        let session = Session::started(id, patient_id, target, now);
        guard.sessions.insert(id, session.clone());
        Ok(StartedSession {
            session,
            existing: false,
            message: None,
        })
    }

    async fn upsert_evaluation(&self, upsert: &EvaluationUpsert) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.open_session(upsert.session_id)?;
        guard
            .evaluations
            .entry(upsert.session_id)
            .or_default()
            .insert(upsert.evaluation.key, upsert.evaluation.clone());
        Ok(())
    }

    async fn finalize_session(&self, id: SessionId) -> Result<Session, StorageError> {
        let now = self.clock.now();
        let mut guard = self.lock()?;
        let target = guard.open_session(id)?.target;

        let draft = guard.protocol_for(target).ok_or(StorageError::NotFound)?;
        let tree = ProtocolTree::resolve(target, draft)
            .map_err(|e| StorageError::Rejected(e.to_string()))?;
        let evaluated = guard
            .evaluations
            .get(&id)
            .map_or(0, |by_key| by_key.keys().filter(|key| tree.requires(key)).count());
        let total = tree.total_required();
        if evaluated != total {
            return Err(StorageError::Rejected(format!(
                "session incomplete: {evaluated} of {total} evaluations recorded"
            )));
        }

        let session = guard.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        session.status = SessionStatus::Finalizada;
        session.finished_at = Some(now);
        Ok(session.clone())
    }
}
