use std::sync::Arc;

use clinic_core::model::{PatientId, ProtocolTree, Session, SessionId, SessionTarget};
use storage::repository::EvaluationStore;
use tracing::{info, warn};

use super::state::SessionState;
use crate::error::SessionError;

/// Result of starting (or resuming) a session.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    pub session: Session,
    /// The store handed back a session already in progress.
    pub resumed: bool,
    pub message: Option<String>,
}

/// Fetches sessions from the store and turns them into [`SessionState`].
#[derive(Clone)]
pub struct SessionLoader {
    store: Arc<dyn EvaluationStore>,
}

impl SessionLoader {
    #[must_use]
    pub fn new(store: Arc<dyn EvaluationStore>) -> Self {
        Self { store }
    }

    /// Load a session with its protocol and recorded evaluations.
    ///
    /// Transient failures are not retried here.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for unknown or foreign ids, `Network` for transport
    /// failures and `InvalidProtocol` when the protocol cannot be resolved.
    pub async fn load(&self, session_id: SessionId) -> Result<SessionState, SessionError> {
        let bundle = self.store.fetch_session(session_id).await.map_err(|err| {
            warn!(%session_id, error = %err, "failed to fetch session");
            SessionError::from_storage(session_id, err)
        })?;

        let protocol = ProtocolTree::resolve(bundle.session.target, bundle.protocol)?;
        let state = SessionState::new(bundle.session, protocol, bundle.evaluations);

        let progress = state.progress();
        info!(
            %session_id,
            status = %state.session().status,
            evaluated = progress.evaluated,
            total = progress.total,
            cursor = %state.cursor(),
            "session loaded"
        );
        Ok(state)
    }

    /// Start a session for `patient_id`, or pick up the one already running
    /// for the same target.
    ///
    /// # Errors
    ///
    /// `TargetNotFound` when the store has no such curriculum or activity,
    /// otherwise the mapped store error.
    pub async fn start(
        &self,
        patient_id: PatientId,
        target: SessionTarget,
    ) -> Result<StartOutcome, SessionError> {
        let started = self
            .store
            .start_session(patient_id, target)
            .await
            .map_err(|err| {
                warn!(%patient_id, %target, error = %err, "failed to start session");
                SessionError::from_start(target, err)
            })?;

        info!(
            session_id = %started.session.id,
            %patient_id,
            %target,
            resumed = started.existing,
            "session started"
        );
        Ok(StartOutcome {
            session: started.session,
            resumed: started.existing,
            message: started.message,
        })
    }
}
