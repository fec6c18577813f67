use std::sync::Arc;

use clinic_core::model::{PatientId, Session, SessionId, SessionTarget};
use storage::repository::EvaluationStore;

use super::finalize::FinalizationGate;
use super::loader::{SessionLoader, StartOutcome};
use super::state::{SessionState, Transition};
use super::synchronizer::{CommitReport, EvaluationSynchronizer};
use crate::error::SessionError;

/// Result of committing the current instruction and moving on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitAndAdvance {
    pub report: CommitReport,
    pub transition: Transition,
}

/// Entry point wiring the loader, synchronizer and finalization gate to one
/// store.
#[derive(Clone)]
pub struct EvaluationSessionService {
    loader: SessionLoader,
    synchronizer: EvaluationSynchronizer,
    gate: FinalizationGate,
}

impl EvaluationSessionService {
    #[must_use]
    pub fn new(store: Arc<dyn EvaluationStore>) -> Self {
        Self {
            loader: SessionLoader::new(Arc::clone(&store)),
            synchronizer: EvaluationSynchronizer::new(Arc::clone(&store)),
            gate: FinalizationGate::new(store),
        }
    }

    /// # Errors
    ///
    /// See [`SessionLoader::start`].
    pub async fn start_session(
        &self,
        patient_id: PatientId,
        target: SessionTarget,
    ) -> Result<StartOutcome, SessionError> {
        self.loader.start(patient_id, target).await
    }

    /// # Errors
    ///
    /// See [`SessionLoader::load`].
    pub async fn open_session(&self, session_id: SessionId) -> Result<SessionState, SessionError> {
        self.loader.load(session_id).await
    }

    /// # Errors
    ///
    /// See [`EvaluationSynchronizer::commit_current`].
    pub async fn commit_current(&self, state: &mut SessionState) -> Result<CommitReport, SessionError> {
        self.synchronizer.commit_current(state).await
    }

    /// Commit the current instruction, then advance the cursor.
    ///
    /// # Errors
    ///
    /// Any commit error; the cursor does not move in that case.
    pub async fn commit_and_advance(
        &self,
        state: &mut SessionState,
    ) -> Result<CommitAndAdvance, SessionError> {
        let report = self.commit_current(state).await?;
        let transition = state.advance()?;
        Ok(CommitAndAdvance { report, transition })
    }

    /// # Errors
    ///
    /// See [`FinalizationGate::finalize`].
    pub async fn finalize(&self, state: &mut SessionState) -> Result<Session, SessionError> {
        self.gate.finalize(state).await
    }
}
