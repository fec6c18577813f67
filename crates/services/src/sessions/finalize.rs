use std::sync::Arc;

use clinic_core::model::Session;
use storage::repository::EvaluationStore;
use tracing::{info, warn};

use super::state::SessionState;
use crate::error::SessionError;

/// Closes a session once every required evaluation is recorded.
#[derive(Clone)]
pub struct FinalizationGate {
    store: Arc<dyn EvaluationStore>,
}

impl FinalizationGate {
    #[must_use]
    pub fn new(store: Arc<dyn EvaluationStore>) -> Self {
        Self { store }
    }

    /// Ask the store to move the session to `FINALIZADA` and adopt the header
    /// it returns.
    ///
    /// # Errors
    ///
    /// `Closed` for terminal sessions and `IncompleteSession` while the index
    /// is missing evaluations; neither reaches the store. A store refusal
    /// surfaces as `ServerValidation` with its message unchanged.
    pub async fn finalize(&self, state: &mut SessionState) -> Result<Session, SessionError> {
        state.ensure_open()?;
        let session_id = state.session().id;

        let completion = state.completion();
        if !completion.is_session_complete() {
            return Err(SessionError::IncompleteSession {
                evaluated: completion.evaluated_count(),
                total: completion.total_required(),
            });
        }

        let session = self
            .store
            .finalize_session(session_id)
            .await
            .map_err(|err| {
                warn!(%session_id, error = %err, "finalize failed");
                SessionError::from_storage(session_id, err)
            })?;

        info!(%session_id, status = %session.status, "session finalized");
        state.record_finalized(session.clone());
        Ok(session)
    }
}
