use std::sync::Arc;

use clinic_core::model::{ActivityId, Evaluation, InstructionId, SessionId};
use storage::repository::{EvaluationStore, EvaluationUpsert};
use tracing::{debug, info, warn};

use super::board::AttemptBoard;
use super::state::SessionState;
use crate::error::SessionError;

/// Result of committing the instruction under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    /// Upserts acknowledged by the store.
    pub committed: usize,
    /// Keys that were not in the index before.
    pub new_keys: usize,
    pub index_size: usize,
}

/// Writes attempt drafts through to the evaluation store.
#[derive(Clone)]
pub struct EvaluationSynchronizer {
    store: Arc<dyn EvaluationStore>,
}

impl EvaluationSynchronizer {
    #[must_use]
    pub fn new(store: Arc<dyn EvaluationStore>) -> Self {
        Self { store }
    }

    /// Submit every attempt of one instruction, one upsert at a time.
    ///
    /// Nothing is sent unless attempts `1..=required_attempts` all carry a
    /// draft score. On success the written evaluations are returned in attempt
    /// order.
    ///
    /// # Errors
    ///
    /// `IncompleteAttempt` naming the first unscored attempt. When an upsert
    /// fails, `Network` (transient) or `CommitAborted` (anything else) carries
    /// the failing attempt and the attempts acknowledged before it.
    pub async fn commit_instruction(
        &self,
        session_id: SessionId,
        activity_id: ActivityId,
        instruction_id: InstructionId,
        required_attempts: u32,
        board: &AttemptBoard,
    ) -> Result<Vec<Evaluation>, SessionError> {
        let evaluations = board.evaluations(required_attempts)?;

        let mut acknowledged = Vec::with_capacity(evaluations.len());
        for evaluation in &evaluations {
            let attempt = evaluation.key.attempt;
            debug_assert_eq!(evaluation.key.activity_id, activity_id);
            debug_assert_eq!(evaluation.key.instruction_id, instruction_id);

            let upsert = EvaluationUpsert {
                session_id,
                evaluation: evaluation.clone(),
            };
            if let Err(err) = self.store.upsert_evaluation(&upsert).await {
                warn!(
                    %session_id,
                    %activity_id,
                    %instruction_id,
                    attempt,
                    acknowledged = acknowledged.len(),
                    error = %err,
                    "evaluation upsert failed"
                );
                return Err(SessionError::from_upsert(session_id, err, attempt, acknowledged));
            }
            debug!(%session_id, key = %evaluation.key, score = %evaluation.score, "evaluation upserted");
            acknowledged.push(attempt);
        }

        Ok(evaluations)
    }

    /// Commit the instruction under the state's cursor and merge the result
    /// into its index.
    ///
    /// # Errors
    ///
    /// `Closed` on a terminal session, otherwise as
    /// [`EvaluationSynchronizer::commit_instruction`]. The index is left
    /// untouched on any error.
    pub async fn commit_current(&self, state: &mut SessionState) -> Result<CommitReport, SessionError> {
        state.ensure_open()?;
        let session_id = state.session().id;
        let activity = state.current_activity();
        let activity_id = activity.id();
        let required = activity.target_attempts();
        let instruction_id = state.current_instruction().id;

        let evaluations = self
            .commit_instruction(session_id, activity_id, instruction_id, required, state.board())
            .await?;

        let committed = evaluations.len();
        let new_keys = state.record_commit(evaluations);
        let index_size = state.index().len();
        info!(%session_id, %activity_id, %instruction_id, committed, new_keys, index_size, "instruction committed");

        Ok(CommitReport {
            committed,
            new_keys,
            index_size,
        })
    }
}
