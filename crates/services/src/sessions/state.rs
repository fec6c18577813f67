use clinic_core::model::{
    Activity, Evaluation, EvaluationIndex, Instruction, ProtocolTree, Score, Session,
};
use tracing::{debug, warn};

use super::board::AttemptBoard;
use super::completion::CompletionValidator;
use super::cursor::ProgressCursor;
use super::progress::SessionProgress;
use crate::error::SessionError;

/// Local input applied to a [`SessionState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SetScore { attempt: u32, score: Score },
    ClearScore { attempt: u32 },
    SetNote { attempt: u32, note: String },
    Advance,
    Retreat,
    JumpToActivity(usize),
}

/// Outcome of a successfully applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    DraftUpdated,
    /// Cursor moved by one position. `discarded` counts uncommitted draft
    /// scores left behind.
    Moved {
        from: ProgressCursor,
        to: ProgressCursor,
        discarded: usize,
    },
    /// Navigation at a boundary: nothing changed.
    Stayed,
    Jumped { to: ProgressCursor, discarded: usize },
}

/// Everything one open session holds in memory.
///
/// The index only grows and is written solely by commits and finalization
/// inside this crate; the cursor and the board change through [`apply`].
///
/// [`apply`]: SessionState::apply
#[derive(Debug, Clone)]
pub struct SessionState {
    session: Session,
    protocol: ProtocolTree,
    index: EvaluationIndex,
    cursor: ProgressCursor,
    board: AttemptBoard,
}

impl SessionState {
    /// Build the state of a loaded session. Evaluations for keys the protocol
    /// does not require are dropped; the cursor resumes at the first
    /// instruction with missing attempts.
    #[must_use]
    pub fn new(session: Session, protocol: ProtocolTree, evaluations: Vec<Evaluation>) -> Self {
        let mut index = EvaluationIndex::new();
        for evaluation in evaluations {
            if protocol.requires(&evaluation.key) {
                index.upsert(evaluation);
            } else {
                warn!(session_id = %session.id, key = %evaluation.key, "ignoring evaluation outside protocol");
            }
        }
        let cursor = ProgressCursor::resume(&protocol, &index);
        let board = board_at(&protocol, &index, cursor);

        Self {
            session,
            protocol,
            index,
            cursor,
            board,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn protocol(&self) -> &ProtocolTree {
        &self.protocol
    }

    #[must_use]
    pub fn index(&self) -> &EvaluationIndex {
        &self.index
    }

    #[must_use]
    pub fn cursor(&self) -> ProgressCursor {
        self.cursor
    }

    #[must_use]
    pub fn board(&self) -> &AttemptBoard {
        &self.board
    }

    #[must_use]
    pub fn current_activity(&self) -> &Activity {
        &self.protocol.activities()[self.cursor.activity_index()]
    }

    #[must_use]
    pub fn current_instruction(&self) -> &Instruction {
        &self.current_activity().instructions()[self.cursor.instruction_index()]
    }

    #[must_use]
    pub fn completion(&self) -> CompletionValidator<'_> {
        CompletionValidator::new(&self.protocol, &self.index)
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.completion().progress()
    }

    /// Attempts of the current instruction that the index does not hold yet.
    #[must_use]
    pub fn missing_at_cursor(&self) -> usize {
        let activity = self.current_activity();
        activity
            .keys_for(self.current_instruction().id)
            .filter(|key| !self.index.contains(key))
            .count()
    }

    /// Single transition function for local events.
    ///
    /// # Errors
    ///
    /// Draft edits fail with `Closed` on a terminal session and with the
    /// board's range errors. `Advance` fails with `PositionIncomplete` until
    /// every attempt of the current instruction is committed. `JumpToActivity`
    /// fails with `JumpUnavailable` outside curriculum flow and with
    /// `ActivityOutOfRange` for a bad index.
    pub fn apply(&mut self, event: SessionEvent) -> Result<Transition, SessionError> {
        match event {
            SessionEvent::SetScore { attempt, score } => {
                self.ensure_open()?;
                self.board.set_score(attempt, score)?;
                Ok(Transition::DraftUpdated)
            }
            SessionEvent::ClearScore { attempt } => {
                self.ensure_open()?;
                self.board.clear_score(attempt)?;
                Ok(Transition::DraftUpdated)
            }
            SessionEvent::SetNote { attempt, note } => {
                self.ensure_open()?;
                self.board.set_note(attempt, note)?;
                Ok(Transition::DraftUpdated)
            }
            SessionEvent::Advance => {
                let missing = self.missing_at_cursor();
                if missing > 0 {
                    return Err(SessionError::PositionIncomplete { missing });
                }
                Ok(self.move_to(self.cursor.next(&self.protocol)))
            }
            SessionEvent::Retreat => Ok(self.move_to(self.cursor.previous(&self.protocol))),
            SessionEvent::JumpToActivity(index) => {
                if !self.protocol.is_curriculum() {
                    return Err(SessionError::JumpUnavailable);
                }
                let to = ProgressCursor::at_activity(&self.protocol, index).ok_or(
                    SessionError::ActivityOutOfRange {
                        index,
                        len: self.protocol.activities().len(),
                    },
                )?;
                let discarded = self.reposition(to);
                Ok(Transition::Jumped { to, discarded })
            }
        }
    }

    /// # Errors
    ///
    /// See [`SessionState::apply`].
    pub fn set_score(&mut self, attempt: u32, score: Score) -> Result<Transition, SessionError> {
        self.apply(SessionEvent::SetScore { attempt, score })
    }

    /// # Errors
    ///
    /// See [`SessionState::apply`].
    pub fn clear_score(&mut self, attempt: u32) -> Result<Transition, SessionError> {
        self.apply(SessionEvent::ClearScore { attempt })
    }

    /// # Errors
    ///
    /// See [`SessionState::apply`].
    pub fn set_note(
        &mut self,
        attempt: u32,
        note: impl Into<String>,
    ) -> Result<Transition, SessionError> {
        self.apply(SessionEvent::SetNote {
            attempt,
            note: note.into(),
        })
    }

    /// # Errors
    ///
    /// `PositionIncomplete` while the current instruction has uncommitted
    /// attempts.
    pub fn advance(&mut self) -> Result<Transition, SessionError> {
        self.apply(SessionEvent::Advance)
    }

    /// Never blocked.
    pub fn retreat(&mut self) -> Transition {
        self.move_to(self.cursor.previous(&self.protocol))
    }

    /// # Errors
    ///
    /// `JumpUnavailable` or `ActivityOutOfRange`.
    pub fn jump_to_activity(&mut self, index: usize) -> Result<Transition, SessionError> {
        self.apply(SessionEvent::JumpToActivity(index))
    }

    pub(crate) fn ensure_open(&self) -> Result<(), SessionError> {
        if self.session.status.is_terminal() {
            return Err(SessionError::Closed(self.session.status));
        }
        Ok(())
    }

    /// Merge acknowledged evaluations into the index. Returns how many keys
    /// were new.
    pub(crate) fn record_commit(&mut self, evaluations: Vec<Evaluation>) -> usize {
        let mut added = 0;
        for evaluation in evaluations {
            if self.index.upsert(evaluation) {
                added += 1;
            }
        }
        self.board.mark_committed();
        added
    }

    pub(crate) fn record_finalized(&mut self, session: Session) {
        self.session = session;
    }

    fn move_to(&mut self, to: ProgressCursor) -> Transition {
        let from = self.cursor;
        if to == from {
            return Transition::Stayed;
        }
        let discarded = self.reposition(to);
        Transition::Moved {
            from,
            to,
            discarded,
        }
    }

    fn reposition(&mut self, to: ProgressCursor) -> usize {
        let discarded = self.board.pending_changes();
        if discarded > 0 {
            warn!(
                session_id = %self.session.id,
                from = %self.cursor,
                to = %to,
                discarded,
                "discarding uncommitted draft scores"
            );
        }
        self.cursor = to;
        self.board = board_at(&self.protocol, &self.index, to);
        debug!(session_id = %self.session.id, cursor = %to, "cursor moved");
        discarded
    }
}

fn board_at(protocol: &ProtocolTree, index: &EvaluationIndex, cursor: ProgressCursor) -> AttemptBoard {
    let activity = &protocol.activities()[cursor.activity_index()];
    let instruction = &activity.instructions()[cursor.instruction_index()];
    AttemptBoard::for_position(activity, instruction.id, index)
}
