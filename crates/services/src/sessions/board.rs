use clinic_core::model::{
    Activity, ActivityId, Evaluation, EvaluationIndex, EvaluationKey, InstructionId, Score,
    ScoringScale,
};

use crate::error::SessionError;

/// Draft of one attempt at the displayed instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptDraft {
    pub score: Option<Score>,
    pub note: String,
    /// Set when the draft mirrors what the index holds for this attempt.
    pub committed: bool,
}

impl AttemptDraft {
    /// Scored but not yet written through to the store.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.score.is_some() && !self.committed
    }
}

/// Attempt drafts for the instruction under the cursor.
///
/// Seeded from the evaluation index when the cursor lands on a position and
/// thrown away when it leaves. Edits never touch the index.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptBoard {
    activity_id: ActivityId,
    instruction_id: InstructionId,
    scale: ScoringScale,
    drafts: Vec<AttemptDraft>,
}

impl AttemptBoard {
    /// Fresh board for `instruction_id` of `activity`, pre-filled with the
    /// attempts already present in `index`.
    #[must_use]
    pub fn for_position(
        activity: &Activity,
        instruction_id: InstructionId,
        index: &EvaluationIndex,
    ) -> Self {
        let drafts = activity
            .keys_for(instruction_id)
            .map(|key| match index.get(&key) {
                Some(value) => AttemptDraft {
                    score: Some(value.score),
                    note: value.note.clone().unwrap_or_default(),
                    committed: true,
                },
                None => AttemptDraft::default(),
            })
            .collect();

        Self {
            activity_id: activity.id(),
            instruction_id,
            scale: activity.scale().clone(),
            drafts,
        }
    }

    #[must_use]
    pub fn activity_id(&self) -> ActivityId {
        self.activity_id
    }

    #[must_use]
    pub fn instruction_id(&self) -> InstructionId {
        self.instruction_id
    }

    #[must_use]
    pub fn scale(&self) -> &ScoringScale {
        &self.scale
    }

    #[must_use]
    pub fn required_attempts(&self) -> u32 {
        u32::try_from(self.drafts.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn attempt(&self, attempt: u32) -> Option<&AttemptDraft> {
        let idx = usize::try_from(attempt).ok()?.checked_sub(1)?;
        self.drafts.get(idx)
    }

    /// `(attempt number, draft)` pairs, attempt 1 first.
    pub fn attempts(&self) -> impl Iterator<Item = (u32, &AttemptDraft)> {
        (1..).zip(self.drafts.iter())
    }

    /// # Errors
    ///
    /// `AttemptOutOfRange` outside `1..=required`, `ScoreOutOfRange` when the
    /// score is not a level of the activity's scale.
    pub fn set_score(&mut self, attempt: u32, score: Score) -> Result<(), SessionError> {
        if !self.scale.contains(score) {
            return Err(SessionError::ScoreOutOfRange {
                score,
                levels: self.scale.len(),
            });
        }
        let draft = self.draft_mut(attempt)?;
        draft.score = Some(score);
        draft.committed = false;
        Ok(())
    }

    /// # Errors
    ///
    /// `AttemptOutOfRange` outside `1..=required`.
    pub fn clear_score(&mut self, attempt: u32) -> Result<(), SessionError> {
        let draft = self.draft_mut(attempt)?;
        draft.score = None;
        draft.committed = false;
        Ok(())
    }

    /// # Errors
    ///
    /// `AttemptOutOfRange` outside `1..=required`.
    pub fn set_note(&mut self, attempt: u32, note: impl Into<String>) -> Result<(), SessionError> {
        let draft = self.draft_mut(attempt)?;
        draft.note = note.into();
        draft.committed = false;
        Ok(())
    }

    /// Lowest attempt number without a draft score.
    #[must_use]
    pub fn first_missing(&self) -> Option<u32> {
        self.attempts()
            .find(|(_, draft)| draft.score.is_none())
            .map(|(attempt, _)| attempt)
    }

    #[must_use]
    pub fn is_fully_scored(&self) -> bool {
        self.first_missing().is_none()
    }

    /// Number of scored attempts not yet committed.
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.drafts.iter().filter(|draft| draft.is_pending()).count()
    }

    /// The evaluations this board would write, or the first unscored attempt.
    pub(crate) fn evaluations(&self, required_attempts: u32) -> Result<Vec<Evaluation>, SessionError> {
        (1..=required_attempts)
            .map(|attempt| {
                let draft = self
                    .attempt(attempt)
                    .ok_or(SessionError::IncompleteAttempt { attempt })?;
                let score = draft.score.ok_or(SessionError::IncompleteAttempt { attempt })?;
                let note = Some(draft.note.trim())
                    .filter(|note| !note.is_empty())
                    .map(str::to_string);
                Ok(Evaluation::new(
                    EvaluationKey::new(self.activity_id, self.instruction_id, attempt),
                    score,
                    note,
                ))
            })
            .collect()
    }

    pub(crate) fn mark_committed(&mut self) {
        for draft in &mut self.drafts {
            if draft.score.is_some() {
                draft.committed = true;
            }
        }
    }

    fn draft_mut(&mut self, attempt: u32) -> Result<&mut AttemptDraft, SessionError> {
        let required = self.required_attempts();
        usize::try_from(attempt)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| self.drafts.get_mut(idx))
            .ok_or(SessionError::AttemptOutOfRange { attempt, required })
    }
}
