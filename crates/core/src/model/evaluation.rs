use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::model::ids::{ActivityId, InstructionId};

/// Index into an activity's scoring scale.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(u32);

impl Score {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Score({})", self.0)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one evaluation within a session.
///
/// Attempts are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EvaluationKey {
    pub activity_id: ActivityId,
    pub instruction_id: InstructionId,
    pub attempt: u32,
}

impl EvaluationKey {
    #[must_use]
    pub fn new(activity_id: ActivityId, instruction_id: InstructionId, attempt: u32) -> Self {
        Self {
            activity_id,
            instruction_id,
            attempt,
        }
    }
}

impl fmt::Display for EvaluationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "activity {} / instruction {} / attempt {}",
            self.activity_id, self.instruction_id, self.attempt
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationValue {
    pub score: Score,
    pub note: Option<String>,
}

/// A persisted score for one composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub key: EvaluationKey,
    pub score: Score,
    pub note: Option<String>,
}

impl Evaluation {
    #[must_use]
    pub fn new(key: EvaluationKey, score: Score, note: Option<String>) -> Self {
        Self { key, score, note }
    }

    #[must_use]
    pub fn value(&self) -> EvaluationValue {
        EvaluationValue {
            score: self.score,
            note: self.note.clone(),
        }
    }
}

/// Committed evaluations of a session, keyed by composite key.
///
/// Grow-only: `upsert` inserts or overwrites and there is no removal, so `len`
/// never decreases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationIndex {
    entries: BTreeMap<EvaluationKey, EvaluationValue>,
}

impl EvaluationIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns `true` when the key was new.
    pub fn upsert(&mut self, evaluation: Evaluation) -> bool {
        let value = evaluation.value();
        self.entries.insert(evaluation.key, value).is_none()
    }

    #[must_use]
    pub fn get(&self, key: &EvaluationKey) -> Option<&EvaluationValue> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &EvaluationKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EvaluationKey, &EvaluationValue)> {
        self.entries.iter()
    }
}

impl FromIterator<Evaluation> for EvaluationIndex {
    fn from_iter<T: IntoIterator<Item = Evaluation>>(iter: T) -> Self {
        let mut index = Self::new();
        for evaluation in iter {
            index.upsert(evaluation);
        }
        index
    }
}
