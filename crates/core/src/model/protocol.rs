use std::collections::HashSet;
use thiserror::Error;

use crate::model::evaluation::{EvaluationKey, Score};
use crate::model::ids::{ActivityId, InstructionId};
use crate::model::session::SessionTarget;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScaleError {
    #[error("scoring scale must have at least one level")]
    Empty,
}

/// Reasons a raw protocol cannot be turned into a `ProtocolTree`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("protocol has no activities")]
    NoActivities,

    #[error("activity {0} has no instructions")]
    EmptyActivity(ActivityId),

    #[error("activity {0} requires zero attempts")]
    ZeroTargetAttempts(ActivityId),

    #[error("activity {activity} has an invalid scoring scale")]
    InvalidScale {
        activity: ActivityId,
        #[source]
        source: ScaleError,
    },

    #[error("activity {0} appears more than once")]
    DuplicateActivity(ActivityId),

    #[error("instruction {instruction} appears more than once in activity {activity}")]
    DuplicateInstruction {
        activity: ActivityId,
        instruction: InstructionId,
    },

    #[error("single-activity session for {expected} received {found} activities")]
    TargetMismatch { expected: ActivityId, found: usize },
}

//
// ─── SCORING SCALE ─────────────────────────────────────────────────────────────
//

/// One labeled level of a scoring scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleLevel {
    pub label: String,
}

impl ScaleLevel {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Ordered, non-empty list of levels. A `Score` is an index into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringScale {
    levels: Vec<ScaleLevel>,
}

impl ScoringScale {
    /// Number of levels in the fallback scale used when an activity has none.
    pub const DEFAULT_LEVELS: u32 = 5;

    /// # Errors
    ///
    /// Returns `ScaleError::Empty` when `levels` is empty.
    pub fn new(levels: Vec<ScaleLevel>) -> Result<Self, ScaleError> {
        if levels.is_empty() {
            return Err(ScaleError::Empty);
        }
        Ok(Self { levels })
    }

    /// The fixed five-level scale, labelled `0` through `4`.
    #[must_use]
    pub fn default_five_point() -> Self {
        Self {
            levels: (0..Self::DEFAULT_LEVELS)
                .map(|n| ScaleLevel::new(n.to_string()))
                .collect(),
        }
    }

    #[must_use]
    pub fn levels(&self) -> &[ScaleLevel] {
        &self.levels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[must_use]
    pub fn contains(&self, score: Score) -> bool {
        usize::try_from(score.value()).is_ok_and(|idx| idx < self.levels.len())
    }

    #[must_use]
    pub fn label(&self, score: Score) -> Option<&str> {
        let idx = usize::try_from(score.value()).ok()?;
        self.levels.get(idx).map(|level| level.label.as_str())
    }
}

//
// ─── RAW PROTOCOL ──────────────────────────────────────────────────────────────
//

/// Instruction as delivered by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionDraft {
    pub id: InstructionId,
    pub order: u32,
    pub text: String,
    pub guidance: Option<String>,
}

/// Activity as delivered by the store, before defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityDraft {
    pub id: ActivityId,
    pub name: String,
    pub instructions: Vec<InstructionDraft>,
    pub scoring_scale: Option<Vec<ScaleLevel>>,
    pub target_attempts: Option<u32>,
}

/// One ordered slot of a curriculum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurriculumEntryDraft {
    pub order: u32,
    pub activity: ActivityDraft,
}

/// Raw protocol: a single-activity session carries exactly one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolDraft {
    pub entries: Vec<CurriculumEntryDraft>,
}

//
// ─── RESOLVED PROTOCOL ─────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub id: InstructionId,
    pub order: u32,
    pub text: String,
    pub guidance: Option<String>,
}

/// Activity with every default resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    id: ActivityId,
    name: String,
    instructions: Vec<Instruction>,
    scale: ScoringScale,
    target_attempts: u32,
}

impl Activity {
    fn resolve(draft: ActivityDraft) -> Result<Self, ProtocolError> {
        let target_attempts = match draft.target_attempts {
            None => 1,
            Some(0) => return Err(ProtocolError::ZeroTargetAttempts(draft.id)),
            Some(n) => n,
        };
        if draft.instructions.is_empty() {
            return Err(ProtocolError::EmptyActivity(draft.id));
        }

        // absent values take the default, explicit ones must be valid
        let scale = match draft.scoring_scale {
            None => ScoringScale::default_five_point(),
            Some(levels) => ScoringScale::new(levels).map_err(|source| {
                ProtocolError::InvalidScale {
                    activity: draft.id,
                    source,
                }
            })?,
        };

        let mut seen = HashSet::new();
        let mut instructions = Vec::with_capacity(draft.instructions.len());
        for raw in draft.instructions {
            if !seen.insert(raw.id) {
                return Err(ProtocolError::DuplicateInstruction {
                    activity: draft.id,
                    instruction: raw.id,
                });
            }
            instructions.push(Instruction {
                id: raw.id,
                order: raw.order,
                text: raw.text,
                guidance: raw.guidance,
            });
        }
        instructions.sort_by_key(|instruction| instruction.order);

        Ok(Self {
            id: draft.id,
            name: draft.name,
            instructions,
            scale,
            target_attempts,
        })
    }

    #[must_use]
    pub fn id(&self) -> ActivityId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[must_use]
    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    #[must_use]
    pub fn scale(&self) -> &ScoringScale {
        &self.scale
    }

    /// Attempts required per instruction.
    #[must_use]
    pub fn target_attempts(&self) -> u32 {
        self.target_attempts
    }

    #[must_use]
    pub fn has_instruction(&self, id: InstructionId) -> bool {
        self.instructions.iter().any(|instruction| instruction.id == id)
    }

    /// Number of (instruction, attempt) pairs this activity requires.
    #[must_use]
    pub fn required_count(&self) -> usize {
        self.instructions.len() * self.target_attempts as usize
    }

    /// Composite keys required for one instruction, attempt 1 first.
    pub fn keys_for(&self, instruction: InstructionId) -> impl Iterator<Item = EvaluationKey> + '_ {
        let activity = self.id;
        (1..=self.target_attempts).map(move |attempt| EvaluationKey::new(activity, instruction, attempt))
    }

    /// Every composite key this activity requires, in protocol order.
    pub fn required_keys(&self) -> impl Iterator<Item = EvaluationKey> + '_ {
        self.instructions
            .iter()
            .flat_map(move |instruction| self.keys_for(instruction.id))
    }
}

/// Fully resolved protocol tree administered by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolTree {
    target: SessionTarget,
    activities: Vec<Activity>,
}

impl ProtocolTree {
    /// Sort by `ordem`, apply defaults and check structural invariants.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` when the draft has no activities, an activity has
    /// no instructions or zero target attempts, ids repeat, or a single-activity
    /// target receives anything other than exactly that activity.
    pub fn resolve(target: SessionTarget, draft: ProtocolDraft) -> Result<Self, ProtocolError> {
        let mut entries = draft.entries;
        if entries.is_empty() {
            return Err(ProtocolError::NoActivities);
        }
        if let SessionTarget::Activity(expected) = target
            && (entries.len() != 1 || entries[0].activity.id != expected)
        {
            return Err(ProtocolError::TargetMismatch {
                expected,
                found: entries.len(),
            });
        }
        entries.sort_by_key(|entry| entry.order);

        let mut seen = HashSet::new();
        let mut activities = Vec::with_capacity(entries.len());
        for entry in entries {
            if !seen.insert(entry.activity.id) {
                return Err(ProtocolError::DuplicateActivity(entry.activity.id));
            }
            activities.push(Activity::resolve(entry.activity)?);
        }

        Ok(Self { target, activities })
    }

    #[must_use]
    pub fn target(&self) -> SessionTarget {
        self.target
    }

    #[must_use]
    pub fn is_curriculum(&self) -> bool {
        self.target.is_curriculum()
    }

    #[must_use]
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    #[must_use]
    pub fn activity(&self, index: usize) -> Option<&Activity> {
        self.activities.get(index)
    }

    #[must_use]
    pub fn activity_by_id(&self, id: ActivityId) -> Option<&Activity> {
        self.activities.iter().find(|activity| activity.id == id)
    }

    /// `Σ instructions × target_attempts` over every activity.
    #[must_use]
    pub fn total_required(&self) -> usize {
        self.activities.iter().map(Activity::required_count).sum()
    }

    /// Whether `key` names an (instruction, attempt) pair this protocol requires.
    #[must_use]
    pub fn requires(&self, key: &EvaluationKey) -> bool {
        self.activity_by_id(key.activity_id).is_some_and(|activity| {
            activity.has_instruction(key.instruction_id)
                && (1..=activity.target_attempts).contains(&key.attempt)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::CurriculumId;

    fn instruction(id: u64, order: u32) -> InstructionDraft {
        InstructionDraft {
            id: InstructionId::new(id),
            order,
            text: format!("instruction {id}"),
            guidance: None,
        }
    }

    fn activity(id: u64, instructions: Vec<InstructionDraft>, attempts: Option<u32>) -> ActivityDraft {
        ActivityDraft {
            id: ActivityId::new(id),
            name: format!("activity {id}"),
            instructions,
            scoring_scale: None,
            target_attempts: attempts,
        }
    }

    fn curriculum() -> SessionTarget {
        SessionTarget::Curriculum(CurriculumId::new(1))
    }

    #[test]
    fn resolve_sorts_and_applies_defaults() {
        let draft = ProtocolDraft {
            entries: vec![
                CurriculumEntryDraft {
                    order: 2,
                    activity: activity(20, vec![instruction(3, 1)], Some(3)),
                },
                CurriculumEntryDraft {
                    order: 1,
                    activity: activity(10, vec![instruction(2, 2), instruction(1, 1)], None),
                },
            ],
        };

        let tree = ProtocolTree::resolve(curriculum(), draft).unwrap();

        let first = tree.activity(0).unwrap();
        assert_eq!(first.id(), ActivityId::new(10));
        assert_eq!(first.target_attempts(), 1);
        assert_eq!(first.scale().len(), 5);
        assert_eq!(first.instructions()[0].id, InstructionId::new(1));
        assert_eq!(tree.total_required(), 2 + 3);
    }

    #[test]
    fn explicit_empty_scale_is_rejected_like_zero_attempts() {
        let mut raw = activity(1, vec![instruction(1, 1)], None);
        raw.scoring_scale = Some(Vec::new());
        let err = Activity::resolve(raw).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidScale {
                activity: ActivityId::new(1),
                source: ScaleError::Empty,
            }
        );

        let missing = Activity::resolve(activity(2, vec![instruction(1, 1)], None)).unwrap();
        assert_eq!(missing.scale(), &ScoringScale::default_five_point());
    }

    #[test]
    fn explicit_scale_is_kept() {
        let mut raw = activity(1, vec![instruction(1, 1)], None);
        raw.scoring_scale = Some(vec![ScaleLevel::new("independent"), ScaleLevel::new("prompted")]);
        let resolved = Activity::resolve(raw).unwrap();
        assert_eq!(resolved.scale().len(), 2);
        assert_eq!(resolved.scale().label(Score::new(1)), Some("prompted"));
        assert!(!resolved.scale().contains(Score::new(2)));
    }

    #[test]
    fn zero_attempts_and_empty_activities_are_rejected() {
        let err = Activity::resolve(activity(1, vec![instruction(1, 1)], Some(0))).unwrap_err();
        assert_eq!(err, ProtocolError::ZeroTargetAttempts(ActivityId::new(1)));

        let err = Activity::resolve(activity(2, Vec::new(), None)).unwrap_err();
        assert_eq!(err, ProtocolError::EmptyActivity(ActivityId::new(2)));

        let err = ProtocolTree::resolve(curriculum(), ProtocolDraft::default()).unwrap_err();
        assert_eq!(err, ProtocolError::NoActivities);
    }

    #[test]
    fn single_activity_target_must_match() {
        let draft = ProtocolDraft {
            entries: vec![CurriculumEntryDraft {
                order: 1,
                activity: activity(5, vec![instruction(1, 1)], None),
            }],
        };
        let err =
            ProtocolTree::resolve(SessionTarget::Activity(ActivityId::new(6)), draft.clone())
                .unwrap_err();
        assert!(matches!(err, ProtocolError::TargetMismatch { .. }));

        let tree = ProtocolTree::resolve(SessionTarget::Activity(ActivityId::new(5)), draft).unwrap();
        assert!(!tree.is_curriculum());
    }

    #[test]
    fn requires_checks_all_three_dimensions() {
        let draft = ProtocolDraft {
            entries: vec![CurriculumEntryDraft {
                order: 1,
                activity: activity(1, vec![instruction(7, 1)], Some(2)),
            }],
        };
        let tree = ProtocolTree::resolve(curriculum(), draft).unwrap();
        let a = ActivityId::new(1);
        let i = InstructionId::new(7);

        assert!(tree.requires(&EvaluationKey::new(a, i, 1)));
        assert!(tree.requires(&EvaluationKey::new(a, i, 2)));
        assert!(!tree.requires(&EvaluationKey::new(a, i, 3)));
        assert!(!tree.requires(&EvaluationKey::new(a, i, 0)));
        assert!(!tree.requires(&EvaluationKey::new(a, InstructionId::new(8), 1)));
        assert!(!tree.requires(&EvaluationKey::new(ActivityId::new(2), i, 1)));
    }
}
