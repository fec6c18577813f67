use clinic_core::model::{Activity, ActivityId, EvaluationIndex, ProtocolTree};

use super::progress::{ActivityProgress, SessionProgress};

/// Read-only completeness checks over a protocol and an evaluation index.
///
/// Nothing is cached: every call recomputes from the index so results cannot go
/// stale after a commit.
#[derive(Debug, Clone, Copy)]
pub struct CompletionValidator<'a> {
    protocol: &'a ProtocolTree,
    index: &'a EvaluationIndex,
}

impl<'a> CompletionValidator<'a> {
    #[must_use]
    pub fn new(protocol: &'a ProtocolTree, index: &'a EvaluationIndex) -> Self {
        Self { protocol, index }
    }

    #[must_use]
    pub fn total_required(&self) -> usize {
        self.protocol.total_required()
    }

    /// Size of the evaluation index. The index only ever holds keys the
    /// protocol requires, so this is also the number of evaluated pairs.
    #[must_use]
    pub fn evaluated_count(&self) -> usize {
        self.index.len()
    }

    /// True iff every (instruction, attempt) pair of the activity is recorded.
    /// Unknown activities are never complete.
    #[must_use]
    pub fn is_activity_complete(&self, activity_id: ActivityId) -> bool {
        self.protocol
            .activity_by_id(activity_id)
            .is_some_and(|activity| self.evaluated_in(activity) == activity.required_count())
    }

    #[must_use]
    pub fn is_session_complete(&self) -> bool {
        self.protocol
            .activities()
            .iter()
            .all(|activity| self.is_activity_complete(activity.id()))
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> f64 {
        let total = self.total_required();
        if total == 0 {
            return 0.0;
        }
        self.evaluated_count() as f64 / total as f64 * 100.0
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.total_required();
        let evaluated = self.evaluated_count();
        SessionProgress {
            total,
            evaluated,
            remaining: total.saturating_sub(evaluated),
            percent: self.progress_percent(),
            is_complete: self.is_session_complete(),
        }
    }

    #[must_use]
    pub fn activity_progress(&self) -> Vec<ActivityProgress> {
        self.protocol
            .activities()
            .iter()
            .map(|activity| {
                let required = activity.required_count();
                let evaluated = self.evaluated_in(activity);
                ActivityProgress {
                    activity_id: activity.id(),
                    name: activity.name().to_string(),
                    required,
                    evaluated,
                    is_complete: evaluated == required,
                }
            })
            .collect()
    }

    fn evaluated_in(&self, activity: &Activity) -> usize {
        activity
            .required_keys()
            .filter(|key| self.index.contains(key))
            .count()
    }
}
