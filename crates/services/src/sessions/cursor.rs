use std::fmt;

use clinic_core::model::{EvaluationIndex, ProtocolTree};

/// Position inside a protocol: (activity index, instruction index).
///
/// Never persisted. Constructors only produce positions that exist in the
/// protocol they were given, and a resolved protocol never has an empty
/// activity list or an activity without instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressCursor {
    activity_index: usize,
    instruction_index: usize,
}

impl ProgressCursor {
    /// First instruction of the first activity.
    #[must_use]
    pub fn start() -> Self {
        Self::default()
    }

    /// Last instruction of the last activity.
    #[must_use]
    pub fn terminal(protocol: &ProtocolTree) -> Self {
        let activity_index = protocol.activities().len().saturating_sub(1);
        Self {
            activity_index,
            instruction_index: last_instruction(protocol, activity_index),
        }
    }

    /// Where an interrupted session picks up: the first instruction, in
    /// protocol order, with an attempt missing from `index`. Terminal when
    /// everything is recorded.
    #[must_use]
    pub fn resume(protocol: &ProtocolTree, index: &EvaluationIndex) -> Self {
        for (activity_index, activity) in protocol.activities().iter().enumerate() {
            for (instruction_index, instruction) in activity.instructions().iter().enumerate() {
                if activity.keys_for(instruction.id).any(|key| !index.contains(&key)) {
                    return Self {
                        activity_index,
                        instruction_index,
                    };
                }
            }
        }
        Self::terminal(protocol)
    }

    /// First instruction of the activity at `activity_index`, if it exists.
    #[must_use]
    pub fn at_activity(protocol: &ProtocolTree, activity_index: usize) -> Option<Self> {
        protocol.activity(activity_index).map(|_| Self {
            activity_index,
            instruction_index: 0,
        })
    }

    #[must_use]
    pub fn activity_index(&self) -> usize {
        self.activity_index
    }

    #[must_use]
    pub fn instruction_index(&self) -> usize {
        self.instruction_index
    }

    #[must_use]
    pub fn is_terminal(&self, protocol: &ProtocolTree) -> bool {
        *self == Self::terminal(protocol)
    }

    /// Next instruction in the activity, else the next activity's first
    /// instruction, else unchanged.
    #[must_use]
    pub fn next(&self, protocol: &ProtocolTree) -> Self {
        if self.instruction_index < last_instruction(protocol, self.activity_index) {
            return Self {
                activity_index: self.activity_index,
                instruction_index: self.instruction_index + 1,
            };
        }
        Self::at_activity(protocol, self.activity_index + 1).unwrap_or(*self)
    }

    /// Previous instruction in the activity, else the previous activity's
    /// *last* instruction, else unchanged.
    #[must_use]
    pub fn previous(&self, protocol: &ProtocolTree) -> Self {
        if self.instruction_index > 0 {
            return Self {
                activity_index: self.activity_index,
                instruction_index: self.instruction_index - 1,
            };
        }
        match self.activity_index.checked_sub(1) {
            Some(activity_index) => Self {
                activity_index,
                instruction_index: last_instruction(protocol, activity_index),
            },
            None => *self,
        }
    }
}

impl fmt::Display for ProgressCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "activity #{} / instruction #{}",
            self.activity_index + 1,
            self.instruction_index + 1
        )
    }
}

fn last_instruction(protocol: &ProtocolTree, activity_index: usize) -> usize {
    protocol
        .activity(activity_index)
        .map_or(0, |activity| activity.instructions().len().saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::test_support::{evaluation, scenario_protocol, wide_protocol, A1, A2, I1, I2};
    use clinic_core::model::InstructionId;

    fn at(activity_index: usize, instruction_index: usize) -> ProgressCursor {
        ProgressCursor {
            activity_index,
            instruction_index,
        }
    }

    #[test]
    fn next_walks_instructions_then_activities() {
        let protocol = wide_protocol();
        let mut cursor = ProgressCursor::start();
        let mut visited = vec![cursor];
        loop {
            let next = cursor.next(&protocol);
            if next == cursor {
                break;
            }
            visited.push(next);
            cursor = next;
        }
        assert_eq!(visited, vec![at(0, 0), at(0, 1), at(0, 2), at(1, 0), at(1, 1)]);
        assert!(cursor.is_terminal(&protocol));
    }

    #[test]
    fn previous_crosses_to_last_instruction_of_previous_activity() {
        let protocol = wide_protocol();
        assert_eq!(at(1, 0).previous(&protocol), at(0, 2));
        assert_eq!(at(1, 1).previous(&protocol), at(1, 0));
        assert_eq!(at(0, 0).previous(&protocol), at(0, 0));
    }

    #[test]
    fn at_activity_resets_instruction_index() {
        let protocol = wide_protocol();
        assert_eq!(ProgressCursor::at_activity(&protocol, 1), Some(at(1, 0)));
        assert_eq!(ProgressCursor::at_activity(&protocol, 2), None);
    }

    #[test]
    fn resume_points_at_first_incomplete_instruction() {
        let protocol = wide_protocol();
        let index = [
            evaluation(A1, InstructionId::new(11), 1, 0),
            evaluation(A1, InstructionId::new(13), 1, 0),
        ]
        .into_iter()
        .collect();
        assert_eq!(ProgressCursor::resume(&protocol, &index), at(0, 1));
    }

    #[test]
    fn resume_with_partial_attempts_stays_on_instruction() {
        let protocol = scenario_protocol();
        let index = [evaluation(A1, I1, 1, 3)].into_iter().collect();
        assert_eq!(ProgressCursor::resume(&protocol, &index), at(0, 0));
    }

    #[test]
    fn resume_of_complete_session_is_terminal() {
        let protocol = scenario_protocol();
        let index = [
            evaluation(A1, I1, 1, 3),
            evaluation(A1, I1, 2, 3),
            evaluation(A2, I2, 1, 3),
        ]
        .into_iter()
        .collect();
        let cursor = ProgressCursor::resume(&protocol, &index);
        assert!(cursor.is_terminal(&protocol));
        assert_eq!(cursor, at(1, 0));
    }
}
