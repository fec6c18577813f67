//! Protocol fixtures shared by the session unit tests.

use clinic_core::model::{
    ActivityDraft, ActivityId, CurriculumEntryDraft, CurriculumId, Evaluation, EvaluationKey,
    InstructionDraft, InstructionId, PatientId, ProtocolDraft, ProtocolTree, Score, Session,
    SessionId, SessionTarget,
};
use clinic_core::time::fixed_now;

pub(crate) const A1: ActivityId = ActivityId::new(1);
pub(crate) const A2: ActivityId = ActivityId::new(2);
pub(crate) const I1: InstructionId = InstructionId::new(11);
pub(crate) const I2: InstructionId = InstructionId::new(21);
pub(crate) const CURRICULUM: CurriculumId = CurriculumId::new(100);
pub(crate) const SESSION: SessionId = SessionId::new(500);

pub(crate) fn instruction(id: InstructionId, order: u32) -> InstructionDraft {
    InstructionDraft {
        id,
        order,
        text: format!("instruction {id}"),
        guidance: None,
    }
}

pub(crate) fn activity(
    id: ActivityId,
    instructions: Vec<InstructionDraft>,
    attempts: u32,
) -> ActivityDraft {
    ActivityDraft {
        id,
        name: format!("activity {id}"),
        instructions,
        scoring_scale: None,
        target_attempts: Some(attempts),
    }
}

/// activity1: 1 instruction x 2 attempts, activity2: 1 instruction x 1 attempt.
pub(crate) fn scenario_draft() -> ProtocolDraft {
    ProtocolDraft {
        entries: vec![
            CurriculumEntryDraft {
                order: 1,
                activity: activity(A1, vec![instruction(I1, 1)], 2),
            },
            CurriculumEntryDraft {
                order: 2,
                activity: activity(A2, vec![instruction(I2, 1)], 1),
            },
        ],
    }
}

pub(crate) fn scenario_protocol() -> ProtocolTree {
    ProtocolTree::resolve(SessionTarget::Curriculum(CURRICULUM), scenario_draft())
        .expect("scenario protocol resolves")
}

/// Two activities with three and two instructions, one attempt each.
pub(crate) fn wide_protocol() -> ProtocolTree {
    let draft = ProtocolDraft {
        entries: vec![
            CurriculumEntryDraft {
                order: 1,
                activity: activity(
                    A1,
                    vec![
                        instruction(InstructionId::new(11), 1),
                        instruction(InstructionId::new(12), 2),
                        instruction(InstructionId::new(13), 3),
                    ],
                    1,
                ),
            },
            CurriculumEntryDraft {
                order: 2,
                activity: activity(
                    A2,
                    vec![
                        instruction(InstructionId::new(21), 1),
                        instruction(InstructionId::new(22), 2),
                    ],
                    1,
                ),
            },
        ],
    };
    ProtocolTree::resolve(SessionTarget::Curriculum(CURRICULUM), draft)
        .expect("wide protocol resolves")
}

pub(crate) fn evaluation(
    activity: ActivityId,
    instruction: InstructionId,
    attempt: u32,
    score: u32,
) -> Evaluation {
    Evaluation::new(
        EvaluationKey::new(activity, instruction, attempt),
        Score::new(score),
        None,
    )
}

pub(crate) fn session(target: SessionTarget) -> Session {
    Session::started(SESSION, PatientId::new(9), target, fixed_now())
}
