mod evaluation;
mod ids;
mod protocol;
mod session;

pub use evaluation::{Evaluation, EvaluationIndex, EvaluationKey, EvaluationValue, Score};
pub use ids::{ActivityId, CurriculumId, InstructionId, ParseIdError, PatientId, SessionId};
pub use protocol::{
    Activity, ActivityDraft, CurriculumEntryDraft, Instruction, InstructionDraft, ProtocolDraft,
    ProtocolError, ProtocolTree, ScaleError, ScaleLevel, ScoringScale,
};
pub use session::{Session, SessionStatus, SessionTarget, UnknownStatus};
