#![forbid(unsafe_code)]

pub mod error;
pub mod sessions;

pub use clinic_core::Clock;

pub use error::SessionError;
pub use sessions::{
    ActivityProgress, AttemptBoard, AttemptDraft, CommitAndAdvance, CommitReport,
    CompletionValidator, EvaluationSessionService, EvaluationSynchronizer, FinalizationGate,
    ProgressCursor, SessionEvent, SessionLoader, SessionProgress, SessionState, StartOutcome,
    Transition,
};
