mod board;
mod completion;
mod cursor;
mod finalize;
mod loader;
mod progress;
mod state;
mod synchronizer;
mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use board::{AttemptBoard, AttemptDraft};
pub use completion::CompletionValidator;
pub use cursor::ProgressCursor;
pub use finalize::FinalizationGate;
pub use loader::{SessionLoader, StartOutcome};
pub use progress::{ActivityProgress, SessionProgress};
pub use state::{SessionEvent, SessionState, Transition};
pub use synchronizer::{CommitReport, EvaluationSynchronizer};
pub use workflow::{CommitAndAdvance, EvaluationSessionService};
