//! Shared error types for the services crate.

use thiserror::Error;

use clinic_core::model::{ProtocolError, Score, SessionId, SessionStatus, SessionTarget};
use storage::repository::StorageError;

/// Errors emitted by the session evaluation engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Unknown id or another tenant's session. Not retryable.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// Start was requested for a curriculum or activity the store does not know.
    #[error("{0} not found")]
    TargetNotFound(SessionTarget),

    /// A required attempt has no draft score; nothing was submitted.
    #[error("attempt {attempt} has no score")]
    IncompleteAttempt { attempt: u32 },

    /// Transient store failure. Local state is untouched; the whole call can be
    /// repeated. `acknowledged` lists attempts the store accepted before
    /// `failed_attempt` failed.
    #[error("network error: {source}")]
    Network {
        failed_attempt: Option<u32>,
        acknowledged: Vec<u32>,
        #[source]
        source: StorageError,
    },

    #[error("session incomplete: {evaluated} of {total} evaluations recorded")]
    IncompleteSession { evaluated: usize, total: usize },

    /// The store refused a request the client considered valid.
    #[error("server rejected the request: {0}")]
    ServerValidation(String),

    /// Non-transient store failure such as an unreadable response or an
    /// unexpected client-side status. Repeating the call will not help.
    #[error("store error: {0}")]
    Store(#[source] StorageError),

    /// An instruction commit stopped on a non-transient failure. Attempts in
    /// `acknowledged` were stored before `failed_attempt` was refused; the
    /// local index is untouched.
    #[error("commit stopped at attempt {failed_attempt} ({} stored before it): {source}", .acknowledged.len())]
    CommitAborted {
        failed_attempt: u32,
        acknowledged: Vec<u32>,
        #[source]
        source: Box<SessionError>,
    },

    #[error("score {score} is outside the scale ({levels} levels)")]
    ScoreOutOfRange { score: Score, levels: usize },

    #[error("attempt {attempt} is outside 1..={required}")]
    AttemptOutOfRange { attempt: u32, required: u32 },

    #[error("current instruction still has {missing} uncommitted attempts")]
    PositionIncomplete { missing: usize },

    #[error("activity index {index} is out of range ({len} activities)")]
    ActivityOutOfRange { index: usize, len: usize },

    #[error("jumping between activities needs a curriculum session")]
    JumpUnavailable,

    #[error("session is {0}")]
    Closed(SessionStatus),

    #[error(transparent)]
    InvalidProtocol(#[from] ProtocolError),
}

impl SessionError {
    /// Map a store failure that is not tied to a specific attempt.
    pub(crate) fn from_storage(session_id: SessionId, source: StorageError) -> Self {
        match source {
            StorageError::NotFound => SessionError::SessionNotFound(session_id),
            StorageError::Rejected(message) => SessionError::ServerValidation(message),
            source if source.is_transient() => SessionError::Network {
                failed_attempt: None,
                acknowledged: Vec::new(),
                source,
            },
            source => SessionError::Store(source),
        }
    }

    /// Map the failure of one upsert inside an instruction commit. The
    /// failing attempt and the attempts stored before it are always kept.
    pub(crate) fn from_upsert(
        session_id: SessionId,
        source: StorageError,
        failed_attempt: u32,
        acknowledged: Vec<u32>,
    ) -> Self {
        if source.is_transient() {
            return SessionError::Network {
                failed_attempt: Some(failed_attempt),
                acknowledged,
                source,
            };
        }
        SessionError::CommitAborted {
            failed_attempt,
            acknowledged,
            source: Box::new(Self::from_storage(session_id, source)),
        }
    }

    /// Map a store failure of a start request.
    pub(crate) fn from_start(target: SessionTarget, source: StorageError) -> Self {
        match source {
            StorageError::NotFound => SessionError::TargetNotFound(target),
            StorageError::Rejected(message) => SessionError::ServerValidation(message),
            source if source.is_transient() => SessionError::Network {
                failed_attempt: None,
                acknowledged: Vec::new(),
                source,
            },
            source => SessionError::Store(source),
        }
    }

    /// Whether repeating the same call may succeed without user changes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Network { .. })
    }

    /// `(failed attempt, attempts stored before it)` when a commit stopped
    /// partway through.
    #[must_use]
    pub fn partial_commit(&self) -> Option<(u32, &[u32])> {
        match self {
            SessionError::Network {
                failed_attempt: Some(attempt),
                acknowledged,
                ..
            }
            | SessionError::CommitAborted {
                failed_attempt: attempt,
                acknowledged,
                ..
            } => Some((*attempt, acknowledged.as_slice())),
            _ => None,
        }
    }
}
