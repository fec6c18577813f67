use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{ActivityId, CurriculumId, PatientId, SessionId};

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown session status: {0}")]
pub struct UnknownStatus(pub String);

/// Lifecycle of a session.
///
/// `EmAndamento` is the only non-terminal state. `Finalizada` is reached through
/// finalization; `Cancelada` is set by an administrative actor outside the
/// evaluation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "EM_ANDAMENTO")]
    EmAndamento,
    #[serde(rename = "FINALIZADA")]
    Finalizada,
    #[serde(rename = "CANCELADA")]
    Cancelada,
}

impl SessionStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::EmAndamento => "EM_ANDAMENTO",
            SessionStatus::Finalizada => "FINALIZADA",
            SessionStatus::Cancelada => "CANCELADA",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::EmAndamento)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EM_ANDAMENTO" => Ok(Self::EmAndamento),
            "FINALIZADA" => Ok(Self::Finalizada),
            "CANCELADA" => Ok(Self::Cancelada),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

//
// ─── TARGET ────────────────────────────────────────────────────────────────────
//

/// What a session administers: a whole curriculum or a single activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionTarget {
    Curriculum(CurriculumId),
    Activity(ActivityId),
}

impl SessionTarget {
    #[must_use]
    pub fn is_curriculum(&self) -> bool {
        matches!(self, SessionTarget::Curriculum(_))
    }
}

impl fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionTarget::Curriculum(id) => write!(f, "curriculum {id}"),
            SessionTarget::Activity(id) => write!(f, "activity {id}"),
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Session header as held by the evaluation store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub patient_id: PatientId,
    pub target: SessionTarget,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A freshly started session.
    #[must_use]
    pub fn started(
        id: SessionId,
        patient_id: PatientId,
        target: SessionTarget,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            patient_id,
            target,
            status: SessionStatus::EmAndamento,
            started_at,
            finished_at: None,
        }
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == SessionStatus::EmAndamento
    }
}
