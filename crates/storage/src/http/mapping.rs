//! Wire shapes of the REST evaluation store and their conversion to domain
//! types. JSON is camelCase; protocol ordering travels as `ordem`.

use chrono::{DateTime, Utc};
use clinic_core::model::{
    ActivityDraft, ActivityId, CurriculumEntryDraft, CurriculumId, Evaluation, EvaluationKey,
    InstructionDraft, InstructionId, PatientId, ProtocolDraft, ScaleLevel, Score, Session,
    SessionId, SessionStatus, SessionTarget,
};
use serde::{Deserialize, Serialize};

use crate::repository::{EvaluationUpsert, SessionBundle, StartedSession, StorageError};

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionDto {
    id: SessionId,
    patient_id: PatientId,
    #[serde(default)]
    curriculum_id: Option<CurriculumId>,
    #[serde(default)]
    activity_id: Option<ActivityId>,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl SessionDto {
    pub(crate) fn into_session(self) -> Result<Session, StorageError> {
        let target = match (self.curriculum_id, self.activity_id) {
            (Some(id), None) => SessionTarget::Curriculum(id),
            (None, Some(id)) => SessionTarget::Activity(id),
            _ => {
                return Err(StorageError::Serialization(format!(
                    "session {} must reference exactly one of curriculumId/activityId",
                    self.id
                )));
            }
        };
        Ok(Session {
            id: self.id,
            patient_id: self.patient_id,
            target,
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScaleLevelDto {
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstructionDto {
    id: InstructionId,
    ordem: u32,
    text: String,
    #[serde(default)]
    guidance: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ActivityDto {
    id: ActivityId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    instructions: Vec<InstructionDto>,
    #[serde(default)]
    scoring_scale: Option<Vec<ScaleLevelDto>>,
    #[serde(default)]
    target_attempts: Option<u32>,
}

impl From<ActivityDto> for ActivityDraft {
    fn from(dto: ActivityDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            instructions: dto
                .instructions
                .into_iter()
                .map(|instruction| InstructionDraft {
                    id: instruction.id,
                    order: instruction.ordem,
                    text: instruction.text,
                    guidance: instruction.guidance,
                })
                .collect(),
            scoring_scale: dto.scoring_scale.map(|levels| {
                levels
                    .into_iter()
                    .map(|level| ScaleLevel::new(level.label))
                    .collect()
            }),
            target_attempts: dto.target_attempts,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurriculumActivityDto {
    ordem: u32,
    activity: ActivityDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProtocolDto {
    #[serde(default)]
    activities: Vec<CurriculumActivityDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EvaluationDto {
    activity_id: ActivityId,
    instruction_id: InstructionId,
    attempt: u32,
    score: Score,
    #[serde(default)]
    note: Option<String>,
}

impl From<EvaluationDto> for Evaluation {
    fn from(dto: EvaluationDto) -> Self {
        Evaluation::new(
            EvaluationKey::new(dto.activity_id, dto.instruction_id, dto.attempt),
            dto.score,
            dto.note,
        )
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionBundleDto {
    session: SessionDto,
    protocol: ProtocolDto,
    #[serde(default)]
    evaluations: Vec<EvaluationDto>,
}

impl SessionBundleDto {
    pub(crate) fn into_bundle(self) -> Result<SessionBundle, StorageError> {
        Ok(SessionBundle {
            session: self.session.into_session()?,
            protocol: ProtocolDraft {
                entries: self
                    .protocol
                    .activities
                    .into_iter()
                    .map(|entry| CurriculumEntryDraft {
                        order: entry.ordem,
                        activity: entry.activity.into(),
                    })
                    .collect(),
            },
            evaluations: self.evaluations.into_iter().map(Evaluation::from).collect(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartRequestDto {
    patient_id: PatientId,
    #[serde(skip_serializing_if = "Option::is_none")]
    curriculum_id: Option<CurriculumId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    activity_id: Option<ActivityId>,
}

impl StartRequestDto {
    pub(crate) fn new(patient_id: PatientId, target: SessionTarget) -> Self {
        let (curriculum_id, activity_id) = match target {
            SessionTarget::Curriculum(id) => (Some(id), None),
            SessionTarget::Activity(id) => (None, Some(id)),
        };
        Self {
            patient_id,
            curriculum_id,
            activity_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartResponseDto {
    data: SessionDto,
    #[serde(default)]
    existing: bool,
    #[serde(default)]
    message: Option<String>,
}

impl StartResponseDto {
    pub(crate) fn into_started(self) -> Result<StartedSession, StorageError> {
        Ok(StartedSession {
            session: self.data.into_session()?,
            existing: self.existing,
            message: self.message,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EvaluateRequestDto<'a> {
    session_id: SessionId,
    activity_id: ActivityId,
    instruction_id: InstructionId,
    attempt: u32,
    score: Score,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

impl<'a> From<&'a EvaluationUpsert> for EvaluateRequestDto<'a> {
    fn from(upsert: &'a EvaluationUpsert) -> Self {
        let key = upsert.evaluation.key;
        Self {
            session_id: upsert.session_id,
            activity_id: key.activity_id,
            instruction_id: key.instruction_id,
            attempt: key.attempt,
            score: upsert.evaluation.score,
            note: upsert.evaluation.note.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FinalizeRequestDto {
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
struct RejectionDto {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Human-readable reason from a rejection body, falling back to the raw text.
pub(crate) fn rejection_message(body: &str) -> String {
    serde_json::from_str::<RejectionDto>(body)
        .ok()
        .and_then(|dto| dto.message.or(dto.error))
        .unwrap_or_else(|| body.trim().to_string())
}
