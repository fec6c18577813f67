use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clinic_core::model::{
    ActivityDraft, ActivityId, CurriculumEntryDraft, CurriculumId, InstructionDraft,
    InstructionId, PatientId, Score, Session, SessionId, SessionStatus, SessionTarget,
};
use clinic_core::time::fixed_clock;
use services::{EvaluationSessionService, SessionError, SessionState, Transition};
use storage::repository::{EvaluationUpsert, SessionBundle, StartedSession};
use storage::{EvaluationStore, InMemoryStore, StorageError};

const CURRICULUM: CurriculumId = CurriculumId::new(1);
const PATIENT: PatientId = PatientId::new(7);
const A1: ActivityId = ActivityId::new(10);
const A2: ActivityId = ActivityId::new(20);

fn activity(id: ActivityId, instruction: u64, attempts: u32) -> ActivityDraft {
    ActivityDraft {
        id,
        name: format!("activity {id}"),
        instructions: vec![InstructionDraft {
            id: InstructionId::new(instruction),
            order: 1,
            text: "point to the red card".to_string(),
            guidance: None,
        }],
        scoring_scale: None,
        target_attempts: Some(attempts),
    }
}

/// activity1: 1 instruction x 2 attempts, activity2: 1 instruction x 1 attempt.
fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new(fixed_clock());
    store
        .insert_curriculum(
            CURRICULUM,
            vec![
                CurriculumEntryDraft {
                    order: 1,
                    activity: activity(A1, 11, 2),
                },
                CurriculumEntryDraft {
                    order: 2,
                    activity: activity(A2, 21, 1),
                },
            ],
        )
        .unwrap();
    store
}

async fn open(service: &EvaluationSessionService) -> SessionState {
    let started = service
        .start_session(PATIENT, SessionTarget::Curriculum(CURRICULUM))
        .await
        .unwrap();
    service.open_session(started.session.id).await.unwrap()
}

fn score_all(state: &mut SessionState, scores: &[u32]) {
    for (attempt, score) in (1..).zip(scores) {
        state.set_score(attempt, Score::new(*score)).unwrap();
    }
}

/// Wraps the in-memory store: fails the upsert of one attempt number once,
/// and optionally refuses every finalize.
struct FlakyStore {
    inner: InMemoryStore,
    fail_attempt: u32,
    upsert_failure: Mutex<Option<StorageError>>,
    finalize_rejection: Option<String>,
}

impl FlakyStore {
    fn new(inner: InMemoryStore, fail_attempt: u32) -> Self {
        Self::failing_with(
            inner,
            fail_attempt,
            StorageError::Network("connection reset".to_string()),
        )
    }

    fn failing_with(inner: InMemoryStore, fail_attempt: u32, failure: StorageError) -> Self {
        Self {
            inner,
            fail_attempt,
            upsert_failure: Mutex::new(Some(failure)),
            finalize_rejection: None,
        }
    }

    fn rejecting_finalize(inner: InMemoryStore, message: &str) -> Self {
        Self {
            inner,
            fail_attempt: 0,
            upsert_failure: Mutex::new(None),
            finalize_rejection: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl EvaluationStore for FlakyStore {
    async fn fetch_session(&self, id: SessionId) -> Result<SessionBundle, StorageError> {
        self.inner.fetch_session(id).await
    }

    async fn start_session(
        &self,
        patient_id: PatientId,
        target: SessionTarget,
    ) -> Result<StartedSession, StorageError> {
        self.inner.start_session(patient_id, target).await
    }

    async fn upsert_evaluation(&self, upsert: &EvaluationUpsert) -> Result<(), StorageError> {
        if upsert.evaluation.key.attempt == self.fail_attempt {
            let failure = self.upsert_failure.lock().unwrap().take();
            if let Some(err) = failure {
                return Err(err);
            }
        }
        self.inner.upsert_evaluation(upsert).await
    }

    async fn finalize_session(&self, id: SessionId) -> Result<Session, StorageError> {
        if let Some(message) = &self.finalize_rejection {
            return Err(StorageError::Rejected(message.clone()));
        }
        self.inner.finalize_session(id).await
    }
}

#[tokio::test]
async fn scenario_full_curriculum_is_finalized() {
    let store = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(store.clone()));
    let mut state = open(&service).await;

    score_all(&mut state, &[3, 2]);
    let report = service.commit_current(&mut state).await.unwrap();
    assert_eq!(report.index_size, 2);
    assert!(state.completion().is_activity_complete(A1));
    assert!(!state.completion().is_session_complete());

    state.advance().unwrap();
    assert_eq!(state.current_activity().id(), A2);
    score_all(&mut state, &[4]);
    service.commit_current(&mut state).await.unwrap();
    assert_eq!(state.index().len(), 3);
    assert!(state.completion().is_session_complete());

    let session = service.finalize(&mut state).await.unwrap();
    assert_eq!(session.status, SessionStatus::Finalizada);
    assert_eq!(state.session().status, SessionStatus::Finalizada);
}

#[tokio::test]
async fn commit_with_missing_attempt_changes_nothing() {
    let store = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(store.clone()));
    let mut state = open(&service).await;

    score_all(&mut state, &[3]);
    let err = service.commit_current(&mut state).await.unwrap_err();

    assert!(matches!(err, SessionError::IncompleteAttempt { attempt: 2 }));
    assert!(state.index().is_empty());
    assert!(store.evaluations(state.session().id).unwrap().is_empty());
}

#[tokio::test]
async fn jump_discards_uncommitted_draft() {
    let store = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(store));
    let mut state = open(&service).await;

    score_all(&mut state, &[3]);
    let transition = state.jump_to_activity(1).unwrap();
    assert!(matches!(transition, Transition::Jumped { discarded: 1, .. }));

    state.jump_to_activity(0).unwrap();
    assert_eq!(state.board().first_missing(), Some(1));
    assert!(!state.completion().is_activity_complete(A1));
}

#[tokio::test]
async fn repeated_commit_keeps_one_evaluation_per_key() {
    let store = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(store.clone()));
    let mut state = open(&service).await;

    score_all(&mut state, &[3, 2]);
    let first = service.commit_current(&mut state).await.unwrap();
    let second = service.commit_current(&mut state).await.unwrap();

    assert_eq!(first.new_keys, 2);
    assert_eq!(second.new_keys, 0);
    assert_eq!(second.index_size, 2);
    assert_eq!(store.evaluations(state.session().id).unwrap().len(), 2);
}

#[tokio::test]
async fn index_never_shrinks_when_scores_are_revised() {
    let store = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(store));
    let mut state = open(&service).await;

    score_all(&mut state, &[3, 2]);
    service.commit_current(&mut state).await.unwrap();
    let before = state.index().len();

    state.clear_score(2).unwrap();
    assert!(service.commit_current(&mut state).await.is_err());
    assert_eq!(state.index().len(), before);

    state.set_score(2, Score::new(0)).unwrap();
    service.commit_current(&mut state).await.unwrap();
    assert_eq!(state.index().len(), before);
}

#[tokio::test]
async fn reload_resumes_progress_and_position() {
    let store = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(store));
    let mut state = open(&service).await;

    score_all(&mut state, &[1, 1]);
    service.commit_current(&mut state).await.unwrap();

    let reloaded = service.open_session(state.session().id).await.unwrap();
    assert!((reloaded.progress().percent - 2.0 / 3.0 * 100.0).abs() < 1e-9);
    assert_eq!(reloaded.current_activity().id(), A2);
}

#[tokio::test]
async fn start_twice_resumes_existing_session() {
    let store = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(store));
    let target = SessionTarget::Curriculum(CURRICULUM);

    let first = service.start_session(PATIENT, target).await.unwrap();
    let second = service.start_session(PATIENT, target).await.unwrap();

    assert!(!first.resumed);
    assert!(second.resumed);
    assert_eq!(first.session.id, second.session.id);
    assert!(second.message.is_some());
}

#[tokio::test]
async fn start_for_unknown_target_fails() {
    let service = EvaluationSessionService::new(Arc::new(seeded_store()));
    let target = SessionTarget::Activity(ActivityId::new(404));

    let err = service.start_session(PATIENT, target).await.unwrap_err();
    assert!(matches!(err, SessionError::TargetNotFound(t) if t == target));
}

#[tokio::test]
async fn finalize_is_refused_while_incomplete() {
    let store = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(store.clone()));
    let mut state = open(&service).await;

    score_all(&mut state, &[3, 2]);
    service.commit_current(&mut state).await.unwrap();

    let err = service.finalize(&mut state).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::IncompleteSession {
            evaluated: 2,
            total: 3
        }
    ));
    let reloaded = service.open_session(state.session().id).await.unwrap();
    assert_eq!(reloaded.session().status, SessionStatus::EmAndamento);
}

#[tokio::test]
async fn mid_loop_failure_reports_attempt_and_retry_succeeds() {
    let inner = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(FlakyStore::new(inner.clone(), 2)));
    let mut state = open(&service).await;

    score_all(&mut state, &[3, 2]);
    let err = service.commit_current(&mut state).await.unwrap_err();
    match &err {
        SessionError::Network {
            failed_attempt,
            acknowledged,
            ..
        } => {
            assert_eq!(*failed_attempt, Some(2));
            assert_eq!(acknowledged, &vec![1]);
        }
        other => panic!("expected network error, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert!(state.index().is_empty());
    assert_eq!(inner.evaluations(state.session().id).unwrap().len(), 1);

    let report = service.commit_current(&mut state).await.unwrap();
    assert_eq!(report.index_size, 2);
    assert_eq!(inner.evaluations(state.session().id).unwrap().len(), 2);
}

#[tokio::test]
async fn mid_loop_rejection_reports_stored_attempts() {
    let inner = seeded_store();
    let store = FlakyStore::failing_with(
        inner.clone(),
        2,
        StorageError::Rejected("attempt 2 rejected".to_string()),
    );
    let service = EvaluationSessionService::new(Arc::new(store));
    let mut state = open(&service).await;

    score_all(&mut state, &[3, 2]);
    let err = service.commit_current(&mut state).await.unwrap_err();

    assert_eq!(err.partial_commit(), Some((2, &[1][..])));
    match &err {
        SessionError::CommitAborted { source, .. } => assert!(matches!(
            source.as_ref(),
            SessionError::ServerValidation(message) if message == "attempt 2 rejected"
        )),
        other => panic!("expected aborted commit, got {other:?}"),
    }
    assert!(!err.is_retryable());
    assert!(state.index().is_empty());
    assert_eq!(inner.evaluations(state.session().id).unwrap().len(), 1);
}

#[tokio::test]
async fn finalize_rejected_by_server_keeps_session_open() {
    let inner = seeded_store();
    let store = FlakyStore::rejecting_finalize(inner, "evaluations out of date");
    let service = EvaluationSessionService::new(Arc::new(store));
    let mut state = open(&service).await;

    score_all(&mut state, &[3, 2]);
    service.commit_and_advance(&mut state).await.unwrap();
    score_all(&mut state, &[4]);
    service.commit_current(&mut state).await.unwrap();
    assert!(state.completion().is_session_complete());

    let err = service.finalize(&mut state).await.unwrap_err();
    assert!(matches!(
        &err,
        SessionError::ServerValidation(message) if message == "evaluations out of date"
    ));
    assert_eq!(state.session().status, SessionStatus::EmAndamento);
    assert!(state.session().finished_at.is_none());
}

#[tokio::test]
async fn cancelled_session_refuses_commit_and_finalize() {
    let store = seeded_store();
    let service = EvaluationSessionService::new(Arc::new(store.clone()));
    let state = open(&service).await;
    store.cancel_session(state.session().id).unwrap();

    let mut state = service.open_session(state.session().id).await.unwrap();
    assert!(matches!(
        state.set_score(1, Score::new(1)),
        Err(SessionError::Closed(SessionStatus::Cancelada))
    ));
    assert!(matches!(
        service.commit_current(&mut state).await,
        Err(SessionError::Closed(SessionStatus::Cancelada))
    ));
    assert!(matches!(
        service.finalize(&mut state).await,
        Err(SessionError::Closed(SessionStatus::Cancelada))
    ));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let service = EvaluationSessionService::new(Arc::new(seeded_store()));
    let err = service.open_session(SessionId::new(999)).await.unwrap_err();
    assert!(matches!(err, SessionError::SessionNotFound(id) if id == SessionId::new(999)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn commit_and_advance_moves_to_next_activity() {
    let service = EvaluationSessionService::new(Arc::new(seeded_store()));
    let mut state = open(&service).await;

    score_all(&mut state, &[4, 4]);
    let outcome = service.commit_and_advance(&mut state).await.unwrap();

    assert_eq!(outcome.report.committed, 2);
    assert!(matches!(outcome.transition, Transition::Moved { discarded: 0, .. }));
    assert_eq!(state.current_activity().id(), A2);
}
