use std::env;
use std::time::Duration;

use async_trait::async_trait;
use clinic_core::model::{PatientId, Session, SessionId, SessionTarget};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::repository::{
    EvaluationStore, EvaluationUpsert, SessionBundle, StartedSession, StorageError,
};

mod mapping;

use mapping::{
    Envelope, EvaluateRequestDto, FinalizeRequestDto, SessionBundleDto, SessionDto,
    StartRequestDto, StartResponseDto,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3333";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Where the evaluation store lives and how to authenticate against it.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Reads `CLINIC_API_URL`, `CLINIC_API_TOKEN` and `CLINIC_API_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = env::var("CLINIC_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let token = env::var("CLINIC_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let timeout = env::var("CLINIC_API_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);
        Self {
            base_url,
            token,
            timeout,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpInitError {
    #[error(transparent)]
    Client(#[from] reqwest::Error),
}

/// `EvaluationStore` backed by the clinic's REST API.
#[derive(Clone)]
pub struct HttpEvaluationStore {
    client: Client,
    config: ApiConfig,
}

impl HttpEvaluationStore {
    /// # Errors
    ///
    /// Returns `HttpInitError` if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, HttpInitError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let response = self.authorize(request).send().await.map_err(transport)?;
        check_status(response).await
    }
}

fn transport(e: reqwest::Error) -> StorageError {
    if e.is_decode() {
        StorageError::Serialization(e.to_string())
    } else {
        StorageError::Network(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Err(StorageError::NotFound),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Rejected(mapping::rejection_message(&body)))
        }
        other => Err(StorageError::Status(other.as_u16())),
    }
}

#[async_trait]
impl EvaluationStore for HttpEvaluationStore {
    async fn fetch_session(&self, id: SessionId) -> Result<SessionBundle, StorageError> {
        let url = self.config.url(&format!("sessions/{id}"));
        debug!(%url, "fetching session");
        let body: Envelope<SessionBundleDto> = self
            .send(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(transport)?;
        body.data.into_bundle()
    }

    async fn start_session(
        &self,
        patient_id: PatientId,
        target: SessionTarget,
    ) -> Result<StartedSession, StorageError> {
        let url = self.config.url("sessions/start");
        debug!(%url, %patient_id, %target, "starting session");
        let payload = StartRequestDto::new(patient_id, target);
        let body: StartResponseDto = self
            .send(self.client.post(url).json(&payload))
            .await?
            .json()
            .await
            .map_err(transport)?;
        body.into_started()
    }

    async fn upsert_evaluation(&self, upsert: &EvaluationUpsert) -> Result<(), StorageError> {
        let url = self.config.url("evaluate");
        let payload = EvaluateRequestDto::from(upsert);
        self.send(self.client.post(url).json(&payload)).await?;
        Ok(())
    }

    async fn finalize_session(&self, id: SessionId) -> Result<Session, StorageError> {
        let url = self.config.url("finalize");
        debug!(%url, session_id = %id, "finalizing session");
        let payload = FinalizeRequestDto { session_id: id };
        let body: Envelope<SessionDto> = self
            .send(self.client.post(url).json(&payload))
            .await?
            .json()
            .await
            .map_err(transport)?;
        body.data.into_session()
    }
}
