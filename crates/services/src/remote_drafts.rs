use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use quiz_core::model::{AnswerMap, AttemptId};
use storage::repository::{DraftRepository, StorageError};

use crate::error::RemoteDraftError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct RemoteDraftConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl RemoteDraftConfig {
    /// Reads `QUIZ_DRAFT_URL` and the optional `QUIZ_DRAFT_API_KEY`.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("QUIZ_DRAFT_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_key = env::var("QUIZ_DRAFT_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        Some(Self { base_url, api_key })
    }

    fn draft_url(&self, attempt_id: AttemptId) -> String {
        format!(
            "{}/attempts/{attempt_id}/draft",
            self.base_url.trim_end_matches('/')
        )
    }
}

/// Draft persistence over HTTP: `PUT`/`GET {base}/attempts/{id}/draft`.
#[derive(Clone)]
pub struct HttpDraftStore {
    client: Client,
    config: RemoteDraftConfig,
}

impl HttpDraftStore {
    /// # Errors
    ///
    /// Returns `RemoteDraftError::Http` if the HTTP client cannot be built.
    pub fn new(config: RemoteDraftConfig) -> Result<Self, RemoteDraftError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    fn request(&self, method: reqwest::Method, attempt_id: AttemptId) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.config.draft_url(attempt_id));
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[derive(Debug, Serialize)]
struct DraftBody<'a> {
    answers: &'a AnswerMap,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    answers: AnswerMap,
}

#[async_trait]
impl DraftRepository for HttpDraftStore {
    async fn save_draft_answers(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
    ) -> Result<(), StorageError> {
        let response = self
            .request(reqwest::Method::PUT, attempt_id)
            .json(&DraftBody { answers })
            .send()
            .await
            .map_err(RemoteDraftError::from)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound),
            StatusCode::CONFLICT => Err(StorageError::AlreadySubmitted { attempt_id }),
            status => Err(RemoteDraftError::HttpStatus(status).into()),
        }
    }

    async fn load_draft_answers(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Option<AnswerMap>, StorageError> {
        let response = self
            .request(reqwest::Method::GET, attempt_id)
            .send()
            .await
            .map_err(RemoteDraftError::from)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: DraftResponse = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(body.answers))
            }
            status => Err(RemoteDraftError::HttpStatus(status).into()),
        }
    }
}
