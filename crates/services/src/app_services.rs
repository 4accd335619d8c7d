use std::sync::Arc;

use quiz_core::model::SessionSettings;
use storage::repository::{DraftRepository, Storage};
use tracing::info;

use crate::Clock;
use crate::error::AppServicesError;
use crate::remote_drafts::{HttpDraftStore, RemoteDraftConfig};
use crate::sessions::QuizSessionService;

/// Assembles the quiz session service and the settings every screen mounts with.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    sessions: Arc<QuizSessionService>,
    settings: SessionSettings,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// With a remote draft config, drafts go over HTTP while quizzes and attempts
    /// stay in the database.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or the HTTP client fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: SessionSettings,
        remote_drafts: Option<RemoteDraftConfig>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let mut sessions = QuizSessionService::from_storage(clock, &storage);
        if let Some(config) = remote_drafts {
            info!(base_url = %config.base_url, "drafts use the remote store");
            let drafts: Arc<dyn DraftRepository> = Arc::new(HttpDraftStore::new(config)?);
            sessions = sessions.with_drafts(drafts);
        }
        Ok(Self::assemble(storage, sessions, settings))
    }

    #[must_use]
    pub fn in_memory(clock: Clock, settings: SessionSettings) -> Self {
        let storage = Storage::in_memory();
        let sessions = QuizSessionService::from_storage(clock, &storage);
        Self::assemble(storage, sessions, settings)
    }

    fn assemble(storage: Storage, sessions: QuizSessionService, settings: SessionSettings) -> Self {
        Self {
            storage,
            sessions: Arc::new(sessions),
            settings,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<QuizSessionService> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.settings
    }
}
