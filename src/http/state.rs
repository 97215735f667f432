use std::sync::Arc;

use crate::collaborators::{Auth, PathMapper, RecordingSource, ResumeStore};
use crate::config::Config;
use crate::manager::Manager;
use crate::metrics::Metrics;

/// Shared application state, handed to every handler via `State<AppState>`.
/// Grounded in the teacher's `engine::state` pattern of one `Arc`-wrapped
/// struct threaded through the whole surface rather than many globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: Arc<Manager>,
    pub metrics: Arc<Metrics>,
    pub http_client: reqwest::Client,
    pub recording_source: Arc<dyn RecordingSource>,
    pub path_mapper: Arc<dyn PathMapper>,
    pub resume_store: Arc<dyn ResumeStore>,
    pub auth: Arc<dyn Auth>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        recording_source: Arc<dyn RecordingSource>,
        path_mapper: Arc<dyn PathMapper>,
        resume_store: Arc<dyn ResumeStore>,
        auth: Arc<dyn Auth>,
    ) -> Self {
        let max_concurrent = config.vod_max_concurrent;
        Self {
            config,
            manager: Arc::new(Manager::new(max_concurrent)),
            metrics: Arc::new(Metrics::new()),
            http_client: reqwest::Client::new(),
            recording_source,
            path_mapper,
            resume_store,
            auth,
        }
    }
}
