//! Shared application state and router construction.
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::api::handlers;
use crate::backend::ImageBackend;
use crate::catalog::PromptCatalog;
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::job::JobReport;

/// Builds a backend bound to one job's credential.
pub type BackendFactory = Arc<dyn Fn(String) -> Arc<dyn ImageBackend> + Send + Sync>;

pub struct AppState {
    pub config: Config,
    pub catalog: Arc<PromptCatalog>,
    pub backend_factory: BackendFactory,
    pub packs: RwLock<PackStore>,
}

impl AppState {
    pub fn new(config: Config, catalog: PromptCatalog, backend_factory: BackendFactory) -> Self {
        let packs = RwLock::new(PackStore::new(config.max_stored_packs));
        AppState { config, catalog: Arc::new(catalog), backend_factory, packs }
    }

    /// Factory producing Gemini clients over one shared transport.
    pub fn gemini_factory(http: reqwest::Client, config: &Config) -> BackendFactory {
        let base_url = config.gemini_api_url.clone();
        let model = config.gemini_model.clone();
        Arc::new(move |api_key: String| {
            let client = GeminiClient::new(http.clone(), &base_url, &model, api_key);
            Arc::new(client) as Arc<dyn ImageBackend>
        })
    }
}

/// Finished reports kept for archive downloads, oldest evicted first.
#[derive(Debug, Default)]
pub struct PackStore {
    capacity: usize,
    reports: VecDeque<JobReport>,
}

impl PackStore {
    pub fn new(capacity: usize) -> Self {
        PackStore { capacity, reports: VecDeque::new() }
    }

    pub fn insert(&mut self, report: JobReport) {
        if self.capacity == 0 {
            return;
        }
        while self.reports.len() >= self.capacity {
            if let Some(evicted) = self.reports.pop_front() {
                tracing::debug!("Evicting stored pack {}", evicted.job_id);
            }
        }
        self.reports.push_back(report);
    }

    pub fn get(&self, job_id: &Uuid) -> Option<&JobReport> {
        self.reports.iter().find(|r| &r.job_id == job_id)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    // Reference images travel base64-encoded inside the JSON body
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);
    Router::new()
        .route("/", get(handlers::root))
        .route("/catalog", get(handlers::catalog))
        .route("/packs", post(handlers::create_pack).layer(upload_limit))
        .route("/packs/:id", get(handlers::get_pack))
        .route("/packs/:id/archive", get(handlers::pack_archive))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> JobReport {
        JobReport { job_id: Uuid::new_v4(), total_prompts: 1, images: vec![] }
    }

    #[test]
    fn store_evicts_oldest() {
        let mut store = PackStore::new(2);
        let first = report();
        let first_id = first.job_id;
        store.insert(first);
        store.insert(report());
        let third = report();
        let third_id = third.job_id;
        store.insert(third);
        assert_eq!(store.len(), 2);
        assert!(store.get(&first_id).is_none());
        assert!(store.get(&third_id).is_some());
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut store = PackStore::new(0);
        store.insert(report());
        assert!(store.is_empty());
    }
}
