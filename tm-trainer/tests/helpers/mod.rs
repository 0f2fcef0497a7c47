//! Test Helper Utilities
//!
//! Scripted provider fakes and an in-memory service harness for tm-trainer.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tm_common::events::{EventBus, ProgressEvent};
use tm_trainer::models::Hyperparameters;
use tm_trainer::services::{
    CompletionPoller, Domain, EnhancementAdapter, ImageEntry, ImageStore, IngestionSettings,
    IterationInfo, OrchestratorSettings, PollSettings, Prediction, PredictionProvider,
    ProgressReceiver, ProjectInfo, ProviderError, TagInfo, TrainingProvider,
};
use tm_trainer::utils::RetryPolicy;
use tm_trainer::{AppState, Providers};

/// Provider operations a failure can be scripted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListDomains,
    CreateProject,
    CreateTag,
    Upload,
    Train,
    GetIteration,
    Publish,
    Classify,
}

#[derive(Default)]
struct FakeState {
    next_id: usize,
    calls: Vec<Op>,
    /// Per-op script; `None` lets one call through
    failures: HashMap<Op, VecDeque<Option<ProviderError>>>,
    statuses: VecDeque<String>,
    tags: HashMap<String, Vec<TagInfo>>,
    batches: Vec<Vec<ImageEntry>>,
    trained_tags: Vec<Vec<String>>,
    published: Vec<(String, String, String)>,
    predictions: Vec<Prediction>,
    classified: Vec<(String, String, Vec<u8>)>,
}

/// In-memory training and prediction provider
///
/// Iteration statuses are served from a script; once the script runs out
/// every query reports `Completed`.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
    /// Delay inside `upload_images`, for cancellation tests
    upload_delay: Mutex<Option<Duration>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_statuses(&self, statuses: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.statuses = statuses.iter().map(|s| s.to_string()).collect();
    }

    /// Fail the next call of `op` with `err`; queued failures apply in order
    pub fn fail_next(&self, op: Op, err: ProviderError) {
        let mut state = self.state.lock().unwrap();
        state.failures.entry(op).or_default().push_back(Some(err));
    }

    /// Let the next scripted call of `op` succeed before later failures apply
    pub fn pass_next(&self, op: Op) {
        let mut state = self.state.lock().unwrap();
        state.failures.entry(op).or_default().push_back(None);
    }

    pub fn set_predictions(&self, predictions: Vec<Prediction>) {
        self.state.lock().unwrap().predictions = predictions;
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Op> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, op: Op) -> usize {
        self.calls().into_iter().filter(|c| *c == op).count()
    }

    pub fn batches(&self) -> Vec<Vec<ImageEntry>> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn trained_tags(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().trained_tags.clone()
    }

    pub fn published(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn classified(&self) -> Vec<(String, String, Vec<u8>)> {
        self.state.lock().unwrap().classified.clone()
    }

    pub fn tags_for(&self, project_id: &str) -> Vec<TagInfo> {
        let state = self.state.lock().unwrap();
        state.tags.get(project_id).cloned().unwrap_or_default()
    }

    fn enter(&self, op: Op) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op);
        match state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }
}

#[async_trait]
impl TrainingProvider for FakeProvider {
    async fn list_domains(&self) -> Result<Vec<Domain>, ProviderError> {
        self.enter(Op::ListDomains)?;
        Ok(vec![
            Domain {
                id: "dom-detect".into(),
                name: "General".into(),
                kind: "ObjectDetection".into(),
            },
            Domain {
                id: "dom-general".into(),
                name: "General".into(),
                kind: "Classification".into(),
            },
            Domain {
                id: "dom-food".into(),
                name: "Food".into(),
                kind: "Classification".into(),
            },
        ])
    }

    async fn create_project(
        &self,
        name: &str,
        _domain_id: &str,
    ) -> Result<ProjectInfo, ProviderError> {
        self.enter(Op::CreateProject)?;
        Ok(ProjectInfo {
            id: self.next_id("project"),
            name: name.to_string(),
        })
    }

    async fn list_tags(&self, project_id: &str) -> Result<Vec<TagInfo>, ProviderError> {
        Ok(self.tags_for(project_id))
    }

    async fn create_tag(&self, project_id: &str, name: &str) -> Result<TagInfo, ProviderError> {
        self.enter(Op::CreateTag)?;
        let tag = TagInfo {
            id: self.next_id("tag"),
            name: name.to_string(),
        };
        let mut state = self.state.lock().unwrap();
        state
            .tags
            .entry(project_id.to_string())
            .or_default()
            .push(tag.clone());
        Ok(tag)
    }

    async fn upload_images(
        &self,
        _project_id: &str,
        images: &[ImageEntry],
    ) -> Result<(), ProviderError> {
        self.enter(Op::Upload)?;
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().unwrap().batches.push(images.to_vec());
        Ok(())
    }

    async fn train_project(
        &self,
        _project_id: &str,
        tag_ids: &[String],
        _hyperparameters: &Hyperparameters,
    ) -> Result<IterationInfo, ProviderError> {
        self.enter(Op::Train)?;
        self.state.lock().unwrap().trained_tags.push(tag_ids.to_vec());
        Ok(IterationInfo {
            id: self.next_id("iteration"),
            status: "Training".into(),
        })
    }

    async fn get_iteration(
        &self,
        _project_id: &str,
        iteration_id: &str,
    ) -> Result<IterationInfo, ProviderError> {
        self.enter(Op::GetIteration)?;
        let status = self
            .state
            .lock()
            .unwrap()
            .statuses
            .pop_front()
            .unwrap_or_else(|| "Completed".to_string());
        Ok(IterationInfo {
            id: iteration_id.to_string(),
            status,
        })
    }

    async fn publish_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
        publish_name: &str,
        _prediction_resource_id: &str,
    ) -> Result<(), ProviderError> {
        self.enter(Op::Publish)?;
        self.state.lock().unwrap().published.push((
            project_id.to_string(),
            iteration_id.to_string(),
            publish_name.to_string(),
        ));
        Ok(())
    }
}

#[async_trait]
impl PredictionProvider for FakeProvider {
    async fn classify_image(
        &self,
        project_id: &str,
        published_name: &str,
        image: &[u8],
    ) -> Result<Vec<Prediction>, ProviderError> {
        self.enter(Op::Classify)?;
        let mut state = self.state.lock().unwrap();
        state.classified.push((
            project_id.to_string(),
            published_name.to_string(),
            image.to_vec(),
        ));
        Ok(state.predictions.clone())
    }
}

pub const ENHANCED_MARKER: &[u8] = b"enhanced:";

/// Enhancer that prefixes bytes with [`ENHANCED_MARKER`]
#[derive(Default)]
pub struct FakeEnhancer {
    pub calls: AtomicUsize,
    /// `None` lets one call through
    failures: Mutex<VecDeque<Option<ProviderError>>>,
}

impl FakeEnhancer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, err: ProviderError) {
        self.failures.lock().unwrap().push_back(Some(err));
    }

    pub fn pass_next(&self) {
        self.failures.lock().unwrap().push_back(None);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnhancementAdapter for FakeEnhancer {
    async fn enhance(&self, image: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(Some(err)) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok([ENHANCED_MARKER, image].concat())
    }
}

/// Retry policy with millisecond backoff
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

pub fn fast_poll() -> PollSettings {
    PollSettings {
        base_interval: Duration::from_millis(1),
        backoff_factor: 2.0,
        max_interval: Duration::from_millis(4),
        max_wait: Duration::from_secs(10),
        retry: fast_retry(),
    }
}

pub fn fast_settings(batch_limit: usize) -> OrchestratorSettings {
    OrchestratorSettings {
        prediction_resource_id: "/subscriptions/test/prediction".into(),
        retry: fast_retry(),
        ingestion: IngestionSettings {
            batch_limit,
            retry: fast_retry(),
            ..IngestionSettings::default()
        },
        poll: fast_poll(),
        ..OrchestratorSettings::default()
    }
}

pub fn poller(provider: Arc<FakeProvider>, settings: PollSettings) -> CompletionPoller {
    CompletionPoller::new(provider, settings)
}

/// In-memory database with tm-trainer tables
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    tm_trainer::db::init_tables(&pool).await.unwrap();
    pool
}

/// Running service wired to fakes
///
/// Keep the harness alive for the duration of the test; dropping it removes
/// the image folder.
pub struct TestHarness {
    pub dir: TempDir,
    pub provider: Arc<FakeProvider>,
    pub enhancer: Arc<FakeEnhancer>,
    pub image_store: ImageStore,
    pub event_bus: EventBus,
    pub state: AppState,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_settings(fast_settings(64), true).await
    }

    pub async fn with_settings(settings: OrchestratorSettings, with_enhancer: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let provider = FakeProvider::new();
        let enhancer = FakeEnhancer::new();
        let image_store = ImageStore::new(dir.path());
        image_store.ensure_dirs().await.unwrap();
        let event_bus = EventBus::new(256);

        let providers = Providers {
            training: provider.clone(),
            prediction: provider.clone(),
            enhancer: if with_enhancer {
                Some(enhancer.clone() as Arc<dyn EnhancementAdapter>)
            } else {
                None
            },
        };
        let state = AppState::new(
            memory_pool().await,
            event_bus.clone(),
            image_store.clone(),
            providers,
            settings,
        );

        Self {
            dir,
            provider,
            enhancer,
            image_store,
            event_bus,
            state,
        }
    }

    /// Store `count` images named `<class>_<n>.jpg` with bytes `<class>-<n>`
    pub async fn seed_class(&self, class: &str, count: usize) {
        for n in 0..count {
            let name = format!("{}_{:03}.jpg", class, n);
            let bytes = format!("{}-{}", class, n).into_bytes();
            self.image_store.save_upload(&name, &bytes).await.unwrap();
        }
    }
}

/// Drain a progress stream until it ends
pub async fn collect_events(mut rx: ProgressReceiver) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    let drain = async {
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
    };
    tokio::time::timeout(Duration::from_secs(10), drain)
        .await
        .expect("progress stream did not finish");
    events
}

/// Status lines of the non-terminal events, in order
pub fn statuses(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|e| !e.is_terminal())
        .map(|e| e.message())
        .collect()
}
