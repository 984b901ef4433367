//! Stage pipeline orchestrator.
//!
//! Each generation id runs as an independent task walking the fixed stage
//! sequence: one transport round-trip per stage (or a skip, for lint stages
//! whose local check passes), with the record persisted before the first
//! network call and after every completed stage. A crash or restart resumes
//! at the persisted stage. Retry lives entirely inside the transport; when it
//! exhausts its attempts the stage fails, and with it the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use pageforge_transport::{
    AbortSignal, Completion, CompletionStreamer, StreamObserver, StreamStatus, TokenUsage,
    TransportError, abort_pair,
};

use crate::lint;
use crate::notify::{LogNotifier, Notifier};
use crate::patch;
use crate::prompts;
use crate::record::GenerationRecord;
use crate::registry::RunRegistry;
use crate::stage::Stage;
use crate::store::{RecordStore, StoreError};

/// Model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "gpt-5-mini";

/// Errors returned from the pipeline's public entry points.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("config error: {0}")]
    Config(String),
}

/// Terminal failure details delivered to `on_error`.
#[derive(Clone, Debug)]
pub struct PipelineFailure {
    /// Stage that failed.
    pub stage: Stage,
    /// Transport attempts made, when the failure came out of the retry loop.
    pub attempts: Option<u32>,
    /// Underlying error message.
    pub message: String,
}

/// Callbacks surfaced to the UI collaborator.
#[derive(Clone, Default)]
pub struct PipelineCallbacks {
    on_progress: Option<Arc<dyn Fn(&str, f64) + Send + Sync>>,
    on_complete: Option<Arc<dyn Fn(&str, TokenUsage) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&PipelineFailure) + Send + Sync>>,
    on_status: Option<Arc<dyn Fn(StreamStatus) + Send + Sync>>,
}

impl PipelineCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per stage with `(stage_name, progress_0_to_1)`.
    pub fn on_progress(mut self, f: impl Fn(&str, f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Called once on success with `(document, token_usage)`.
    pub fn on_complete(mut self, f: impl Fn(&str, TokenUsage) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Called once on terminal failure.
    pub fn on_error(mut self, f: impl Fn(&PipelineFailure) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called with transport liveness transitions while a stage streams.
    pub fn on_status(mut self, f: impl Fn(StreamStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(f));
        self
    }

    fn progress(&self, stage_name: &str, progress: f64) {
        if let Some(f) = &self.on_progress {
            f(stage_name, progress);
        }
    }

    fn complete(&self, document: &str, usage: TokenUsage) {
        if let Some(f) = &self.on_complete {
            f(document, usage);
        }
    }

    fn error(&self, failure: &PipelineFailure) {
        if let Some(f) = &self.on_error {
            f(failure);
        }
    }

    fn transport_observer(&self) -> StreamObserver {
        match self.on_status.clone() {
            Some(on_status) => StreamObserver::new().on_status(move |status| on_status(status)),
            None => StreamObserver::new(),
        }
    }
}

/// Pipeline tuning knobs.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Pause between stages so the endpoint is not hammered.
    pub stage_delay: Duration,
    /// Predicate deciding whether an inspection summary reports real issues.
    /// The default is string-based and replaceable for callers that need a
    /// stricter rule.
    pub inspection_flags_issues: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl PipelineConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stage_delay: Duration::from_secs(1),
            inspection_flags_issues: Arc::new(prompts::inspection_reports_issues),
        }
    }

    /// Overrides the inter-stage delay.
    pub fn stage_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = delay;
        self
    }

    /// Replaces the inspection-issue predicate.
    pub fn inspection_predicate(
        mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.inspection_flags_issues = Arc::new(predicate);
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

/// Result of an incremental patch edit.
#[derive(Clone, Debug)]
pub struct EditOutcome {
    /// The patched document.
    pub document: String,
    /// Usage for the single edit round-trip.
    pub usage: TokenUsage,
    /// Well-formed directives applied (malformed lines were dropped).
    pub directives_applied: usize,
}

struct PipelineInner {
    client: Arc<dyn CompletionStreamer>,
    store: Arc<dyn RecordStore>,
    registry: RunRegistry,
    notifier: Arc<dyn Notifier>,
    config: PipelineConfig,
}

/// The generation orchestrator.
#[derive(Clone)]
pub struct GenerationPipeline {
    inner: Arc<PipelineInner>,
}

impl GenerationPipeline {
    /// Starts a builder for wiring the transport, store, and notifier.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The run registry, for liveness queries.
    pub fn registry(&self) -> &RunRegistry {
        &self.inner.registry
    }

    /// Starts or resumes the generation for `id` as an independent task.
    ///
    /// If a persisted record for `id` is still marked running, the pipeline
    /// resumes at its persisted stage; otherwise a fresh record is created
    /// and persisted before any network call. A second start for an id whose
    /// run is in flight attaches to it instead of spawning a duplicate.
    pub async fn start(
        &self,
        id: &str,
        topic: &str,
        callbacks: PipelineCallbacks,
    ) -> Result<(), PipelineError> {
        let record = match self.inner.store.load(id).await? {
            Some(existing) if existing.is_running => {
                debug!(id, stage = existing.stage.label(), "resuming persisted generation");
                existing
            }
            _ => GenerationRecord::new(id, topic),
        };
        self.launch(record, callbacks).await?;
        Ok(())
    }

    /// Explicitly resumes a stopped record at its persisted stage.
    ///
    /// Returns false when there is nothing to resume.
    pub async fn resume(
        &self,
        id: &str,
        callbacks: PipelineCallbacks,
    ) -> Result<bool, PipelineError> {
        let Some(mut record) = self.inner.store.load(id).await? else {
            return Ok(false);
        };
        if record.stage == Stage::Complete {
            return Ok(false);
        }
        record.is_running = true;
        self.launch(record, callbacks).await
    }

    /// Cooperative stop: persists `is_running = false` and signals the abort.
    ///
    /// The record is kept so the caller can later resume or discard it.
    pub async fn stop(&self, id: &str) -> Result<(), PipelineError> {
        if let Some(mut record) = self.inner.store.load(id).await? {
            record.is_running = false;
            self.inner.store.save(&record).await?;
        }
        self.inner.registry.abort(id);
        Ok(())
    }

    /// Single round-trip incremental edit: asks the model for patch
    /// directives against a line-numbered rendering of `document`, applies
    /// them, and returns the patched document. Nothing is persisted; the
    /// caller owns the edited document.
    pub async fn apply_edit(
        &self,
        instruction: &str,
        document: &str,
        callbacks: &PipelineCallbacks,
    ) -> Result<EditOutcome, PipelineError> {
        let request = prompts::edit_request(&self.inner.config.model, instruction, document);
        let completion: Completion = self
            .inner
            .client
            .stream_completion(request, callbacks.transport_observer(), AbortSignal::never())
            .await?;
        let directives = patch::parse_directives(&completion.text);
        debug!(directives = directives.len(), "applying edit directives");
        Ok(EditOutcome {
            document: patch::apply_directives(document, &directives),
            usage: completion.usage,
            directives_applied: directives.len(),
        })
    }

    async fn launch(
        &self,
        record: GenerationRecord,
        callbacks: PipelineCallbacks,
    ) -> Result<bool, PipelineError> {
        let (handle, signal) = abort_pair();
        if !self.inner.registry.register(&record.id, handle) {
            debug!(id = %record.id, "generation already running; attaching to the existing run");
            return Ok(false);
        }
        // Persist before the first network call so a crash between creation
        // and the draft stage still leaves a resumable record.
        if let Err(err) = self.inner.store.save(&record).await {
            self.inner.registry.deregister(&record.id);
            return Err(err.into());
        }
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run(record, callbacks, signal).await });
        Ok(true)
    }
}

impl PipelineInner {
    async fn run(
        self: Arc<Self>,
        mut record: GenerationRecord,
        callbacks: PipelineCallbacks,
        signal: AbortSignal,
    ) {
        let id = record.id.clone();
        info!(id = %id, stage = record.stage.label(), "generation pipeline running");

        while record.stage != Stage::Complete {
            if signal.is_aborted() {
                self.halt(&mut record).await;
                return;
            }
            let stage = record.stage;
            callbacks.progress(stage.label(), stage.progress());
            self.notifier.progress(stage.human_label());

            let issues = if stage.is_lint() {
                lint::document_issues(&record.document)
            } else {
                Vec::new()
            };
            let skip = match stage {
                s if s.is_lint() => issues.is_empty(),
                Stage::FixInspectionIssues => {
                    !(self.config.inspection_flags_issues)(&record.side_artifact)
                }
                _ => false,
            };

            let mut called_network = false;
            if skip {
                debug!(id = %id, stage = stage.label(), "stage satisfied by local check; skipping model call");
            } else {
                called_network = true;
                let request = prompts::stage_request(&self.config.model, stage, &record, &issues);
                match self
                    .client
                    .stream_completion(request, callbacks.transport_observer(), signal.clone())
                    .await
                {
                    Ok(completion) => {
                        record.token_usage.accumulate(completion.usage);
                        apply_stage_output(&mut record, stage, &completion.text);
                    }
                    Err(TransportError::Cancelled) => {
                        self.halt(&mut record).await;
                        return;
                    }
                    Err(err) => {
                        self.fail(&mut record, stage, err.attempts(), err.to_string(), &callbacks)
                            .await;
                        return;
                    }
                }
            }

            record.stage = stage.next().unwrap_or(Stage::Complete);
            if let Err(err) = self.store.save(&record).await {
                self.fail(&mut record, stage, None, err.to_string(), &callbacks)
                    .await;
                return;
            }
            if called_network && record.stage != Stage::Complete {
                time::sleep(self.config.stage_delay).await;
            }
        }

        self.finish(record, &callbacks).await;
    }

    async fn halt(&self, record: &mut GenerationRecord) {
        record.is_running = false;
        if let Err(err) = self.store.save(record).await {
            warn!(id = %record.id, error = %err, "failed to persist halted record");
        }
        self.registry.deregister(&record.id);
        debug!(id = %record.id, stage = record.stage.label(), "generation halted by stop request");
    }

    async fn fail(
        &self,
        record: &mut GenerationRecord,
        stage: Stage,
        attempts: Option<u32>,
        message: String,
        callbacks: &PipelineCallbacks,
    ) {
        record.is_running = false;
        if let Err(err) = self.store.save(record).await {
            warn!(id = %record.id, error = %err, "failed to persist failed record");
        }
        warn!(id = %record.id, stage = stage.label(), message = %message, "generation failed");
        callbacks.error(&PipelineFailure {
            stage,
            attempts,
            message,
        });
        self.notifier.failed(stage.human_label());
        self.registry.deregister(&record.id);
    }

    async fn finish(&self, mut record: GenerationRecord, callbacks: &PipelineCallbacks) {
        record.is_running = false;
        if let Err(err) = self.store.save(&record).await {
            warn!(id = %record.id, error = %err, "failed to persist completed record");
        }
        if let Err(err) = self.store.clear(&record.id).await {
            warn!(id = %record.id, error = %err, "failed to clear completed record");
        }
        callbacks.progress(Stage::Complete.label(), Stage::Complete.progress());
        callbacks.complete(&record.document, record.token_usage);
        self.notifier.completed(Stage::Complete.human_label());
        self.registry.deregister(&record.id);
        info!(id = %record.id, total_tokens = record.token_usage.total_tokens, "generation complete");
    }
}

fn apply_stage_output(record: &mut GenerationRecord, stage: Stage, text: &str) {
    match stage {
        // Text stages write the side artifact; document stages replace the
        // document after normalization.
        Stage::ImprovementChecklist | Stage::FinalInspection => {
            record.side_artifact = text.trim().to_string();
        }
        _ => record.document = crate::normalize::normalize(text),
    }
}

/// Builder used to wire collaborators before creating a pipeline.
#[derive(Default)]
pub struct PipelineBuilder {
    client: Option<Arc<dyn CompletionStreamer>>,
    store: Option<Arc<dyn RecordStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    config: Option<PipelineConfig>,
}

impl PipelineBuilder {
    /// Sets the streaming transport.
    pub fn client(mut self, client: Arc<dyn CompletionStreamer>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the record store.
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the notification surface (defaults to `LogNotifier`).
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the pipeline configuration (defaults to `PipelineConfig::default`).
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validates the wiring and builds the pipeline.
    pub fn build(self) -> Result<GenerationPipeline, PipelineError> {
        let client = self
            .client
            .ok_or_else(|| PipelineError::Config("pipeline requires a transport client".into()))?;
        let store = self
            .store
            .ok_or_else(|| PipelineError::Config("pipeline requires a record store".into()))?;
        Ok(GenerationPipeline {
            inner: Arc::new(PipelineInner {
                client,
                store,
                registry: RunRegistry::new(),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
                config: self.config.unwrap_or_default(),
            }),
        })
    }
}
