use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::errors::TransportError;
use crate::request::CompletionRequest;
use crate::sse::{LineDecoder, SnapshotDiffer, WireEvent, decode_line};
use crate::status::StreamStatus;
use crate::usage::TokenUsage;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, String>> + Send + 'static>>;

/// Final result of one successful streaming completion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    /// Accumulated text of the whole stream.
    pub text: String,
    /// Endpoint-reported token usage for this round-trip.
    pub usage: TokenUsage,
}

/// Handle used to request cancellation of an in-flight call.
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation. Best-effort; the call returns
    /// `TransportError::Cancelled` once the signal is observed.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving side of an abort pair, passed into `stream_completion`.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl AbortSignal {
    /// A signal that can never fire, for callers without cancellation.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    pub(crate) fn receiver(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

/// Creates a connected abort handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (
        AbortHandle { tx },
        AbortSignal {
            rx,
            _keepalive: None,
        },
    )
}

/// Caller-supplied callbacks observed during one streaming call.
///
/// `on_delta` receives the full accumulated text after each fragment;
/// `on_status` receives liveness transitions (deduplicated).
#[derive(Clone, Default)]
pub struct StreamObserver {
    on_delta: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    on_status: Option<Arc<dyn Fn(StreamStatus) + Send + Sync>>,
}

impl StreamObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the accumulated-text callback.
    pub fn on_delta(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_delta = Some(Arc::new(f));
        self
    }

    /// Sets the liveness-status callback.
    pub fn on_status(mut self, f: impl Fn(StreamStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(f));
        self
    }

    fn delta(&self, text: &str) {
        if let Some(f) = &self.on_delta {
            f(text);
        }
    }

    fn status(&self, status: StreamStatus) {
        if let Some(f) = &self.on_status {
            f(status);
        }
    }
}

/// Deduplicates status transitions before they reach the observer.
struct StatusTracker {
    observer: StreamObserver,
    last: Option<StreamStatus>,
}

impl StatusTracker {
    fn new(observer: StreamObserver) -> Self {
        Self {
            observer,
            last: None,
        }
    }

    fn emit(&mut self, status: StreamStatus) {
        if self.last != Some(status) {
            self.last = Some(status);
            self.observer.status(status);
        }
    }

    fn delta(&self, text: &str) {
        self.observer.delta(text);
    }
}

/// Configuration for `HttpStreamClient`.
#[derive(Clone, Debug)]
pub struct StreamClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL for the OpenAI-compatible endpoint.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Gap without a parsed delta after which an attempt is aborted.
    pub stall_threshold: Duration,
    /// Gap after which the status degrades from streaming to waiting.
    pub waiting_threshold: Duration,
    /// Period of the liveness monitor.
    pub liveness_interval: Duration,
    /// Total attempts for retryable failures (stall, connection, empty).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl StreamClientConfig {
    /// Creates a config with production defaults and the provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            connect_timeout: Duration::from_secs(15),
            stall_threshold: Duration::from_secs(90),
            waiting_threshold: Duration::from_secs(10),
            liveness_interval: Duration::from_secs(2),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Builds a config from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, TransportError> {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(TransportError::Config(
                "missing OPENAI_API_KEY for the generation endpoint".into(),
            ));
        }
        Ok(Self::new(api_key))
    }

    /// Overrides the API base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the stall threshold.
    pub fn stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Overrides the liveness monitor period.
    pub fn liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval;
        self
    }

    /// Overrides the attempt ceiling.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Overrides the delay between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub(crate) fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

/// Streaming completion boundary between the pipeline and the network.
#[async_trait::async_trait]
pub trait CompletionStreamer: Send + Sync {
    /// Streams one completion to its end, invoking the observer as content
    /// arrives, and returns the accumulated result.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
        observer: StreamObserver,
        abort: AbortSignal,
    ) -> Result<Completion, TransportError>;
}

/// Outcome of a single attempt. Everything here except `Complete` is
/// retryable; hard failures (HTTP status, cancellation) short-circuit the
/// attempt loop via `Err` instead.
enum AttemptOutcome {
    Complete(Completion),
    Stalled,
    TransportFailed(String),
    Empty,
}

/// HTTP implementation of `CompletionStreamer` over a chunked SSE body.
pub struct HttpStreamClient {
    client: reqwest::Client,
    config: StreamClientConfig,
}

impl HttpStreamClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: StreamClientConfig) -> Result<Self, TransportError> {
        if config.api_key.trim().is_empty() {
            return Err(TransportError::Config(
                "stream client api_key must not be empty".into(),
            ));
        }
        // No overall request timeout: the liveness monitor owns stall
        // detection, and generation streams legitimately run for minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a client using `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, TransportError> {
        Self::new(StreamClientConfig::from_env()?)
    }

    async fn consume_stream(
        &self,
        mut bytes: ByteStream,
        tracker: &mut StatusTracker,
        abort: &AbortSignal,
    ) -> Result<AttemptOutcome, TransportError> {
        let mut differ = SnapshotDiffer::default();
        let mut decoder = LineDecoder::default();
        let mut accumulated = String::new();
        let mut usage = TokenUsage::default();
        let mut last_delta: Option<Instant> = None;
        let opened = Instant::now();
        let mut ticker = time::interval(self.config.liveness_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut abort_rx = abort.receiver();
        let mut abort_live = true;

        'stream: loop {
            tokio::select! {
                changed = abort_rx.changed(), if abort_live => {
                    match changed {
                        Ok(()) if *abort_rx.borrow() => return Err(TransportError::Cancelled),
                        Ok(()) => {}
                        Err(_) => abort_live = false,
                    }
                }
                _ = ticker.tick() => {
                    let gap = last_delta.unwrap_or(opened).elapsed();
                    if gap > self.config.stall_threshold {
                        return Ok(AttemptOutcome::Stalled);
                    }
                    let status = match last_delta {
                        None => StreamStatus::Connecting,
                        Some(_) if gap > self.config.waiting_threshold => StreamStatus::Waiting,
                        Some(_) => StreamStatus::Streaming,
                    };
                    tracker.emit(status);
                }
                next = bytes.next() => {
                    match next {
                        Some(Ok(chunk)) => {
                            let fresh = differ.novel(&chunk);
                            for line in decoder.push_chunk(&fresh) {
                                for event in decode_line(&line) {
                                    match event {
                                        WireEvent::Content(text) => {
                                            accumulated.push_str(&text);
                                            last_delta = Some(Instant::now());
                                            tracker.emit(StreamStatus::Streaming);
                                            tracker.delta(&accumulated);
                                        }
                                        WireEvent::Usage(reported) => usage = reported,
                                        WireEvent::Done => break 'stream,
                                    }
                                }
                            }
                        }
                        Some(Err(message)) => return Ok(AttemptOutcome::TransportFailed(message)),
                        None => break 'stream,
                    }
                }
            }
        }

        if accumulated.is_empty() {
            return Ok(AttemptOutcome::Empty);
        }
        Ok(AttemptOutcome::Complete(Completion {
            text: accumulated,
            usage,
        }))
    }
}

#[async_trait::async_trait]
impl CompletionStreamer for HttpStreamClient {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
        observer: StreamObserver,
        abort: AbortSignal,
    ) -> Result<Completion, TransportError> {
        let call_id = uuid::Uuid::new_v4();
        let body = request.body();
        let mut tracker = StatusTracker::new(observer);
        let mut attempt = 0_u32;

        loop {
            attempt += 1;
            if abort.is_aborted() {
                return Err(TransportError::Cancelled);
            }
            tracker.emit(StreamStatus::Connecting);
            debug!(call_id = %call_id, attempt, model = %request.model, "opening completion stream");

            let response = self
                .client
                .post(self.config.completions_url())
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await;

            let outcome = match response {
                Err(e) => AttemptOutcome::TransportFailed(e.to_string()),
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let message = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "<unreadable body>".to_string());
                        tracker.emit(StreamStatus::Error);
                        return Err(TransportError::Http {
                            status: status.as_u16(),
                            message,
                        });
                    }
                    let bytes: ByteStream = Box::pin(
                        response.bytes_stream().map(|r| r.map_err(|e| e.to_string())),
                    );
                    self.consume_stream(bytes, &mut tracker, &abort).await?
                }
            };

            match outcome {
                AttemptOutcome::Complete(completion) => {
                    debug!(call_id = %call_id, attempt, chars = completion.text.len(), "completion stream finished");
                    return Ok(completion);
                }
                AttemptOutcome::Stalled if attempt >= self.config.max_attempts => {
                    tracker.emit(StreamStatus::Timeout);
                    return Err(TransportError::Stalled { attempts: attempt });
                }
                AttemptOutcome::TransportFailed(message) if attempt >= self.config.max_attempts => {
                    tracker.emit(StreamStatus::Error);
                    return Err(TransportError::Transport {
                        attempts: attempt,
                        message,
                    });
                }
                AttemptOutcome::Empty if attempt >= self.config.max_attempts => {
                    tracker.emit(StreamStatus::Error);
                    return Err(TransportError::EmptyResponse { attempts: attempt });
                }
                AttemptOutcome::Stalled => {
                    warn!(call_id = %call_id, attempt, "stream stalled, retrying");
                }
                AttemptOutcome::TransportFailed(ref message) => {
                    warn!(call_id = %call_id, attempt, message = %message, "transport failed, retrying");
                }
                AttemptOutcome::Empty => {
                    warn!(call_id = %call_id, attempt, "stream carried no content, retrying");
                }
            }

            time::sleep(self.config.retry_delay).await;
        }
    }
}
