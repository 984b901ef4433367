use tracing::info;

/// Fire-and-forget notification surface, keyed by a human-readable label
/// derived from the current stage.
///
/// The delivery mechanism (push, toast, log line) is a collaborator concern;
/// implementations must not block and must not fail the pipeline.
pub trait Notifier: Send + Sync {
    fn progress(&self, label: &str);
    fn completed(&self, label: &str);
    fn failed(&self, label: &str);
}

/// Notifier that reports through `tracing`.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn progress(&self, label: &str) {
        info!(label, "generation progress");
    }

    fn completed(&self, label: &str) {
        info!(label, "generation completed");
    }

    fn failed(&self, label: &str) {
        info!(label, "generation failed");
    }
}

/// Notifier that drops everything. Useful in tests and embedded use.
#[derive(Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn progress(&self, _label: &str) {}
    fn completed(&self, _label: &str) {}
    fn failed(&self, _label: &str) {}
}
