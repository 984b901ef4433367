//! Staged document generation over a streaming model endpoint.
//!
//! A `GenerationPipeline` walks a fixed stage sequence (draft, review, apply,
//! lint, optimize, inspect, fix), persisting a `GenerationRecord` between
//! stages so an interrupted run resumes where it left off. Raw model output
//! passes through the output normalizer before it becomes the document, and
//! incremental edits travel as a compact line-addressed patch protocol
//! instead of a full regeneration.

/// Local structural checks that let lint stages skip the network.
pub mod lint;
/// Tolerant conversion of raw model output into the canonical document.
pub mod normalize;
/// Fire-and-forget notification surface.
pub mod notify;
/// Process-wide tracing setup.
pub mod observability;
/// Line-addressed patch protocol: parsing and application.
pub mod patch;
/// The stage pipeline orchestrator.
pub mod pipeline;
mod prompts;
/// The persisted generation record.
pub mod record;
/// Active-run registry.
pub mod registry;
/// The fixed stage sequence.
pub mod stage;
/// Persistence boundary and bundled implementations.
pub mod store;

pub use normalize::{OutputShape, classify, normalize};
pub use notify::{LogNotifier, NoopNotifier, Notifier};
pub use patch::{PatchAction, PatchDirective, apply_directives, number_lines, parse_directives};
pub use pipeline::{
    DEFAULT_MODEL, EditOutcome, GenerationPipeline, PipelineBuilder, PipelineCallbacks,
    PipelineConfig, PipelineError, PipelineFailure,
};
pub use record::{GenerationRecord, new_id};
pub use registry::RunRegistry;
pub use stage::Stage;
pub use store::{InMemoryRecordStore, JsonFileRecordStore, RecordStore, StoreError};

// Transport types that appear in this crate's public API.
pub use pageforge_transport::{StreamStatus, TokenUsage};
