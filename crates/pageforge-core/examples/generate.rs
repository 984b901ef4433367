//! End-to-end generation from the command line.
//!
//! Usage: `OPENAI_API_KEY=... cargo run --example generate -- "a single-button counter"`

use std::sync::{Arc, Mutex};

use pageforge_core::{
    GenerationPipeline, JsonFileRecordStore, PipelineCallbacks, observability, record,
};
use pageforge_transport::HttpStreamClient;

type DoneSender = tokio::sync::oneshot::Sender<Result<String, String>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_observability();

    let topic = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "a single-button counter".to_string());

    let pipeline = GenerationPipeline::builder()
        .client(Arc::new(HttpStreamClient::from_env()?))
        .store(Arc::new(JsonFileRecordStore::new("./runs")))
        .build()?;

    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<Result<String, String>>();
    let done_tx: Arc<Mutex<Option<DoneSender>>> = Arc::new(Mutex::new(Some(done_tx)));
    let complete_tx = done_tx.clone();
    let error_tx = done_tx.clone();

    let callbacks = PipelineCallbacks::new()
        .on_progress(|stage, progress| {
            eprintln!("[{:>3.0}%] {stage}", progress * 100.0);
        })
        .on_status(|status| eprintln!("       transport: {status}"))
        .on_complete(move |document, usage| {
            eprintln!(
                "tokens: {} in / {} out / {} total",
                usage.input_tokens, usage.output_tokens, usage.total_tokens
            );
            if let Some(tx) = complete_tx.lock().unwrap().take() {
                let _ = tx.send(Ok(document.to_string()));
            }
        })
        .on_error(move |failure| {
            if let Some(tx) = error_tx.lock().unwrap().take() {
                let _ = tx.send(Err(failure.message.clone()));
            }
        });

    let id = record::new_id();
    pipeline.start(&id, &topic, callbacks).await?;

    match done_rx.await? {
        Ok(document) => println!("{document}"),
        Err(message) => {
            eprintln!("generation failed: {message}");
            std::process::exit(1);
        }
    }
    Ok(())
}
