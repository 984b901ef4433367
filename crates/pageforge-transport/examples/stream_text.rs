use pageforge_transport::{
    AbortSignal, CompletionRequest, CompletionStreamer, HttpStreamClient, StreamObserver,
    TransportError,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), TransportError> {
    let client = HttpStreamClient::from_env()?;

    let completion = client
        .stream_completion(
            CompletionRequest::new("gpt-5-mini")
                .system("Reply with a short greeting.")
                .user("Stream a greeting."),
            StreamObserver::new()
                .on_status(|status| eprintln!("[{status}]"))
                .on_delta(|text| eprint!("\r{} chars received", text.len())),
            AbortSignal::never(),
        )
        .await?;

    println!("\n{}", completion.text);
    println!(
        "tokens: {} in / {} out / {} total",
        completion.usage.input_tokens, completion.usage.output_tokens, completion.usage.total_tokens
    );
    Ok(())
}
