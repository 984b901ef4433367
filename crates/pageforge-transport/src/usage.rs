/// Token accounting for one or more completion round-trips.
///
/// Totals only ever grow; the pipeline accumulates one of these across every
/// stage and retry of a generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the request side (prompt).
    pub input_tokens: u64,
    /// Tokens produced by the model (completion).
    pub output_tokens: u64,
    /// Endpoint-reported total.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Adds another round-trip's usage into this running total.
    pub fn accumulate(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }

    /// Parses the endpoint's `usage` object from a stream chunk.
    pub(crate) fn from_wire(usage: &serde_json::Value) -> Option<TokenUsage> {
        let field = |name: &str| usage.get(name).and_then(|v| v.as_u64());
        let input_tokens = field("prompt_tokens")?;
        let output_tokens = field("completion_tokens").unwrap_or(0);
        let total_tokens = field("total_tokens").unwrap_or(input_tokens + output_tokens);
        Some(TokenUsage {
            input_tokens,
            output_tokens,
            total_tokens,
        })
    }
}
