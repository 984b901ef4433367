use crate::usage::TokenUsage;

pub(crate) const EVENT_MARKER: &str = "data:";
pub(crate) const END_SENTINEL: &str = "[DONE]";

/// One decoded event from the stream body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WireEvent {
    /// Incremental content fragment.
    Content(String),
    /// Endpoint-reported token usage (arrives on the final chunk).
    Usage(TokenUsage),
    /// Literal end-of-stream sentinel.
    Done,
}

/// Reduces incoming body chunks to bytes not yet observed.
///
/// Some transports re-deliver the whole accumulated body on every read
/// instead of just the appended part. When a chunk starts with everything
/// seen so far it is treated as a cumulative snapshot and only its suffix is
/// kept; anything else passes through as an ordinary incremental chunk.
#[derive(Default)]
pub(crate) struct SnapshotDiffer {
    seen: Vec<u8>,
}

impl SnapshotDiffer {
    pub fn novel(&mut self, chunk: &[u8]) -> Vec<u8> {
        if !self.seen.is_empty() && chunk.len() >= self.seen.len() && chunk.starts_with(&self.seen)
        {
            let fresh = chunk[self.seen.len()..].to_vec();
            self.seen = chunk.to_vec();
            return fresh;
        }
        self.seen.extend_from_slice(chunk);
        chunk.to_vec()
    }
}

/// Buffers raw bytes and yields complete lines.
///
/// A line split across chunk boundaries stays in the buffer until its
/// terminator arrives.
#[derive(Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes = self.buf[..idx].to_vec();
            self.buf.drain(..=idx);
            let line = String::from_utf8_lossy(&line_bytes)
                .trim_end_matches('\r')
                .to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

/// Maps one marker-prefixed line to wire events.
///
/// Lines without the marker, and marker lines whose payload does not parse,
/// are skipped silently: they are either protocol noise or fragments of a
/// line split across chunks.
pub(crate) fn decode_line(line: &str) -> Vec<WireEvent> {
    let Some(payload) = line.strip_prefix(EVENT_MARKER) else {
        return Vec::new();
    };
    let payload = payload.trim();
    if payload == END_SENTINEL {
        return vec![WireEvent::Done];
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return Vec::new();
    };
    let mut events = Vec::new();
    if let Some(content) = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
        && !content.is_empty()
    {
        events.push(WireEvent::Content(content.to_string()));
    }
    if let Some(usage) = value.get("usage").and_then(TokenUsage::from_wire) {
        events.push(WireEvent::Usage(usage));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(text: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}}}}]}}\n"
        )
    }

    #[test]
    fn line_decoder_handles_partial_chunk_boundaries() {
        let mut decoder = LineDecoder::default();
        let line = delta_line("hello");
        let (head, tail) = line.split_at(20);
        assert!(decoder.push_chunk(head.as_bytes()).is_empty());
        let lines = decoder.push_chunk(tail.as_bytes());
        assert_eq!(lines.len(), 1);
        let events = decode_line(&lines[0]);
        assert_eq!(events, vec![WireEvent::Content("hello".into())]);
    }

    #[test]
    fn snapshot_differ_reduces_cumulative_bodies() {
        let mut differ = SnapshotDiffer::default();
        assert_eq!(differ.novel(b"abc"), b"abc".to_vec());
        // Cumulative transport re-sends the whole body.
        assert_eq!(differ.novel(b"abcdef"), b"def".to_vec());
        assert_eq!(differ.novel(b"abcdefgh"), b"gh".to_vec());
    }

    #[test]
    fn snapshot_differ_passes_incremental_chunks_through() {
        let mut differ = SnapshotDiffer::default();
        assert_eq!(differ.novel(b"abc"), b"abc".to_vec());
        assert_eq!(differ.novel(b"def"), b"def".to_vec());
        assert_eq!(differ.novel(b"gh"), b"gh".to_vec());
    }

    #[test]
    fn decode_line_maps_sentinel_to_done() {
        assert_eq!(decode_line("data: [DONE]"), vec![WireEvent::Done]);
    }

    #[test]
    fn decode_line_skips_unmarked_and_malformed_lines() {
        assert!(decode_line(": keep-alive comment").is_empty());
        assert!(decode_line("data: {\"choices\":[{\"de").is_empty());
        assert!(decode_line("stray commentary").is_empty());
    }

    #[test]
    fn decode_line_extracts_usage_chunk() {
        let line = "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":4,\"total_tokens\":7}}";
        let events = decode_line(line);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            WireEvent::Usage(TokenUsage {
                total_tokens: 7,
                ..
            })
        ));
    }

    #[test]
    fn decode_line_ignores_empty_content_fragments() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}";
        assert!(decode_line(line).is_empty());
    }
}
