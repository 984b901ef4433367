use std::fmt;

/// Liveness states reported while a streaming completion is in flight.
///
/// The three non-terminal states let a caller render an honest progress
/// indicator: an open connection is not the same thing as content arriving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    /// Request sent, no delta received yet.
    Connecting,
    /// A delta arrived recently.
    Streaming,
    /// The connection is open but deltas have paused.
    Waiting,
    /// The stall threshold was exceeded on the final attempt.
    Timeout,
    /// Terminal transport failure.
    Error,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Waiting => "waiting",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
