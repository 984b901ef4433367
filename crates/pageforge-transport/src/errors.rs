/// Errors surfaced by the streaming transport.
///
/// Retryable conditions (stalls, connection failures, empty streams) are
/// contained inside the client's bounded retry loop and only appear here once
/// every attempt has been spent; the `attempts` field records how many were
/// made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Client-side configuration is unusable (missing credential, bad URL).
    #[error("config error: {0}")]
    Config(String),
    /// Endpoint answered with a non-success HTTP status. Never retried.
    #[error("endpoint returned status {status}: {message}")]
    Http { status: u16, message: String },
    /// No delta arrived within the stall threshold on any attempt.
    #[error("stream stalled after {attempts} attempts")]
    Stalled { attempts: u32 },
    /// Connection-level failure on every attempt.
    #[error("transport failed after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },
    /// Streams completed cleanly but carried no content, on every attempt.
    #[error("empty response after {attempts} attempts")]
    EmptyResponse { attempts: u32 },
    /// The caller aborted the call.
    #[error("stream cancelled")]
    Cancelled,
}

impl TransportError {
    /// Number of attempts made before this error became terminal, when the
    /// error came out of the retry loop.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Stalled { attempts }
            | Self::Transport { attempts, .. }
            | Self::EmptyResponse { attempts } => Some(*attempts),
            Self::Config(_) | Self::Http { .. } | Self::Cancelled => None,
        }
    }
}
