use crate::vector::channel::CodecError;

/// Errors surfaced by vectorized environments.
///
/// `index` is the worker's position in construction order.
#[derive(Debug, thiserror::Error)]
pub enum VecEnvError {
    #[error("already stepping: call step_wait() before issuing another command")]
    AlreadyStepping,
    #[error("not stepping: step_wait() called without a pending step_async()")]
    NotStepping,
    #[error("vector environment is closed")]
    Closed,
    #[error("vector environment is unusable after a worker transport failure; call close()")]
    Poisoned,
    #[error("a vector environment needs at least one environment")]
    NoEnvs,
    #[error("expected {expected} actions (one per environment), got {got}")]
    ActionCount { expected: usize, got: usize },
    #[error("action for environment {index} has {got} dimensions, expected {expected}")]
    ActionShape { index: usize, expected: usize, got: usize },
    #[error("action for environment {index} contains a NaN or infinite component")]
    NonFiniteAction { index: usize },
    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("environment {index} failed to start: {message}")]
    Startup { index: usize, message: String },
    #[error("worker {index} disconnected")]
    Disconnected { index: usize },
    #[error("transport error with worker {index}: {source}")]
    Transport {
        index: usize,
        #[source]
        source: CodecError,
    },
    #[error("worker {index} replied `{got}` where `{expected}` was expected")]
    UnexpectedReply { index: usize, expected: &'static str, got: &'static str },
    #[error("environment {index} reported an error: {message}")]
    Worker { index: usize, message: String },
    #[error("environment {index} has {what} dimension {got}, environment 0 has {expected}")]
    Mismatch { index: usize, what: &'static str, expected: usize, got: usize },
}

impl VecEnvError {
    /// Misuse of the call protocol, recoverable by the caller.
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(
            self,
            VecEnvError::AlreadyStepping
                | VecEnvError::NotStepping
                | VecEnvError::Closed
                | VecEnvError::ActionCount { .. }
                | VecEnvError::ActionShape { .. }
                | VecEnvError::NonFiniteAction { .. }
        )
    }

    pub(crate) fn from_codec(index: usize, source: CodecError) -> Self {
        if source.is_disconnect() {
            VecEnvError::Disconnected { index }
        } else {
            VecEnvError::Transport { index, source }
        }
    }
}
