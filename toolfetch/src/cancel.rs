use tokio_util::sync::CancellationToken;
use tracing::info;

/// One-shot cooperative cancellation flag shared between a host and one
/// install attempt.
///
/// The host keeps a clone and calls [`CancelFlag::request_cancel`]; the
/// pipeline polls [`CancelFlag::is_cancelled`] at its checkpoints. Once set
/// the flag is never cleared, so a new attempt needs a new flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    token: CancellationToken,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running attempt to stop at its next checkpoint. Idempotent.
    pub fn request_cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Poll the flag at a named checkpoint, logging when a stop is observed.
    pub fn checkpoint(&self, stage: &str) -> bool {
        let cancelled = self.is_cancelled();
        if cancelled {
            info!("Cancellation observed {}", stage);
        }
        cancelled
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
