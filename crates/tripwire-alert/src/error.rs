use tripwire_notify::NotifyError;
use tripwire_storage::StorageError;

/// Errors raised while evaluating rules. The evaluator logs and skips the
/// failing rule; only cycle-level failures reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Eval: storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Eval: notification error: {0}")]
    Notify(#[from] NotifyError),

    /// A rule evaluation task panicked or was cancelled.
    #[error("Eval: task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;
