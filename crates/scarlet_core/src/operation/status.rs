use crate::error::OperationError;

/// Lifecycle state of an [`Operation`](super::Operation).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationStatus {
    /// Created but not started.
    None = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Canceled = 4,
    /// Released by its owner. Entered after, or instead of, a terminal state.
    Disposed = 5,
}

impl OperationStatus {
    /// True for every state an operation can never leave again.
    pub fn is_terminal(self) -> bool {
        self >= OperationStatus::Completed
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => OperationStatus::None,
            1 => OperationStatus::Running,
            2 => OperationStatus::Completed,
            3 => OperationStatus::Failed,
            4 => OperationStatus::Canceled,
            _ => OperationStatus::Disposed,
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationStatus::None => "none",
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Canceled => "canceled",
            OperationStatus::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// How an operation finished. Exactly one variant describes it.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Completed(T),
    Failed(OperationError),
    Canceled,
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Outcome::Canceled)
    }

    /// Converts into a `Result`, reporting cancellation as [`OperationError::Canceled`].
    pub fn into_result(self) -> Result<T, OperationError> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(error) => Err(error),
            Outcome::Canceled => Err(OperationError::Canceled),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Failed(error) => Outcome::Failed(error),
            Outcome::Canceled => Outcome::Canceled,
        }
    }
}
