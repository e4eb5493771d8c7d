//! Terminal outcome of a bulk operation.

use std::fmt;

/// The four ways a task can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Success,
    Failed,
    Error,
    Cancelled,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::Error => "error",
            TaskState::Cancelled => "cancelled",
        })
    }
}

/// Outcome of a bulk operation.
///
/// `Failed` carries the item the task stopped at (a path or an external
/// source id). `Error` carries the message of an unexpected failure caught at
/// the task boundary. No other payloads exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult<T> {
    Success,
    Failed(T),
    Error(String),
    Cancelled,
}

impl<T> TaskResult<T> {
    /// `Success` if nothing failed, otherwise `Failed(item)`.
    pub fn completed(failed_item: Option<T>) -> Self {
        match failed_item {
            None => TaskResult::Success,
            Some(item) => TaskResult::Failed(item),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        TaskResult::Error(message.into())
    }

    pub fn cancelled() -> Self {
        TaskResult::Cancelled
    }

    pub fn state(&self) -> TaskState {
        match self {
            TaskResult::Success => TaskState::Success,
            TaskResult::Failed(_) => TaskState::Failed,
            TaskResult::Error(_) => TaskState::Error,
            TaskResult::Cancelled => TaskState::Cancelled,
        }
    }

    pub fn failed_item(&self) -> Option<&T> {
        match self {
            TaskResult::Failed(item) => Some(item),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TaskResult::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskResult::Cancelled)
    }

    /// Treat cancellation as success. Used by delete-family operations, where
    /// a partial deletion is an acceptable end state.
    #[must_use]
    pub fn cancelled_as_success(self) -> Self {
        match self {
            TaskResult::Cancelled => TaskResult::Success,
            other => other,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaskResult<U> {
        match self {
            TaskResult::Success => TaskResult::Success,
            TaskResult::Failed(item) => TaskResult::Failed(f(item)),
            TaskResult::Error(message) => TaskResult::Error(message),
            TaskResult::Cancelled => TaskResult::Cancelled,
        }
    }
}

impl<T: fmt::Display> fmt::Display for TaskResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskResult::Success => f.write_str("success"),
            TaskResult::Failed(item) => write!(f, "failed at {item}"),
            TaskResult::Error(message) => write!(f, "error: {message}"),
            TaskResult::Cancelled => f.write_str("cancelled"),
        }
    }
}
