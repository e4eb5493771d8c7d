//! Process exit codes.

use oxvault_ops::TaskState;

pub const SUCCESS: u8 = 0;
/// Bad arguments, unreadable configuration, or a volume that would not open.
pub const GENERAL_ERROR: u8 = 1;
/// The task stopped at an item.
pub const TASK_FAILED: u8 = 2;
/// The task ended with an unexpected error.
pub const TASK_ERROR: u8 = 3;
/// Interrupted by Ctrl-C, as shells report SIGINT.
pub const CANCELLED: u8 = 130;

pub fn for_state(state: TaskState) -> u8 {
    match state {
        TaskState::Success => SUCCESS,
        TaskState::Failed => TASK_FAILED,
        TaskState::Error => TASK_ERROR,
        TaskState::Cancelled => CANCELLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_success_is_zero() {
        assert_eq!(for_state(TaskState::Success), 0);
        for state in [TaskState::Failed, TaskState::Error, TaskState::Cancelled] {
            assert_ne!(for_state(state), 0, "{state}");
        }
    }
}
