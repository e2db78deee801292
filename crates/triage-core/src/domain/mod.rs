//! Domain model: tasks, their types and lifecycle state.

pub mod state;
pub mod task;

pub use self::state::TaskState;
pub use self::task::{DynamicAction, Task, TaskId, TaskType};
