/// Business logic layer
pub mod tasks;

pub use tasks::{AssigneePolicy, TaskService, UnknownAssigneePolicy};
