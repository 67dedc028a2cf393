use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{topics, DomainEvent};

const AGGREGATE: &str = "task";

/// CUD event carrying the full task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCreated {
    pub pid: Uuid,
    pub description: String,
    pub assignee: Uuid,
    pub fee: i32,
    pub award: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAdded {
    pub pid: Uuid,
    pub assignee: Uuid,
    pub fee: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReshuffled {
    pub pid: Uuid,
    pub assignee: Uuid,
    pub fee: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompleted {
    pub pid: Uuid,
    pub assignee: Uuid,
    pub award: i32,
}

macro_rules! task_event {
    ($ty:ty, $name:literal, $topic:expr) => {
        impl DomainEvent for $ty {
            const NAME: &'static str = $name;
            const TOPIC: &'static str = $topic;
            const AGGREGATE: &'static str = AGGREGATE;

            fn aggregate_id(&self) -> Uuid {
                self.pid
            }
        }
    };
}

task_event!(TaskCreated, "Tasks.Created", topics::TASKS_STREAM);
task_event!(TaskAdded, "Tasks.Added", topics::TASKS_ADDED);
task_event!(TaskReshuffled, "Tasks.Reshuffled", topics::TASKS_RESHUFFLED);
task_event!(TaskCompleted, "Tasks.Completed", topics::TASKS_COMPLETED);
