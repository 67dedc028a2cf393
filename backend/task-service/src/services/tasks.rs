/// Task workflow: creation, completion and reshuffling
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use event_schema::{Role, TaskAdded, TaskCompleted, TaskCreated, TaskReshuffled};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::info;
use transactional_outbox::OutboxEvent;
use uuid::Uuid;
use validator::Validate;

use crate::db::{ReplicaStore, TaskRepository};
use crate::error::{AppError, Result};
use crate::models::{CreateTaskRequest, ReplicaAccount, Task};

const FEE_RANGE: std::ops::RangeInclusive<i32> = 10..=20;
const AWARD_RANGE: std::ops::RangeInclusive<i32> = 20..=40;

/// Which replica accounts may be handed a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssigneePolicy {
    /// Every account in the replica, whatever its role
    #[default]
    AnyAccount,
    WorkersOnly,
}

impl AssigneePolicy {
    pub fn eligible(&self, role: Role) -> bool {
        match self {
            AssigneePolicy::AnyAccount => true,
            AssigneePolicy::WorkersOnly => role == Role::Worker,
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown assignee policy '{0}', expected 'any' or 'workers'")]
pub struct UnknownAssigneePolicy(pub String);

impl FromStr for AssigneePolicy {
    type Err = UnknownAssigneePolicy;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(AssigneePolicy::AnyAccount),
            "workers" => Ok(AssigneePolicy::WorkersOnly),
            other => Err(UnknownAssigneePolicy(other.to_string())),
        }
    }
}

impl fmt::Display for AssigneePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssigneePolicy::AnyAccount => f.write_str("any"),
            AssigneePolicy::WorkersOnly => f.write_str("workers"),
        }
    }
}

pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    replica: Arc<dyn ReplicaStore>,
    policy: AssigneePolicy,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        replica: Arc<dyn ReplicaStore>,
        policy: AssigneePolicy,
    ) -> Self {
        Self {
            tasks,
            replica,
            policy,
        }
    }

    async fn candidates(&self) -> Result<Vec<Uuid>> {
        let accounts = self.replica.list().await?;
        Ok(eligible_pids(&accounts, self.policy))
    }

    pub async fn create(&self, request: CreateTaskRequest) -> Result<Task> {
        request.validate()?;

        let candidates = self.candidates().await?;
        let (assignee, fee, award) = {
            let mut rng = rand::thread_rng();
            let assignee = *candidates.choose(&mut rng).ok_or(AppError::NoAssignees)?;
            (
                assignee,
                rng.gen_range(FEE_RANGE),
                rng.gen_range(AWARD_RANGE),
            )
        };

        let task = Task {
            pid: Uuid::new_v4(),
            description: request.description,
            assignee,
            fee,
            award,
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
        };
        let events = [
            OutboxEvent::from_event(TaskCreated {
                pid: task.pid,
                description: task.description.clone(),
                assignee,
                fee,
                award,
            })?,
            OutboxEvent::from_event(TaskAdded {
                pid: task.pid,
                assignee,
                fee,
            })?,
        ];

        self.tasks.create(&task, &events).await?;
        info!(task = %task.pid, assignee = %assignee, fee, award, "Task created");
        Ok(task)
    }

    pub async fn list(&self) -> Result<Vec<Task>> {
        self.tasks.list().await
    }

    /// Only the current assignee may complete an open task; everyone else
    /// gets `NotFound`.
    pub async fn complete(&self, actor: Uuid, pid: Uuid) -> Result<Task> {
        let not_found = || AppError::NotFound(format!("task {}", pid));

        let task = self.tasks.find(pid).await?.ok_or_else(not_found)?;
        if task.assignee != actor || task.completed {
            return Err(not_found());
        }

        let event = OutboxEvent::from_event(TaskCompleted {
            pid,
            assignee: actor,
            award: task.award,
        })?;
        if !self.tasks.complete(pid, actor, &event).await? {
            return Err(not_found());
        }

        info!(task = %pid, assignee = %actor, award = task.award, "Task completed");
        Ok(Task {
            completed: true,
            completed_at: Some(Utc::now()),
            ..task
        })
    }

    /// Hand every open task to a freshly drawn assignee.
    pub async fn reshuffle(&self) -> Result<usize> {
        let open = self.tasks.open_tasks().await?;
        if open.is_empty() {
            return Ok(0);
        }

        let candidates = self.candidates().await?;
        if candidates.is_empty() {
            return Err(AppError::NoAssignees);
        }

        let assignments: Vec<(Uuid, Uuid)> = {
            let mut rng = rand::thread_rng();
            open.iter()
                .map(|task| {
                    let assignee = candidates.choose(&mut rng).copied().unwrap_or(task.assignee);
                    (task.pid, assignee)
                })
                .collect()
        };

        let events = open
            .iter()
            .zip(&assignments)
            .map(|(task, (_, assignee))| {
                OutboxEvent::from_event(TaskReshuffled {
                    pid: task.pid,
                    assignee: *assignee,
                    fee: task.fee,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.tasks.reassign(&assignments, &events).await?;
        info!(reassigned = assignments.len(), "Open tasks reshuffled");
        Ok(assignments.len())
    }
}

fn eligible_pids(accounts: &[ReplicaAccount], policy: AssigneePolicy) -> Vec<Uuid> {
    accounts
        .iter()
        .filter(|a| policy.eligible(a.role))
        .map(|a| a.pid)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::replica::MockReplicaStore;
    use crate::db::tasks::MockTaskRepository;
    use event_schema::topics;

    fn replica_with(accounts: Vec<ReplicaAccount>) -> MockReplicaStore {
        let mut replica = MockReplicaStore::new();
        replica
            .expect_list()
            .returning(move || Ok(accounts.clone()));
        replica
    }

    fn account(role: Role) -> ReplicaAccount {
        ReplicaAccount {
            pid: Uuid::new_v4(),
            role,
            email: format!("{}@popug.dev", role),
        }
    }

    fn open_task(assignee: Uuid) -> Task {
        Task {
            pid: Uuid::new_v4(),
            description: "feed the parrots".to_string(),
            assignee,
            fee: 15,
            award: 30,
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_policy_parsing_and_eligibility() {
        assert_eq!("any".parse::<AssigneePolicy>().unwrap(), AssigneePolicy::AnyAccount);
        assert_eq!(
            " Workers ".parse::<AssigneePolicy>().unwrap(),
            AssigneePolicy::WorkersOnly
        );
        assert!("admins".parse::<AssigneePolicy>().is_err());

        assert!(AssigneePolicy::AnyAccount.eligible(Role::Admin));
        assert!(!AssigneePolicy::WorkersOnly.eligible(Role::Manager));
        assert!(AssigneePolicy::WorkersOnly.eligible(Role::Worker));
    }

    #[tokio::test]
    async fn test_create_draws_prices_and_emits_two_events() {
        let worker = account(Role::Worker);
        let worker_pid = worker.pid;
        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_create()
            .withf(move |task, events| {
                task.assignee == worker_pid
                    && events.len() == 2
                    && events[0].topic == topics::TASKS_STREAM
                    && events[0].event_type == "Tasks.Created"
                    && events[1].topic == topics::TASKS_ADDED
                    && events.iter().all(|e| e.aggregate_id == task.pid)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = TaskService::new(
            Arc::new(tasks),
            Arc::new(replica_with(vec![worker, account(Role::Admin)])),
            AssigneePolicy::WorkersOnly,
        );

        let task = service
            .create(CreateTaskRequest {
                description: "clean the cage".to_string(),
            })
            .await
            .unwrap();
        assert!(FEE_RANGE.contains(&task.fee));
        assert!(AWARD_RANGE.contains(&task.award));
        assert_eq!(task.assignee, worker_pid);
    }

    #[tokio::test]
    async fn test_create_without_candidates_is_conflict() {
        let mut tasks = MockTaskRepository::new();
        tasks.expect_create().never();

        let service = TaskService::new(
            Arc::new(tasks),
            Arc::new(replica_with(vec![account(Role::Manager)])),
            AssigneePolicy::WorkersOnly,
        );

        let err = service
            .create(CreateTaskRequest {
                description: "nobody can do this".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoAssignees));
    }

    #[tokio::test]
    async fn test_only_assignee_completes() {
        let assignee = Uuid::new_v4();
        let task = open_task(assignee);
        let pid = task.pid;
        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_find()
            .returning(move |_| Ok(Some(task.clone())));
        tasks
            .expect_complete()
            .withf(move |p, a, event| {
                *p == pid
                    && *a == assignee
                    && event.topic == topics::TASKS_COMPLETED
                    && event.payload["data"]["award"] == 30
            })
            .times(1)
            .returning(|_, _, _| Ok(true));

        let service = TaskService::new(
            Arc::new(tasks),
            Arc::new(MockReplicaStore::new()),
            AssigneePolicy::AnyAccount,
        );

        let err = service.complete(Uuid::new_v4(), pid).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let done = service.complete(assignee, pid).await.unwrap();
        assert!(done.completed);
    }

    #[tokio::test]
    async fn test_reshuffle_emits_one_event_per_open_task() {
        let worker = account(Role::Worker);
        let worker_pid = worker.pid;
        let open = vec![open_task(Uuid::new_v4()), open_task(Uuid::new_v4())];
        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_open_tasks()
            .returning(move || Ok(open.clone()));
        tasks
            .expect_reassign()
            .withf(move |assignments, events| {
                assignments.len() == 2
                    && events.len() == 2
                    && assignments.iter().all(|(_, a)| *a == worker_pid)
                    && events.iter().all(|e| e.topic == topics::TASKS_RESHUFFLED)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = TaskService::new(
            Arc::new(tasks),
            Arc::new(replica_with(vec![worker])),
            AssigneePolicy::AnyAccount,
        );

        assert_eq!(service.reshuffle().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reshuffle_with_nothing_open_skips_replica() {
        let mut tasks = MockTaskRepository::new();
        tasks.expect_open_tasks().returning(|| Ok(vec![]));
        let mut replica = MockReplicaStore::new();
        replica.expect_list().never();

        let service = TaskService::new(
            Arc::new(tasks),
            Arc::new(replica),
            AssigneePolicy::AnyAccount,
        );
        assert_eq!(service.reshuffle().await.unwrap(), 0);
    }
}
