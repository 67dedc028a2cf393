//! Test Harness Module
//!
//! Wires identity-service and task-service together in one process:
//! - In-memory account, credential, replica and task stores
//! - The task service talks to the issuer through `LocalIssuerClient`
//! - Identity outbox rows are fed to the real replica consumer through a
//!   queue-backed message source

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use event_schema::{AccountEvent, Role};
use identity_service::db::{AccountRepository, ServiceRepository};
use identity_service::models::{
    Account, CreateAccountRequest, NewAccount, ServiceCredential,
};
use identity_service::security::{ManualClock, TokenSigner};
use identity_service::services::LocalIssuerClient;
use identity_service::{IdentityApp, IdentityError};
use task_service::consumers::{
    spawn_replica_consumer, BrokerError, ConsumerConfig, ConsumerHealth, HealthSnapshot,
    InboundMessage, MessageSource,
};
use task_service::db::{ReplicaStore, TaskRepository};
use task_service::handlers::ClientCredentials;
use task_service::models::{ReplicaAccount, Task};
use task_service::services::AssigneePolicy;
use task_service::{TaskApp, TaskAppSettings};
use transactional_outbox::OutboxEvent;
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse battery";

const SECRET: &[u8] = b"integration-signing-secret-32-bytes!";

// ============================================================================
// Identity side
// ============================================================================

#[derive(Default)]
pub struct MemoryAccounts {
    accounts: Mutex<Vec<Account>>,
    pub outbox: Mutex<Vec<OutboxEvent>>,
}

#[async_trait]
impl AccountRepository for MemoryAccounts {
    async fn create(
        &self,
        account: &NewAccount,
        event: &OutboxEvent,
    ) -> identity_service::Result<Account> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.iter().any(|a| a.username == account.username) {
            return Err(IdentityError::UsernameTaken);
        }
        let created = Account {
            pid: account.pid,
            username: account.username.clone(),
            password_hash: account.password_hash.clone(),
            email: account.email.clone(),
            role: account.role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        accounts.push(created.clone());
        self.outbox.lock().unwrap().push(event.clone());
        Ok(created)
    }

    async fn create_first(
        &self,
        account: &NewAccount,
        event: &OutboxEvent,
    ) -> identity_service::Result<Option<Account>> {
        let mut accounts = self.accounts.lock().unwrap();
        if !accounts.is_empty() {
            return Ok(None);
        }
        let created = Account {
            pid: account.pid,
            username: account.username.clone(),
            password_hash: account.password_hash.clone(),
            email: account.email.clone(),
            role: account.role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        accounts.push(created.clone());
        self.outbox.lock().unwrap().push(event.clone());
        Ok(Some(created))
    }

    async fn find_by_username(&self, username: &str) -> identity_service::Result<Option<Account>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_by_pid(&self, pid: Uuid) -> identity_service::Result<Option<Account>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.pid == pid)
            .cloned())
    }

    async fn list(&self) -> identity_service::Result<Vec<Account>> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn count(&self) -> identity_service::Result<i64> {
        Ok(self.accounts.lock().unwrap().len() as i64)
    }

    async fn update(
        &self,
        pid: Uuid,
        email: &str,
        role: Role,
        event: &OutboxEvent,
    ) -> identity_service::Result<bool> {
        let mut accounts = self.accounts.lock().unwrap();
        let Some(account) = accounts.iter_mut().find(|a| a.pid == pid) else {
            return Ok(false);
        };
        account.email = email.to_string();
        account.role = role;
        self.outbox.lock().unwrap().push(event.clone());
        Ok(true)
    }

    async fn delete(&self, pid: Uuid, event: &OutboxEvent) -> identity_service::Result<bool> {
        let mut accounts = self.accounts.lock().unwrap();
        let before = accounts.len();
        accounts.retain(|a| a.pid != pid);
        if accounts.len() == before {
            return Ok(false);
        }
        self.outbox.lock().unwrap().push(event.clone());
        Ok(true)
    }

    async fn ping(&self) -> identity_service::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryServices {
    credentials: Mutex<Vec<ServiceCredential>>,
}

#[async_trait]
impl ServiceRepository for MemoryServices {
    async fn insert(&self, credential: &ServiceCredential) -> identity_service::Result<()> {
        self.credentials.lock().unwrap().push(*credential);
        Ok(())
    }

    async fn find(
        &self,
        client_id: Uuid,
        client_secret: Uuid,
    ) -> identity_service::Result<Option<ServiceCredential>> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == client_id && c.secret == client_secret)
            .copied())
    }

    async fn list(&self) -> identity_service::Result<Vec<ServiceCredential>> {
        Ok(self.credentials.lock().unwrap().clone())
    }
}

// ============================================================================
// Task side
// ============================================================================

#[derive(Default)]
pub struct MemoryReplica {
    accounts: Mutex<HashMap<Uuid, (Role, String)>>,
}

#[async_trait]
impl ReplicaStore for MemoryReplica {
    async fn apply(&self, event: &AccountEvent) -> task_service::Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        match event {
            AccountEvent::Created(e) => {
                accounts.insert(e.pid, (e.role, e.email.clone()));
            }
            AccountEvent::Updated(e) => {
                accounts.insert(e.pid, (e.role, e.email.clone()));
            }
            AccountEvent::Deleted(e) => {
                accounts.remove(&e.pid);
            }
        }
        Ok(())
    }

    async fn role_of(&self, pid: Uuid) -> task_service::Result<Option<Role>> {
        Ok(self.accounts.lock().unwrap().get(&pid).map(|(role, _)| *role))
    }

    async fn list(&self) -> task_service::Result<Vec<ReplicaAccount>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .map(|(pid, (role, email))| ReplicaAccount {
                pid: *pid,
                role: *role,
                email: email.clone(),
            })
            .collect())
    }

    async fn ping(&self) -> task_service::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTasks {
    tasks: Mutex<Vec<Task>>,
    pub outbox: Mutex<Vec<OutboxEvent>>,
}

#[async_trait]
impl TaskRepository for MemoryTasks {
    async fn create(&self, task: &Task, events: &[OutboxEvent]) -> task_service::Result<()> {
        self.tasks.lock().unwrap().push(task.clone());
        self.outbox.lock().unwrap().extend_from_slice(events);
        Ok(())
    }

    async fn find(&self, pid: Uuid) -> task_service::Result<Option<Task>> {
        Ok(self.tasks.lock().unwrap().iter().find(|t| t.pid == pid).cloned())
    }

    async fn list(&self) -> task_service::Result<Vec<Task>> {
        Ok(self.tasks.lock().unwrap().clone())
    }

    async fn open_tasks(&self) -> task_service::Result<Vec<Task>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| !t.completed)
            .cloned()
            .collect())
    }

    async fn complete(
        &self,
        pid: Uuid,
        assignee: Uuid,
        event: &OutboxEvent,
    ) -> task_service::Result<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks
            .iter_mut()
            .find(|t| t.pid == pid && t.assignee == assignee && !t.completed)
        {
            Some(task) => {
                task.completed = true;
                task.completed_at = Some(Utc::now());
                self.outbox.lock().unwrap().push(event.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reassign(
        &self,
        assignments: &[(Uuid, Uuid)],
        events: &[OutboxEvent],
    ) -> task_service::Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        for (pid, assignee) in assignments {
            if let Some(task) = tasks.iter_mut().find(|t| t.pid == *pid) {
                task.assignee = *assignee;
            }
        }
        self.outbox.lock().unwrap().extend_from_slice(events);
        Ok(())
    }
}

// ============================================================================
// Broker stand-in
// ============================================================================

/// Serves a fixed batch of messages, then idles.
pub struct QueueSource {
    queue: Mutex<VecDeque<InboundMessage>>,
}

impl QueueSource {
    pub fn new(messages: Vec<InboundMessage>) -> Self {
        Self {
            queue: Mutex::new(messages.into()),
        }
    }
}

#[async_trait]
impl MessageSource for QueueSource {
    async fn poll(&self, wait: StdDuration) -> Result<Option<InboundMessage>, BrokerError> {
        let next = self.queue.lock().unwrap().pop_front();
        if next.is_none() {
            tokio::time::sleep(wait).await;
        }
        Ok(next)
    }

    async fn commit(&self, _message: &InboundMessage) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// What the outbox relay would put on the wire for `event`.
pub fn to_message(event: &OutboxEvent, offset: i64) -> InboundMessage {
    InboundMessage {
        topic: event.topic.clone(),
        partition: 0,
        offset,
        key: Some(event.aggregate_id.to_string().into_bytes()),
        payload: Some(serde_json::to_vec(&event.payload).unwrap()),
    }
}

// ============================================================================
// The whole system
// ============================================================================

pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub struct Popug {
    pub clock: Arc<ManualClock>,
    pub identity: IdentityApp,
    pub identity_store: Arc<MemoryAccounts>,
    pub tasks: TaskApp,
    pub task_store: Arc<MemoryTasks>,
    pub replica: Arc<MemoryReplica>,
    pub credential: ServiceCredential,
    delivered: Mutex<usize>,
}

impl Popug {
    pub async fn new(lifetime: Duration) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let identity_store = Arc::new(MemoryAccounts::default());
        let identity = IdentityApp::new(
            identity_store.clone(),
            Arc::new(MemoryServices::default()),
            TokenSigner::new(SECRET, lifetime),
            clock.clone(),
            None,
        );
        let credential = identity.issuer.register_service().await.unwrap();

        let replica = Arc::new(MemoryReplica::default());
        let task_store = Arc::new(MemoryTasks::default());
        let tasks = TaskApp::new(
            task_store.clone(),
            replica.clone(),
            Arc::new(LocalIssuerClient::new(identity.issuer.clone())),
            ConsumerHealth::default(),
            TaskAppSettings {
                assignee_policy: AssigneePolicy::WorkersOnly,
                credentials: ClientCredentials {
                    client_id: credential.id.to_string(),
                    client_secret: credential.secret.to_string(),
                },
                verify_timeout: StdDuration::from_secs(1),
            },
            None,
        );

        Self {
            clock,
            identity,
            identity_store,
            tasks,
            task_store,
            replica,
            credential,
            delivered: Mutex::new(0),
        }
    }

    pub async fn create_account(&self, username: &str, role: Role) -> Uuid {
        self.identity
            .accounts
            .create(CreateAccountRequest {
                username: username.to_string(),
                password: PASSWORD.to_string(),
                email: format!("{}@popug.dev", username),
                role,
            })
            .await
            .unwrap()
            .pid
    }

    /// Token straight from the issuer, as the task service's client.
    pub async fn login(&self, username: &str) -> String {
        let service = self
            .identity
            .issuer
            .authenticate_service(
                Some(&self.credential.id.to_string()),
                Some(&self.credential.secret.to_string()),
            )
            .await
            .unwrap();
        self.identity
            .issuer
            .login(username, PASSWORD, &service)
            .await
            .unwrap()
    }

    fn identity_messages(&self, from: usize) -> Vec<InboundMessage> {
        self.identity_store
            .outbox
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .skip(from)
            .map(|(offset, event)| to_message(event, offset as i64))
            .collect()
    }

    /// Run the replica consumer over `messages` until each one is handled.
    pub async fn deliver(&self, messages: Vec<InboundMessage>) -> HealthSnapshot {
        let expected = messages.len() as u64;
        let handle = spawn_replica_consumer(
            QueueSource::new(messages),
            self.replica.clone(),
            ConsumerConfig {
                poll_timeout: StdDuration::from_millis(10),
                ..ConsumerConfig::default()
            },
            None,
        );
        let health = handle.health();

        let handled = |h: &HealthSnapshot| h.applied + h.ignored + h.skipped + h.failed;
        tokio::time::timeout(StdDuration::from_secs(5), async {
            while handled(&health.snapshot()) < expected {
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        handle.shutdown().await;
        health.snapshot()
    }

    /// Ship identity events published since the last call.
    pub async fn replicate(&self) -> HealthSnapshot {
        let from = *self.delivered.lock().unwrap();
        let messages = self.identity_messages(from);
        *self.delivered.lock().unwrap() = from + messages.len();
        self.deliver(messages).await
    }

    /// Redeliver the whole identity stream from the first offset.
    pub async fn replay_all(&self) -> HealthSnapshot {
        let messages = self.identity_messages(0);
        *self.delivered.lock().unwrap() = messages.len();
        self.deliver(messages).await
    }

    /// Ship pending identity events newest first.
    pub async fn replicate_reversed(&self) -> HealthSnapshot {
        let from = *self.delivered.lock().unwrap();
        let mut messages = self.identity_messages(from);
        *self.delivered.lock().unwrap() = from + messages.len();
        messages.reverse();
        self.deliver(messages).await
    }

    pub fn replica_snapshot(&self) -> HashMap<Uuid, (Role, String)> {
        self.replica.accounts.lock().unwrap().clone()
    }

    pub fn task_events(&self) -> Vec<String> {
        self.task_store
            .outbox
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}
