/// Account administration; every change emits its identity event
use std::sync::Arc;

use event_schema::{AccountCreated, AccountDeleted, AccountUpdated, Role};
use tracing::info;
use transactional_outbox::OutboxEvent;
use uuid::Uuid;
use validator::Validate;

use crate::db::AccountRepository;
use crate::error::{IdentityError, Result};
use crate::models::{AccountView, CreateAccountRequest, NewAccount, UpdateAccountRequest};
use crate::security::hash_password;

pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    /// True while no account exists. Only a hint: [`Self::create_first`]
    /// decides atomically.
    pub async fn is_bootstrap(&self) -> Result<bool> {
        Ok(self.accounts.count().await? == 0)
    }

    pub async fn create(&self, request: CreateAccountRequest) -> Result<AccountView> {
        let (account, event) = Self::prepare(request)?;

        let created = self.accounts.create(&account, &event).await?;
        info!(pid = %created.pid, role = %created.role, "Account created");
        Ok(created.into())
    }

    /// Create the very first account, with any role. `None` once any
    /// account exists.
    pub async fn create_first(&self, request: CreateAccountRequest) -> Result<Option<AccountView>> {
        let (account, event) = Self::prepare(request)?;

        let Some(created) = self.accounts.create_first(&account, &event).await? else {
            return Ok(None);
        };
        info!(pid = %created.pid, role = %created.role, "Bootstrap account created");
        Ok(Some(created.into()))
    }

    fn prepare(request: CreateAccountRequest) -> Result<(NewAccount, OutboxEvent)> {
        request.validate()?;

        let account = NewAccount {
            pid: Uuid::new_v4(),
            username: request.username,
            password_hash: hash_password(&request.password)?,
            email: request.email,
            role: request.role,
        };
        let event = OutboxEvent::from_event(AccountCreated {
            pid: account.pid,
            role: account.role,
            email: account.email.clone(),
        })?;
        Ok((account, event))
    }

    pub async fn list(&self) -> Result<Vec<AccountView>> {
        let accounts = self.accounts.list().await?;
        Ok(accounts.into_iter().map(AccountView::from).collect())
    }

    pub async fn update(&self, pid: Uuid, request: UpdateAccountRequest) -> Result<()> {
        request.validate()?;

        let event = OutboxEvent::from_event(AccountUpdated {
            pid,
            role: request.role,
            email: request.email.clone(),
        })?;

        if !self
            .accounts
            .update(pid, &request.email, request.role, &event)
            .await?
        {
            return Err(IdentityError::AccountNotFound);
        }
        info!(pid = %pid, role = %request.role, "Account updated");
        Ok(())
    }

    pub async fn delete(&self, actor: Uuid, pid: Uuid) -> Result<()> {
        if actor == pid {
            return Err(IdentityError::SelfDeletion);
        }

        let event = OutboxEvent::from_event(AccountDeleted { pid })?;
        if !self.accounts.delete(pid, &event).await? {
            return Err(IdentityError::AccountNotFound);
        }
        info!(pid = %pid, deleted_by = %actor, "Account deleted");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.accounts.ping().await
    }

    /// Role of an existing account, used by the in-process directory.
    pub async fn role_of(&self, pid: Uuid) -> Result<Option<Role>> {
        Ok(self.accounts.find_by_pid(pid).await?.map(|a| a.role))
    }
}
