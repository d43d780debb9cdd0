//! Transaction boundary spanning account and credential writes.
//!
//! [`UnitOfWork::execute`] opens one database transaction and hands the
//! operation a [`Scope`] whose repository views are bound to it. The scope
//! borrows the transaction for the `'c` lifetime chosen by `execute`, so it
//! cannot be returned from the operation or used after commit/rollback.

use chrono::{DateTime, Utc};
use sea_orm::{
    prelude::DateTimeWithTimeZone, DatabaseTransaction, DbErr, TransactionError, TransactionTrait,
};
use std::{future::Future, pin::Pin, sync::Arc};
use uuid::Uuid;

use crate::{
    domain::{Provider, Source},
    entities::{accounts, credentials},
    repo::{accounts::AccountsRepo, credentials::CredentialsRepo},
    state::DatabaseClient,
};

pub type ScopeFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

pub struct UnitOfWork {
    db: Arc<dyn DatabaseClient>,
    accounts: Arc<dyn AccountsRepo>,
    credentials: Arc<dyn CredentialsRepo>,
}

impl UnitOfWork {
    pub fn new(
        db: Arc<dyn DatabaseClient>,
        accounts: Arc<dyn AccountsRepo>,
        credentials: Arc<dyn CredentialsRepo>,
    ) -> Self {
        Self {
            db,
            accounts,
            credentials,
        }
    }

    /// Runs `operation` in a single transaction. Commits when it returns `Ok`;
    /// otherwise rolls back and returns the operation's error as-is. Failures to
    /// begin or commit are converted through `E: From<DbErr>`.
    pub async fn execute<F, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(Scope<'c>) -> ScopeFuture<'c, T, E> + Send,
        T: Send,
        E: std::error::Error + From<DbErr> + Send,
    {
        let accounts = self.accounts.clone();
        let credentials = self.credentials.clone();

        self.db
            .conn()
            .transaction::<_, T, E>(move |txn| {
                operation(Scope {
                    txn,
                    accounts,
                    credentials,
                })
            })
            .await
            .map_err(|err| match err {
                TransactionError::Connection(err) => E::from(err),
                TransactionError::Transaction(err) => err,
            })
    }
}

/// Repository handles bound to one open transaction.
pub struct Scope<'c> {
    txn: &'c DatabaseTransaction,
    accounts: Arc<dyn AccountsRepo>,
    credentials: Arc<dyn CredentialsRepo>,
}

impl<'c> Scope<'c> {
    pub fn accounts(&self) -> ScopedAccounts<'_> {
        ScopedAccounts {
            txn: self.txn,
            repo: self.accounts.as_ref(),
        }
    }

    pub fn credentials(&self) -> ScopedCredentials<'_> {
        ScopedCredentials {
            txn: self.txn,
            repo: self.credentials.as_ref(),
        }
    }
}

pub struct ScopedAccounts<'s> {
    txn: &'s DatabaseTransaction,
    repo: &'s dyn AccountsRepo,
}

impl ScopedAccounts<'_> {
    pub async fn create(&self, model: accounts::ActiveModel) -> Result<accounts::Model, DbErr> {
        self.repo.insert_with_txn(self.txn, model).await
    }

    pub async fn find_including_deleted(
        &self,
        id: Uuid,
    ) -> Result<Option<accounts::Model>, DbErr> {
        self.repo.find_including_deleted_with_txn(self.txn, id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<accounts::Model>, DbErr> {
        self.repo.find_by_email_with_txn(self.txn, email).await
    }
}

pub struct ScopedCredentials<'s> {
    txn: &'s DatabaseTransaction,
    repo: &'s dyn CredentialsRepo,
}

impl ScopedCredentials<'_> {
    pub async fn create(
        &self,
        model: credentials::ActiveModel,
    ) -> Result<credentials::Model, DbErr> {
        self.repo.insert_with_txn(self.txn, model).await
    }

    pub async fn find_by_provider(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr> {
        self.repo
            .find_by_provider_subject_with_txn(self.txn, provider, subject)
            .await
    }
}

/// Builds the pair of rows written when an identity is first seen.
pub fn new_identity(
    now: DateTime<Utc>,
    account: NewAccount,
    provider: Provider,
    subject: String,
    password_hash: Option<String>,
) -> (accounts::ActiveModel, credentials::ActiveModel) {
    let account_id = Uuid::new_v4();
    let now: DateTimeWithTimeZone = now.into();

    let account_model = accounts::ActiveModel {
        id: sea_orm::Set(account_id),
        email: sea_orm::Set(account.email),
        phone: sea_orm::Set(account.phone),
        avatar_url: sea_orm::Set(None),
        source: sea_orm::Set(account.source.as_str().to_string()),
        onboarded_at: sea_orm::Set(None),
        created_at: sea_orm::Set(now),
        updated_at: sea_orm::Set(now),
        last_active_at: sea_orm::Set(None),
        deleted_at: sea_orm::Set(None),
    };

    let credential_model = credentials::ActiveModel {
        id: sea_orm::Set(Uuid::new_v4()),
        account_id: sea_orm::Set(account_id),
        provider: sea_orm::Set(provider.as_str().to_string()),
        provider_subject: sea_orm::Set(subject),
        password_hash: sea_orm::Set(password_hash),
        created_at: sea_orm::Set(now),
        updated_at: sea_orm::Set(now),
    };

    (account_model, credential_model)
}

#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Source,
}
