use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use uuid::Uuid;

use crate::{
    domain::Provider,
    entities::{accounts, credentials},
    repo::{
        accounts::{AccountsRepo, SeaOrmAccountsRepo},
        credentials::{CredentialsRepo, SeaOrmCredentialsRepo},
        unit_of_work::UnitOfWork,
    },
    state::DatabaseClient,
};

pub struct TestDatabaseClient {
    conn: DatabaseConnection,
}

impl DatabaseClient for TestDatabaseClient {
    fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}

/// A fresh in-memory SQLite database with the schema applied.
pub async fn memory_db() -> Arc<dyn DatabaseClient> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let conn = Database::connect(options)
        .await
        .expect("in-memory sqlite connect");
    crate::schema::apply(&conn).await.expect("schema apply");
    Arc::new(TestDatabaseClient { conn })
}

pub fn sea_orm_repos(
    db: &Arc<dyn DatabaseClient>,
) -> (Arc<dyn AccountsRepo>, Arc<dyn CredentialsRepo>) {
    (
        Arc::new(SeaOrmAccountsRepo::new(db.clone())),
        Arc::new(SeaOrmCredentialsRepo::new(db.clone())),
    )
}

pub fn unit_of_work_with(
    db: &Arc<dyn DatabaseClient>,
    credentials: Arc<dyn CredentialsRepo>,
) -> UnitOfWork {
    let (accounts, _) = sea_orm_repos(db);
    UnitOfWork::new(db.clone(), accounts, credentials)
}

/// (accounts, credentials) row counts.
pub async fn row_counts(db: &Arc<dyn DatabaseClient>) -> (u64, u64) {
    let accounts = accounts::Entity::find()
        .count(db.conn())
        .await
        .expect("count accounts");
    let credentials = credentials::Entity::find()
        .count(db.conn())
        .await
        .expect("count credentials");
    (accounts, credentials)
}

/// Lets reads through but fails every credential insert.
pub struct FailingInsertCredentialsRepo {
    inner: Arc<dyn CredentialsRepo>,
}

impl FailingInsertCredentialsRepo {
    pub fn new(inner: Arc<dyn CredentialsRepo>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CredentialsRepo for FailingInsertCredentialsRepo {
    async fn insert_with_txn(
        &self,
        _txn: &DatabaseTransaction,
        _model: credentials::ActiveModel,
    ) -> Result<credentials::Model, DbErr> {
        Err(DbErr::Custom("injected credential insert failure".to_string()))
    }

    async fn find_by_provider_subject(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr> {
        self.inner.find_by_provider_subject(provider, subject).await
    }

    async fn find_by_provider_subject_with_txn(
        &self,
        txn: &DatabaseTransaction,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr> {
        self.inner
            .find_by_provider_subject_with_txn(txn, provider, subject)
            .await
    }
}

/// Misses the first scoped lookup, as if a concurrent writer committed right after it.
pub struct StaleFirstLookupCredentialsRepo {
    inner: Arc<dyn CredentialsRepo>,
    missed: AtomicBool,
}

impl StaleFirstLookupCredentialsRepo {
    pub fn new(inner: Arc<dyn CredentialsRepo>) -> Self {
        Self {
            inner,
            missed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CredentialsRepo for StaleFirstLookupCredentialsRepo {
    async fn insert_with_txn(
        &self,
        txn: &DatabaseTransaction,
        model: credentials::ActiveModel,
    ) -> Result<credentials::Model, DbErr> {
        self.inner.insert_with_txn(txn, model).await
    }

    async fn find_by_provider_subject(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr> {
        self.inner.find_by_provider_subject(provider, subject).await
    }

    async fn find_by_provider_subject_with_txn(
        &self,
        txn: &DatabaseTransaction,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr> {
        if !self.missed.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner
            .find_by_provider_subject_with_txn(txn, provider, subject)
            .await
    }
}

/// Misses the first scoped email lookup, so registration reaches the insert.
pub struct StaleFirstLookupAccountsRepo {
    inner: Arc<dyn AccountsRepo>,
    missed: AtomicBool,
}

impl StaleFirstLookupAccountsRepo {
    pub fn new(inner: Arc<dyn AccountsRepo>) -> Self {
        Self {
            inner,
            missed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AccountsRepo for StaleFirstLookupAccountsRepo {
    async fn insert_with_txn(
        &self,
        txn: &DatabaseTransaction,
        model: accounts::ActiveModel,
    ) -> Result<accounts::Model, DbErr> {
        self.inner.insert_with_txn(txn, model).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<accounts::Model>, DbErr> {
        self.inner.find_by_id(id).await
    }

    async fn find_including_deleted(&self, id: Uuid) -> Result<Option<accounts::Model>, DbErr> {
        self.inner.find_including_deleted(id).await
    }

    async fn find_including_deleted_with_txn(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<accounts::Model>, DbErr> {
        self.inner.find_including_deleted_with_txn(txn, id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<accounts::Model>, DbErr> {
        self.inner.find_by_email(email).await
    }

    async fn find_by_email_with_txn(
        &self,
        txn: &DatabaseTransaction,
        email: &str,
    ) -> Result<Option<accounts::Model>, DbErr> {
        if !self.missed.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_by_email_with_txn(txn, email).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<accounts::Model>, DbErr> {
        self.inner.find_by_phone(phone).await
    }

    async fn update(&self, model: accounts::ActiveModel) -> Result<accounts::Model, DbErr> {
        self.inner.update(model).await
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DbErr> {
        self.inner.soft_delete(id, at).await
    }

    async fn update_last_active_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DbErr> {
        self.inner.update_last_active_at(id, at).await
    }
}
