use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter,
};
use std::sync::Arc;

use crate::{domain::Provider, entities::credentials, state::DatabaseClient};

#[async_trait]
pub trait CredentialsRepo: Send + Sync {
    async fn insert_with_txn(
        &self,
        txn: &DatabaseTransaction,
        model: credentials::ActiveModel,
    ) -> Result<credentials::Model, DbErr>;
    async fn find_by_provider_subject(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr>;
    async fn find_by_provider_subject_with_txn(
        &self,
        txn: &DatabaseTransaction,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr>;
}

pub struct SeaOrmCredentialsRepo {
    db: Arc<dyn DatabaseClient>,
}

impl SeaOrmCredentialsRepo {
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self { db }
    }

    async fn find_on<C: ConnectionTrait>(
        conn: &C,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr> {
        credentials::Entity::find()
            .filter(credentials::Column::Provider.eq(provider.as_str()))
            .filter(credentials::Column::ProviderSubject.eq(subject))
            .one(conn)
            .await
    }
}

#[async_trait]
impl CredentialsRepo for SeaOrmCredentialsRepo {
    async fn insert_with_txn(
        &self,
        txn: &DatabaseTransaction,
        model: credentials::ActiveModel,
    ) -> Result<credentials::Model, DbErr> {
        model.insert(txn).await
    }

    async fn find_by_provider_subject(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr> {
        Self::find_on(self.db.conn(), provider, subject).await
    }

    async fn find_by_provider_subject_with_txn(
        &self,
        txn: &DatabaseTransaction,
        provider: Provider,
        subject: &str,
    ) -> Result<Option<credentials::Model>, DbErr> {
        Self::find_on(txn, provider, subject).await
    }
}
