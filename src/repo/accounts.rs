use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    prelude::DateTimeWithTimeZone, sea_query::Expr, ActiveModelTrait, ColumnTrait,
    ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{entities::accounts, state::DatabaseClient};

#[async_trait]
pub trait AccountsRepo: Send + Sync {
    async fn insert_with_txn(
        &self,
        txn: &DatabaseTransaction,
        model: accounts::ActiveModel,
    ) -> Result<accounts::Model, DbErr>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<accounts::Model>, DbErr>;
    /// Also returns soft-deleted rows; used when resolving a credential's owner.
    async fn find_including_deleted(&self, id: Uuid) -> Result<Option<accounts::Model>, DbErr>;
    async fn find_including_deleted_with_txn(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<accounts::Model>, DbErr>;
    async fn find_by_email(&self, email: &str) -> Result<Option<accounts::Model>, DbErr>;
    async fn find_by_email_with_txn(
        &self,
        txn: &DatabaseTransaction,
        email: &str,
    ) -> Result<Option<accounts::Model>, DbErr>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<accounts::Model>, DbErr>;
    async fn update(&self, model: accounts::ActiveModel) -> Result<accounts::Model, DbErr>;
    /// Returns false when the account does not exist or is already deleted.
    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DbErr>;
    async fn update_last_active_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DbErr>;
}

pub struct SeaOrmAccountsRepo {
    db: Arc<dyn DatabaseClient>,
}

impl SeaOrmAccountsRepo {
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self { db }
    }

    async fn find_live<C: ConnectionTrait>(
        conn: &C,
        column: accounts::Column,
        value: &str,
    ) -> Result<Option<accounts::Model>, DbErr> {
        accounts::Entity::find()
            .filter(column.eq(value))
            .filter(accounts::Column::DeletedAt.is_null())
            .one(conn)
            .await
    }

    async fn find_live_by_id<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
    ) -> Result<Option<accounts::Model>, DbErr> {
        accounts::Entity::find_by_id(id)
            .filter(accounts::Column::DeletedAt.is_null())
            .one(conn)
            .await
    }
}

#[async_trait]
impl AccountsRepo for SeaOrmAccountsRepo {
    async fn insert_with_txn(
        &self,
        txn: &DatabaseTransaction,
        model: accounts::ActiveModel,
    ) -> Result<accounts::Model, DbErr> {
        model.insert(txn).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<accounts::Model>, DbErr> {
        Self::find_live_by_id(self.db.conn(), id).await
    }

    async fn find_including_deleted(&self, id: Uuid) -> Result<Option<accounts::Model>, DbErr> {
        accounts::Entity::find_by_id(id).one(self.db.conn()).await
    }

    async fn find_including_deleted_with_txn(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<accounts::Model>, DbErr> {
        accounts::Entity::find_by_id(id).one(txn).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<accounts::Model>, DbErr> {
        Self::find_live(self.db.conn(), accounts::Column::Email, email).await
    }

    async fn find_by_email_with_txn(
        &self,
        txn: &DatabaseTransaction,
        email: &str,
    ) -> Result<Option<accounts::Model>, DbErr> {
        Self::find_live(txn, accounts::Column::Email, email).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<accounts::Model>, DbErr> {
        Self::find_live(self.db.conn(), accounts::Column::Phone, phone).await
    }

    async fn update(&self, model: accounts::ActiveModel) -> Result<accounts::Model, DbErr> {
        model.update(self.db.conn()).await
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DbErr> {
        let at: DateTimeWithTimeZone = at.into();
        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::DeletedAt, Expr::value(at))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(at))
            .filter(accounts::Column::Id.eq(id))
            .filter(accounts::Column::DeletedAt.is_null())
            .exec(self.db.conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn update_last_active_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DbErr> {
        let at: DateTimeWithTimeZone = at.into();
        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::LastActiveAt, Expr::value(at))
            .filter(accounts::Column::Id.eq(id))
            .exec(self.db.conn())
            .await?;
        if result.rows_affected == 0 {
            return Err(DbErr::RecordNotFound(format!("account {id} not found")));
        }
        Ok(())
    }
}
