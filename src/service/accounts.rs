use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DbErr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{entities::accounts, repo::accounts::AccountsRepo};

#[async_trait]
pub trait AccountsService: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<accounts::Model>, DbErr>;
    /// Returns `false` when the account does not exist or is already deleted.
    async fn soft_delete(&self, id: Uuid) -> Result<bool, DbErr>;
}

pub struct AccountsServiceImpl {
    accounts_repo: Arc<dyn AccountsRepo>,
}

impl AccountsServiceImpl {
    pub fn new(accounts_repo: Arc<dyn AccountsRepo>) -> Self {
        Self { accounts_repo }
    }
}

#[async_trait]
impl AccountsService for AccountsServiceImpl {
    async fn get(&self, id: Uuid) -> Result<Option<accounts::Model>, DbErr> {
        self.accounts_repo.find_by_id(id).await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, DbErr> {
        let deleted = self.accounts_repo.soft_delete(id, Utc::now()).await?;
        if deleted {
            info!(account_id = %id, "account soft-deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Provider, Source},
        repo::unit_of_work::{new_identity, NewAccount, UnitOfWork},
        test_support::{memory_db, row_counts, sea_orm_repos},
    };
    use sea_orm::SqlErr;

    #[tokio::test]
    async fn soft_deleted_accounts_are_hidden_and_keep_their_email() {
        let db = memory_db().await;
        let (accounts_repo, credentials_repo) = sea_orm_repos(&db);
        let uow = UnitOfWork::new(db.clone(), accounts_repo.clone(), credentials_repo);
        let service = AccountsServiceImpl::new(accounts_repo.clone());

        let create = |subject: &'static str| {
            new_identity(
                Utc::now(),
                NewAccount {
                    email: Some("hana@example.com".to_string()),
                    phone: None,
                    source: Source::Web,
                },
                Provider::Wechat,
                subject.to_string(),
                None,
            )
        };

        let (account, credential) = create("openid-a");
        let first = uow
            .execute(move |scope| {
                Box::pin(async move {
                    let account = scope.accounts().create(account).await?;
                    scope.credentials().create(credential).await?;
                    Ok::<_, DbErr>(account)
                })
            })
            .await
            .unwrap();

        assert!(service.get(first.id).await.unwrap().is_some());
        assert!(service.soft_delete(first.id).await.unwrap());
        assert!(!service.soft_delete(first.id).await.unwrap());
        assert!(service.get(first.id).await.unwrap().is_none());
        assert!(accounts_repo
            .find_including_deleted(first.id)
            .await
            .unwrap()
            .and_then(|account| account.deleted_at)
            .is_some());

        let (account, credential) = create("openid-b");
        let err = uow
            .execute(move |scope| {
                Box::pin(async move {
                    scope.accounts().create(account).await?;
                    scope.credentials().create(credential).await?;
                    Ok::<_, DbErr>(())
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.sql_err(),
            Some(SqlErr::UniqueConstraintViolation(_))
        ));
        assert!(accounts_repo
            .find_by_email("hana@example.com")
            .await
            .unwrap()
            .is_none());
        assert_eq!(row_counts(&db).await, (1, 1));
    }
}
