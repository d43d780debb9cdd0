use sea_orm::DatabaseConnection;
use sea_orm_migration::prelude::*;

use super::{accounts::Accounts, execute_raw};

pub async fn apply(manager: &SchemaManager<'_>, conn: &DatabaseConnection) -> Result<(), DbErr> {
    if manager.has_table("credentials").await? {
        return Ok(());
    }

    manager
        .create_table(
            Table::create()
                .table(Credentials::Table)
                .if_not_exists()
                .col(ColumnDef::new(Credentials::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(Credentials::AccountId).uuid().not_null())
                .col(ColumnDef::new(Credentials::Provider).string().not_null())
                .col(
                    ColumnDef::new(Credentials::ProviderSubject)
                        .string()
                        .not_null(),
                )
                .col(ColumnDef::new(Credentials::PasswordHash).string())
                .col(
                    ColumnDef::new(Credentials::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(Credentials::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("credentials_account_id_fkey")
                        .from(Credentials::Table, Credentials::AccountId)
                        .to(Accounts::Table, Accounts::Id),
                )
                .to_owned(),
        )
        .await?;

    execute_raw(
        conn,
        "CREATE UNIQUE INDEX IF NOT EXISTS credentials_unique_subject \
         ON credentials (provider, provider_subject)",
    )
    .await?;

    execute_raw(
        conn,
        "CREATE UNIQUE INDEX IF NOT EXISTS credentials_unique_provider \
         ON credentials (account_id, provider)",
    )
    .await?;

    Ok(())
}

#[derive(Iden)]
enum Credentials {
    Table,
    Id,
    AccountId,
    Provider,
    ProviderSubject,
    PasswordHash,
    CreatedAt,
    UpdatedAt,
}
