use sea_orm::DatabaseConnection;
use sea_orm_migration::prelude::*;

use super::execute_raw;

pub async fn apply(manager: &SchemaManager<'_>, conn: &DatabaseConnection) -> Result<(), DbErr> {
    if manager.has_table("accounts").await? {
        return Ok(());
    }

    manager
        .create_table(
            Table::create()
                .table(Accounts::Table)
                .if_not_exists()
                .col(ColumnDef::new(Accounts::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(Accounts::Email).string())
                .col(ColumnDef::new(Accounts::Phone).string())
                .col(ColumnDef::new(Accounts::AvatarUrl).string())
                .col(ColumnDef::new(Accounts::Source).string().not_null())
                .col(ColumnDef::new(Accounts::OnboardedAt).timestamp_with_time_zone())
                .col(
                    ColumnDef::new(Accounts::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(Accounts::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .col(ColumnDef::new(Accounts::LastActiveAt).timestamp_with_time_zone())
                .col(ColumnDef::new(Accounts::DeletedAt).timestamp_with_time_zone())
                .to_owned(),
        )
        .await?;

    // Covers soft-deleted rows too: a deleted account keeps its email and phone.
    execute_raw(
        conn,
        "CREATE UNIQUE INDEX IF NOT EXISTS accounts_email_unique \
         ON accounts (email)",
    )
    .await?;

    execute_raw(
        conn,
        "CREATE UNIQUE INDEX IF NOT EXISTS accounts_phone_unique \
         ON accounts (phone)",
    )
    .await?;

    Ok(())
}

#[derive(Iden)]
pub(super) enum Accounts {
    Table,
    Id,
    Email,
    Phone,
    AvatarUrl,
    Source,
    OnboardedAt,
    CreatedAt,
    UpdatedAt,
    LastActiveAt,
    DeletedAt,
}
