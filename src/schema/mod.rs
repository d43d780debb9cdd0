use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use sea_orm_migration::prelude::*;

mod accounts;
mod credentials;

/// Creates tables and indexes that are missing. Safe to run on every start.
pub async fn apply(conn: &DatabaseConnection) -> Result<(), DbErr> {
    let manager = SchemaManager::new(conn);

    accounts::apply(&manager, conn).await?;
    credentials::apply(&manager, conn).await?;

    if conn.get_database_backend() == DatabaseBackend::Postgres {
        apply_updated_at_triggers(conn).await?;
    }

    Ok(())
}

pub(crate) async fn execute_raw(conn: &DatabaseConnection, sql: &str) -> Result<(), DbErr> {
    conn.execute(Statement::from_string(
        conn.get_database_backend(),
        sql.to_string(),
    ))
    .await?;
    Ok(())
}

async fn apply_updated_at_triggers(conn: &DatabaseConnection) -> Result<(), DbErr> {
    execute_raw(
        conn,
        r#"
CREATE OR REPLACE FUNCTION set_updated_at()
RETURNS trigger AS $$
BEGIN
  NEW.updated_at = now();
  RETURN NEW;
END;
$$ LANGUAGE plpgsql;
"#,
    )
    .await?;

    for table in ["accounts", "credentials"] {
        let trigger_name = format!("trg_{}_set_updated_at", table);
        execute_raw(
            conn,
            &format!(
                r#"
DO $$
BEGIN
  IF NOT EXISTS (
    SELECT 1
    FROM pg_trigger
    WHERE tgname = '{trigger_name}'
      AND tgrelid = '{table}'::regclass
  ) THEN
    EXECUTE 'CREATE TRIGGER {trigger_name}
             BEFORE UPDATE ON {table}
             FOR EACH ROW
             EXECUTE FUNCTION set_updated_at()';
  END IF;
END $$;
"#
            ),
        )
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use sea_orm::{ConnectOptions, Database};

    #[tokio::test]
    async fn apply_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1);
        let conn = Database::connect(options).await?;

        super::apply(&conn).await?;
        super::apply(&conn).await?;

        let manager = sea_orm_migration::SchemaManager::new(&conn);
        assert!(manager.has_table("accounts").await?);
        assert!(manager.has_table("credentials").await?);
        Ok(())
    }
}
