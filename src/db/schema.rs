use sqlx::SqlitePool;

use super::DbInitError;

pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
pub const SCHEMA_VERSION: &str = "1";

pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for line in sql.lines() {
        if !in_single_quote && !in_double_quote && line.trim_start().starts_with("--") {
            continue;
        }

        for ch in line.chars() {
            match ch {
                '\'' if !in_double_quote => in_single_quote = !in_single_quote,
                '"' if !in_single_quote => in_double_quote = !in_double_quote,
                ';' if !in_single_quote && !in_double_quote => {
                    let stmt = current.trim();
                    if !stmt.is_empty() {
                        statements.push(stmt.to_string());
                    }
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        current.push('\n');
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

pub async fn current_version(pool: &SqlitePool) -> Option<String> {
    sqlx::query_scalar(r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#)
        .fetch_optional(pool)
        .await
        .unwrap_or(None)
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<(), DbInitError> {
    if current_version(pool).await.as_deref() == Some(SCHEMA_VERSION) {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for stmt in split_sql_statements(SCHEMA_SQL) {
        sqlx::query(&stmt).execute(&mut *tx).await?;
    }
    sqlx::query(
        r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#,
    )
    .bind(SCHEMA_VERSION)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(version = SCHEMA_VERSION, "sqlite schema applied");
    Ok(())
}
