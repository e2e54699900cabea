use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use crate::services::knowledge::{GrammarEntry, GrammarStatus};

pub async fn find_entry<'e, E>(
    executor: E,
    learner_id: &str,
    pattern_id: &str,
) -> Result<Option<GrammarEntry>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT "id","learnerId","patternId","status","catalogVersion","createdAt","updatedAt"
        FROM "grammar_entries"
        WHERE "learnerId" = ? AND "patternId" = ?
        LIMIT 1
        "#,
    )
    .bind(learner_id)
    .bind(pattern_id)
    .fetch_optional(executor)
    .await?;
    row.as_ref().map(map_entry_row).transpose()
}

pub async fn insert_entry<'e, E>(executor: E, entry: &GrammarEntry) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO "grammar_entries"
          ("id","learnerId","patternId","status","catalogVersion","createdAt","updatedAt")
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.learner_id)
    .bind(&entry.pattern_id)
    .bind(entry.status.as_str())
    .bind(entry.catalog_version)
    .bind(&entry.created_at)
    .bind(&entry.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn update_entry<'e, E>(executor: E, entry: &GrammarEntry) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE "grammar_entries"
        SET "status" = ?, "catalogVersion" = ?, "updatedAt" = ?
        WHERE "id" = ?
        "#,
    )
    .bind(entry.status.as_str())
    .bind(entry.catalog_version)
    .bind(&entry.updated_at)
    .bind(&entry.id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_entries(pool: &SqlitePool, learner_id: &str) -> Result<Vec<GrammarEntry>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id","learnerId","patternId","status","catalogVersion","createdAt","updatedAt"
        FROM "grammar_entries"
        WHERE "learnerId" = ?
        ORDER BY "patternId" ASC
        "#,
    )
    .bind(learner_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_entry_row).collect()
}

fn map_entry_row(row: &SqliteRow) -> Result<GrammarEntry, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(GrammarEntry {
        id: row.try_get("id")?,
        learner_id: row.try_get("learnerId")?,
        pattern_id: row.try_get("patternId")?,
        status: GrammarStatus::parse(&status)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown grammar status '{status}'").into()))?,
        catalog_version: row.try_get("catalogVersion")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}
