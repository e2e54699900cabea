use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqlitePool};

use crate::services::knowledge::{VocabularyEntry, VocabularyStatus};

const MAX_BATCH_SIZE: usize = 500;

const ENTRY_COLUMNS: &str =
    r#""id","learnerId","word","status","translation","createdAt","updatedAt""#;

pub async fn find_entry<'e, E>(
    executor: E,
    learner_id: &str,
    word: &str,
) -> Result<Option<VocabularyEntry>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"SELECT {ENTRY_COLUMNS} FROM "vocabulary_entries" WHERE "learnerId" = ? AND "word" = ? LIMIT 1"#
    );
    let row = sqlx::query(&sql)
        .bind(learner_id)
        .bind(word)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(map_entry_row).transpose()
}

pub async fn insert_entry<'e, E>(executor: E, entry: &VocabularyEntry) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO "vocabulary_entries"
          ("id","learnerId","word","status","translation","createdAt","updatedAt")
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.learner_id)
    .bind(&entry.word)
    .bind(entry.status.as_str())
    .bind(entry.translation.as_deref())
    .bind(&entry.created_at)
    .bind(&entry.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn update_entry<'e, E>(executor: E, entry: &VocabularyEntry) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE "vocabulary_entries"
        SET "status" = ?, "translation" = ?, "updatedAt" = ?
        WHERE "id" = ?
        "#,
    )
    .bind(entry.status.as_str())
    .bind(entry.translation.as_deref())
    .bind(&entry.updated_at)
    .bind(&entry.id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn delete_entry<'e, E>(executor: E, learner_id: &str, word: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(r#"DELETE FROM "vocabulary_entries" WHERE "learnerId" = ? AND "word" = ?"#)
        .bind(learner_id)
        .bind(word)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Statuses of the given words for one learner; words without an entry are absent.
pub async fn statuses_for_words(
    pool: &SqlitePool,
    learner_id: &str,
    words: &[String],
) -> Result<HashMap<String, VocabularyStatus>, sqlx::Error> {
    let mut out = HashMap::with_capacity(words.len());

    for chunk in words.chunks(MAX_BATCH_SIZE) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"SELECT "word","status" FROM "vocabulary_entries" WHERE "learnerId" = "#,
        );
        qb.push_bind(learner_id);
        qb.push(r#" AND "word" IN ("#);
        {
            let mut sep = qb.separated(", ");
            for word in chunk {
                sep.push_bind(word);
            }
        }
        qb.push(")");

        let rows = qb.build().fetch_all(pool).await?;
        for row in &rows {
            let word: String = row.try_get("word")?;
            let status = parse_status(&row.try_get::<String, _>("status")?)?;
            out.insert(word, status);
        }
    }

    Ok(out)
}

pub async fn count_by_status(
    pool: &SqlitePool,
    learner_id: &str,
) -> Result<HashMap<VocabularyStatus, i64>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "status", COUNT(*) as "count"
        FROM "vocabulary_entries"
        WHERE "learnerId" = ?
        GROUP BY "status"
        "#,
    )
    .bind(learner_id)
    .fetch_all(pool)
    .await?;

    let mut out = HashMap::new();
    for row in &rows {
        let status = parse_status(&row.try_get::<String, _>("status")?)?;
        out.insert(status, row.try_get::<i64, _>("count")?);
    }
    Ok(out)
}

pub async fn list_entries(
    pool: &SqlitePool,
    learner_id: &str,
    status: Option<VocabularyStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<VocabularyEntry>, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        r#"SELECT {ENTRY_COLUMNS} FROM "vocabulary_entries" WHERE "learnerId" = "#
    ));
    qb.push_bind(learner_id);
    if let Some(status) = status {
        qb.push(r#" AND "status" = "#);
        qb.push_bind(status.as_str());
    }
    qb.push(r#" ORDER BY "updatedAt" DESC, "word" ASC LIMIT "#);
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(map_entry_row).collect()
}

/// Most recently updated words with the given status.
pub async fn recent_words(
    pool: &SqlitePool,
    learner_id: &str,
    status: VocabularyStatus,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT "word" FROM "vocabulary_entries"
        WHERE "learnerId" = ? AND "status" = ?
        ORDER BY "updatedAt" DESC, "word" ASC
        LIMIT ?
        "#,
    )
    .bind(learner_id)
    .bind(status.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await
}

fn map_entry_row(row: &SqliteRow) -> Result<VocabularyEntry, sqlx::Error> {
    Ok(VocabularyEntry {
        id: row.try_get("id")?,
        learner_id: row.try_get("learnerId")?,
        word: row.try_get("word")?,
        status: parse_status(&row.try_get::<String, _>("status")?)?,
        translation: row.try_get("translation")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

fn parse_status(value: &str) -> Result<VocabularyStatus, sqlx::Error> {
    VocabularyStatus::parse(value)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown vocabulary status '{value}'").into()))
}
