use sqlx::{Row, SqlitePool};

use crate::services::explanation::StoredExplanation;

pub async fn find(pool: &SqlitePool, word: &str) -> Result<Option<StoredExplanation>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "word","meaning","exampleSentence","exampleTranslation","difficultyRating","createdAt"
        FROM "explanation_cache"
        WHERE "word" = ?
        "#,
    )
    .bind(word)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(StoredExplanation {
        word: row.try_get("word")?,
        meaning: row.try_get("meaning")?,
        example_sentence: row.try_get("exampleSentence")?,
        example_translation: row.try_get("exampleTranslation")?,
        difficulty_rating: row.try_get::<i64, _>("difficultyRating")?.clamp(1, 10) as u8,
        created_at: row.try_get("createdAt")?,
    }))
}

/// Returns `false` when another writer already stored the word.
pub async fn insert_if_absent(pool: &SqlitePool, entry: &StoredExplanation) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO "explanation_cache"
          ("word","meaning","exampleSentence","exampleTranslation","difficultyRating","createdAt")
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT ("word") DO NOTHING
        "#,
    )
    .bind(&entry.word)
    .bind(&entry.meaning)
    .bind(&entry.example_sentence)
    .bind(&entry.example_translation)
    .bind(i64::from(entry.difficulty_rating))
    .bind(&entry.created_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "explanation_cache""#)
        .fetch_one(pool)
        .await
}

pub async fn recent_words(pool: &SqlitePool, limit: i64) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"SELECT "word" FROM "explanation_cache" ORDER BY "createdAt" DESC, "word" ASC LIMIT ?"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
