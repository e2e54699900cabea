use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::services::adaptation::AdaptationRecord;

const TARGET_EPSILON: f64 = 1e-6;

pub async fn insert(pool: &SqlitePool, record: &AdaptationRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "adaptation_results"
          ("id","learnerId","sourceHash","targetUnknownPercentage","adaptedText",
           "unknownPercentage","converged","attempts","createdAt")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.learner_id)
    .bind(&record.source_hash)
    .bind(record.target_unknown_percentage)
    .bind(&record.adapted_text)
    .bind(record.unknown_percentage)
    .bind(record.converged)
    .bind(i64::from(record.attempts))
    .bind(&record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Latest converged result for the same learner, source text and target.
pub async fn find_latest_converged(
    pool: &SqlitePool,
    learner_id: &str,
    source_hash: &str,
    target: f64,
) -> Result<Option<AdaptationRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id","learnerId","sourceHash","targetUnknownPercentage","adaptedText",
               "unknownPercentage","converged","attempts","createdAt"
        FROM "adaptation_results"
        WHERE "learnerId" = ? AND "sourceHash" = ?
          AND ABS("targetUnknownPercentage" - ?) < ?
          AND "converged" = 1
        ORDER BY "createdAt" DESC
        LIMIT 1
        "#,
    )
    .bind(learner_id)
    .bind(source_hash)
    .bind(target)
    .bind(TARGET_EPSILON)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(map_record_row).transpose()
}

pub async fn list_for_learner(
    pool: &SqlitePool,
    learner_id: &str,
    limit: i64,
) -> Result<Vec<AdaptationRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id","learnerId","sourceHash","targetUnknownPercentage","adaptedText",
               "unknownPercentage","converged","attempts","createdAt"
        FROM "adaptation_results"
        WHERE "learnerId" = ?
        ORDER BY "createdAt" DESC, "id" ASC
        LIMIT ?
        "#,
    )
    .bind(learner_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_record_row).collect()
}

fn map_record_row(row: &SqliteRow) -> Result<AdaptationRecord, sqlx::Error> {
    Ok(AdaptationRecord {
        id: row.try_get("id")?,
        learner_id: row.try_get("learnerId")?,
        source_hash: row.try_get("sourceHash")?,
        target_unknown_percentage: row.try_get("targetUnknownPercentage")?,
        adapted_text: row.try_get("adaptedText")?,
        unknown_percentage: row.try_get("unknownPercentage")?,
        converged: row.try_get("converged")?,
        attempts: row.try_get::<i64, _>("attempts")?.clamp(0, u32::MAX as i64) as u32,
        created_at: row.try_get("createdAt")?,
    })
}
