use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::dto::CreateInsightRequest;
use super::repo_types::HealthInsight;

pub async fn list(
    db: &PgPool,
    patient_id: Uuid,
    unread_only: bool,
) -> anyhow::Result<Vec<HealthInsight>> {
    let rows = sqlx::query_as::<_, HealthInsight>(
        r#"
        SELECT id, patient_id, author_id, category, title, message, severity, recommendations,
               is_read, is_dismissed, created_at
          FROM health_insights
         WHERE patient_id = $1
           AND NOT is_dismissed
           AND (NOT $2 OR NOT is_read)
         ORDER BY created_at DESC
        "#,
    )
    .bind(patient_id)
    .bind(unread_only)
    .fetch_all(db)
    .await
    .context("list health insights")?;
    Ok(rows)
}

pub async fn owner(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT patient_id FROM health_insights WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
        .context("get insight owner")?;
    Ok(row.map(|(p,)| p))
}

pub async fn create(
    db: &PgPool,
    author_id: Uuid,
    req: &CreateInsightRequest,
) -> anyhow::Result<HealthInsight> {
    let row = sqlx::query_as::<_, HealthInsight>(
        r#"
        INSERT INTO health_insights (patient_id, author_id, category, title, message, severity,
                                     recommendations)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, patient_id, author_id, category, title, message, severity, recommendations,
                  is_read, is_dismissed, created_at
        "#,
    )
    .bind(req.patient_id)
    .bind(author_id)
    .bind(&req.category)
    .bind(&req.title)
    .bind(&req.message)
    .bind(req.severity)
    .bind(&req.recommendations)
    .fetch_one(db)
    .await
    .context("insert health insight")?;
    Ok(row)
}

pub async fn mark_read(db: &PgPool, id: Uuid) -> anyhow::Result<HealthInsight> {
    let row = sqlx::query_as::<_, HealthInsight>(
        r#"
        UPDATE health_insights SET is_read = TRUE
         WHERE id = $1
        RETURNING id, patient_id, author_id, category, title, message, severity, recommendations,
                  is_read, is_dismissed, created_at
        "#,
    )
    .bind(id)
    .fetch_one(db)
    .await
    .context("mark insight read")?;
    Ok(row)
}

pub async fn dismiss(db: &PgPool, id: Uuid) -> anyhow::Result<HealthInsight> {
    let row = sqlx::query_as::<_, HealthInsight>(
        r#"
        UPDATE health_insights SET is_dismissed = TRUE
         WHERE id = $1
        RETURNING id, patient_id, author_id, category, title, message, severity, recommendations,
                  is_read, is_dismissed, created_at
        "#,
    )
    .bind(id)
    .fetch_one(db)
    .await
    .context("dismiss insight")?;
    Ok(row)
}
