use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::dto::ActivityKind;
use super::repo_types::CaregiverEngagement;
use super::services::EngagementUpdate;

pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<CaregiverEngagement>> {
    let rows = sqlx::query_as::<_, CaregiverEngagement>(
        r#"
        SELECT id, caregiver_id, patient_id, engagement_score, engagement_level, burnout_risk,
               stress_factors, interventions, check_ins, tasks_completed, messages_sent,
               resources_viewed, last_active_at, updated_at
          FROM caregiver_engagements
        "#,
    )
    .fetch_all(db)
    .await
    .context("list caregiver engagement")?;
    Ok(rows)
}

pub async fn list_by_caregiver(
    db: &PgPool,
    caregiver_id: Uuid,
) -> anyhow::Result<Vec<CaregiverEngagement>> {
    let rows = sqlx::query_as::<_, CaregiverEngagement>(
        r#"
        SELECT id, caregiver_id, patient_id, engagement_score, engagement_level, burnout_risk,
               stress_factors, interventions, check_ins, tasks_completed, messages_sent,
               resources_viewed, last_active_at, updated_at
          FROM caregiver_engagements
         WHERE caregiver_id = $1
         ORDER BY updated_at DESC
        "#,
    )
    .bind(caregiver_id)
    .fetch_all(db)
    .await
    .context("list engagement by caregiver")?;
    Ok(rows)
}

pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<CaregiverEngagement>> {
    let row = sqlx::query_as::<_, CaregiverEngagement>(
        r#"
        SELECT id, caregiver_id, patient_id, engagement_score, engagement_level, burnout_risk,
               stress_factors, interventions, check_ins, tasks_completed, messages_sent,
               resources_viewed, last_active_at, updated_at
          FROM caregiver_engagements
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("get caregiver engagement")?;
    Ok(row)
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    upd: &EngagementUpdate,
) -> anyhow::Result<CaregiverEngagement> {
    let row = sqlx::query_as::<_, CaregiverEngagement>(
        r#"
        UPDATE caregiver_engagements
           SET engagement_score = COALESCE($2, engagement_score),
               engagement_level = COALESCE($3, engagement_level),
               burnout_risk = COALESCE($4, burnout_risk),
               stress_factors = COALESCE($5, stress_factors),
               updated_at = now()
         WHERE id = $1
        RETURNING id, caregiver_id, patient_id, engagement_score, engagement_level, burnout_risk,
                  stress_factors, interventions, check_ins, tasks_completed, messages_sent,
                  resources_viewed, last_active_at, updated_at
        "#,
    )
    .bind(id)
    .bind(upd.engagement_score)
    .bind(upd.engagement_level)
    .bind(upd.burnout_risk)
    .bind(upd.stress_factors.as_deref())
    .fetch_one(db)
    .await
    .context("update caregiver engagement")?;
    Ok(row)
}

pub async fn record_activity(
    db: &PgPool,
    id: Uuid,
    kind: ActivityKind,
) -> anyhow::Result<CaregiverEngagement> {
    let counter = match kind {
        ActivityKind::CheckIn => "check_ins",
        ActivityKind::Task => "tasks_completed",
        ActivityKind::Message => "messages_sent",
        ActivityKind::Resource => "resources_viewed",
    };
    let sql = format!(
        r#"
        UPDATE caregiver_engagements
           SET {counter} = {counter} + 1, last_active_at = now(), updated_at = now()
         WHERE id = $1
        RETURNING id, caregiver_id, patient_id, engagement_score, engagement_level, burnout_risk,
                  stress_factors, interventions, check_ins, tasks_completed, messages_sent,
                  resources_viewed, last_active_at, updated_at
        "#
    );
    let row = sqlx::query_as::<_, CaregiverEngagement>(&sql)
        .bind(id)
        .fetch_one(db)
        .await
        .context("record caregiver activity")?;
    Ok(row)
}

pub async fn add_intervention(
    db: &PgPool,
    id: Uuid,
    intervention: &str,
) -> anyhow::Result<CaregiverEngagement> {
    let row = sqlx::query_as::<_, CaregiverEngagement>(
        r#"
        UPDATE caregiver_engagements
           SET interventions = array_append(interventions, $2), updated_at = now()
         WHERE id = $1
        RETURNING id, caregiver_id, patient_id, engagement_score, engagement_level, burnout_risk,
                  stress_factors, interventions, check_ins, tasks_completed, messages_sent,
                  resources_viewed, last_active_at, updated_at
        "#,
    )
    .bind(id)
    .bind(intervention)
    .fetch_one(db)
    .await
    .context("add intervention")?;
    Ok(row)
}
