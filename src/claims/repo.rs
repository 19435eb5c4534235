use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::dto::{ClaimQuery, CreateClaimRequest, CreateRiskAssessmentRequest};
use super::repo_types::{Claim, RiskAssessment, RiskLevel};
use super::services::ReviewOutcome;

/// Restricts a claim listing to one patient and/or one provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClaimScope {
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
}

pub async fn list(db: &PgPool, scope: ClaimScope, q: &ClaimQuery) -> anyhow::Result<Vec<Claim>> {
    let rows = sqlx::query_as::<_, Claim>(
        r#"
        SELECT id, patient_id, provider_id, service_date, claimed_amount, approved_amount, status,
               diagnosis_codes, procedure_codes, risk_score, is_flagged, flag_reason,
               reviewer_notes, submitted_at, reviewed_at
          FROM claims
         WHERE ($1::uuid IS NULL OR patient_id = $1)
           AND ($2::uuid IS NULL OR provider_id = $2)
           AND ($3::claim_status IS NULL OR status = $3)
           AND ($4::boolean IS NULL OR is_flagged = $4)
         ORDER BY submitted_at DESC
        "#,
    )
    .bind(scope.patient_id)
    .bind(scope.provider_id)
    .bind(q.status)
    .bind(q.flagged)
    .fetch_all(db)
    .await
    .context("list claims")?;
    Ok(rows)
}

pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Claim>> {
    let row = sqlx::query_as::<_, Claim>(
        r#"
        SELECT id, patient_id, provider_id, service_date, claimed_amount, approved_amount, status,
               diagnosis_codes, procedure_codes, risk_score, is_flagged, flag_reason,
               reviewer_notes, submitted_at, reviewed_at
          FROM claims
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("get claim")?;
    Ok(row)
}

pub async fn create(
    db: &PgPool,
    provider_id: Uuid,
    req: &CreateClaimRequest,
) -> anyhow::Result<Claim> {
    let row = sqlx::query_as::<_, Claim>(
        r#"
        INSERT INTO claims (patient_id, provider_id, service_date, claimed_amount,
                            diagnosis_codes, procedure_codes, risk_score)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, patient_id, provider_id, service_date, claimed_amount, approved_amount, status,
                  diagnosis_codes, procedure_codes, risk_score, is_flagged, flag_reason,
                  reviewer_notes, submitted_at, reviewed_at
        "#,
    )
    .bind(req.patient_id)
    .bind(provider_id)
    .bind(req.service_date)
    .bind(req.claimed_amount)
    .bind(&req.diagnosis_codes)
    .bind(&req.procedure_codes)
    .bind(req.risk_score)
    .fetch_one(db)
    .await
    .context("insert claim")?;
    Ok(row)
}

const FLAG_SQL: &str = r#"
        UPDATE claims
           SET is_flagged = TRUE, flag_reason = $2, status = 'under_review'
         WHERE id = $1 AND status NOT IN ('denied', 'paid')
        RETURNING id, patient_id, provider_id, service_date, claimed_amount, approved_amount, status,
                  diagnosis_codes, procedure_codes, risk_score, is_flagged, flag_reason,
                  reviewer_notes, submitted_at, reviewed_at
        "#;

const REVIEW_SQL: &str = r#"
        UPDATE claims
           SET status = $2, approved_amount = $3, reviewer_notes = COALESCE($4, reviewer_notes),
               reviewed_at = now()
         WHERE id = $1 AND status IN ('submitted', 'under_review')
        RETURNING id, patient_id, provider_id, service_date, claimed_amount, approved_amount, status,
                  diagnosis_codes, procedure_codes, risk_score, is_flagged, flag_reason,
                  reviewer_notes, submitted_at, reviewed_at
        "#;

/// Flags a claim that is not finalized. `None` when it was denied or paid meanwhile.
pub async fn flag(db: &PgPool, id: Uuid, reason: &str) -> anyhow::Result<Option<Claim>> {
    let row = sqlx::query_as::<_, Claim>(FLAG_SQL)
        .bind(id)
        .bind(reason)
        .fetch_optional(db)
        .await
        .context("flag claim")?;
    Ok(row)
}

/// Records a decision on an open claim. `None` when it was decided meanwhile.
pub async fn review(
    db: &PgPool,
    id: Uuid,
    outcome: &ReviewOutcome,
) -> anyhow::Result<Option<Claim>> {
    let row = sqlx::query_as::<_, Claim>(REVIEW_SQL)
        .bind(id)
        .bind(outcome.status)
        .bind(outcome.approved_amount)
        .bind(outcome.notes.as_deref())
        .fetch_optional(db)
        .await
        .context("review claim")?;
    Ok(row)
}

// ---- risk assessments ----

pub async fn list_risk_assessments(
    db: &PgPool,
    patient_id: Option<Uuid>,
) -> anyhow::Result<Vec<RiskAssessment>> {
    let rows = sqlx::query_as::<_, RiskAssessment>(
        r#"
        SELECT id, patient_id, assessed_by, risk_score, risk_level, factors, notes, assessed_at
          FROM risk_assessments
         WHERE ($1::uuid IS NULL OR patient_id = $1)
         ORDER BY risk_score DESC, assessed_at DESC
        "#,
    )
    .bind(patient_id)
    .fetch_all(db)
    .await
    .context("list risk assessments")?;
    Ok(rows)
}

pub async fn create_risk_assessment(
    db: &PgPool,
    assessed_by: Uuid,
    level: RiskLevel,
    req: &CreateRiskAssessmentRequest,
) -> anyhow::Result<RiskAssessment> {
    let row = sqlx::query_as::<_, RiskAssessment>(
        r#"
        INSERT INTO risk_assessments (patient_id, assessed_by, risk_score, risk_level, factors, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, patient_id, assessed_by, risk_score, risk_level, factors, notes, assessed_at
        "#,
    )
    .bind(req.patient_id)
    .bind(assessed_by)
    .bind(req.risk_score)
    .bind(level)
    .bind(&req.factors)
    .bind(req.notes.as_deref())
    .fetch_one(db)
    .await
    .context("insert risk assessment")?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::repo_types::ClaimStatus;

    const ALL: [ClaimStatus; 6] = [
        ClaimStatus::Submitted,
        ClaimStatus::UnderReview,
        ClaimStatus::Approved,
        ClaimStatus::PartiallyApproved,
        ClaimStatus::Denied,
        ClaimStatus::Paid,
    ];

    /// Status literals listed after `marker` in the WHERE clause.
    fn guarded_statuses<'a>(sql: &'a str, marker: &str) -> Vec<&'a str> {
        let start = sql.find(marker).expect("guard present") + marker.len();
        let end = start + sql[start..].find(')').expect("closing paren");
        sql[start..end]
            .split(',')
            .map(|s| s.trim().trim_matches('\''))
            .collect()
    }

    #[test]
    fn flag_update_refuses_exactly_the_finalized_statuses() {
        let excluded = guarded_statuses(FLAG_SQL, "status NOT IN (");
        for status in ALL {
            assert_eq!(
                excluded.contains(&status.as_str()),
                status.is_finalized(),
                "{}",
                status.as_str()
            );
        }
    }

    #[test]
    fn review_update_only_touches_open_claims() {
        let allowed = guarded_statuses(REVIEW_SQL, "status IN (");
        for status in ALL {
            assert_eq!(
                allowed.contains(&status.as_str()),
                status.is_open(),
                "{}",
                status.as_str()
            );
        }
    }
}
