use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "claim_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Submitted,
    UnderReview,
    Approved,
    PartiallyApproved,
    Denied,
    Paid,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::UnderReview => "under_review",
            ClaimStatus::Approved => "approved",
            ClaimStatus::PartiallyApproved => "partially_approved",
            ClaimStatus::Denied => "denied",
            ClaimStatus::Paid => "paid",
        }
    }

    /// Still waiting on an insurer decision.
    pub fn is_open(&self) -> bool {
        matches!(self, ClaimStatus::Submitted | ClaimStatus::UnderReview)
    }

    /// No further insurer action applies, not even flagging.
    pub fn is_finalized(&self) -> bool {
        matches!(self, ClaimStatus::Denied | ClaimStatus::Paid)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub service_date: OffsetDateTime,
    pub claimed_amount: f64,
    pub approved_amount: Option<f64>,
    pub status: ClaimStatus,
    pub diagnosis_codes: Vec<String>,
    pub procedure_codes: Vec<String>,
    pub risk_score: i32,
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
    pub reviewer_notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "risk_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub assessed_by: Uuid,
    pub risk_score: i32,
    pub risk_level: RiskLevel,
    pub factors: Vec<String>,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub assessed_at: OffsetDateTime,
}
