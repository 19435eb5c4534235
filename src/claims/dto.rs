use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{ClaimStatus, RiskLevel};

#[derive(Debug, Default, Deserialize)]
pub struct ClaimQuery {
    pub status: Option<ClaimStatus>,
    pub flagged: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClaimRequest {
    pub patient_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub service_date: OffsetDateTime,
    pub claimed_amount: f64,
    #[serde(default)]
    pub diagnosis_codes: Vec<String>,
    #[serde(default)]
    pub procedure_codes: Vec<String>,
    /// Score from upstream scoring, 0..=100.
    #[serde(default)]
    pub risk_score: i32,
}

#[derive(Debug, Deserialize)]
pub struct FlagClaimRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    PartiallyApproved,
    Denied,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewClaimRequest {
    pub decision: ReviewDecision,
    pub approved_amount: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsSummary {
    pub total_claims: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub total_claimed: f64,
    pub total_approved: f64,
    pub flagged_count: usize,
    pub high_risk_count: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessmentQuery {
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRiskAssessmentRequest {
    pub patient_id: Uuid,
    pub risk_score: i32,
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub factors: Vec<String>,
    pub notes: Option<String>,
}
