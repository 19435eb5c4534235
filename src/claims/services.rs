use std::collections::BTreeMap;

use super::dto::{ClaimsSummary, CreateClaimRequest, ReviewClaimRequest, ReviewDecision};
use super::repo_types::{Claim, ClaimStatus, RiskLevel};
use crate::error::{AppError, AppResult};

/// Claims scoring at or above this count as high risk.
pub const HIGH_RISK_THRESHOLD: i32 = 70;

fn check_score(name: &str, score: i32) -> AppResult<()> {
    if (0..=100).contains(&score) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!("{name} must be between 0 and 100")))
    }
}

pub fn validate_new_claim(req: &CreateClaimRequest) -> AppResult<()> {
    if !req.claimed_amount.is_finite() || req.claimed_amount <= 0.0 {
        return Err(AppError::bad_request("claimedAmount must be positive"));
    }
    check_score("riskScore", req.risk_score)
}

pub fn ensure_flaggable(claim: &Claim) -> AppResult<()> {
    if claim.status.is_finalized() {
        return Err(AppError::conflict(format!(
            "Cannot flag a claim that is {}",
            claim.status.as_str()
        )));
    }
    Ok(())
}

/// Result of an insurer decision, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub status: ClaimStatus,
    pub approved_amount: f64,
    pub notes: Option<String>,
}

pub fn resolve_review(claim: &Claim, req: &ReviewClaimRequest) -> AppResult<ReviewOutcome> {
    if !claim.status.is_open() {
        return Err(AppError::conflict(format!(
            "Claim is already {}",
            claim.status.as_str()
        )));
    }

    if let Some(amount) = req.approved_amount {
        if !amount.is_finite() || amount < 0.0 || amount > claim.claimed_amount {
            return Err(AppError::bad_request(
                "approvedAmount must be between 0 and the claimed amount",
            ));
        }
    }

    let (status, approved_amount) = match req.decision {
        ReviewDecision::Approved => (
            ClaimStatus::Approved,
            req.approved_amount.unwrap_or(claim.claimed_amount),
        ),
        ReviewDecision::PartiallyApproved => {
            let amount = req.approved_amount.ok_or_else(|| {
                AppError::bad_request("approvedAmount is required for partial approval")
            })?;
            (ClaimStatus::PartiallyApproved, amount)
        }
        ReviewDecision::Denied => (ClaimStatus::Denied, 0.0),
    };

    Ok(ReviewOutcome {
        status,
        approved_amount,
        notes: req
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
    })
}

pub fn summarize_claims(claims: &[Claim]) -> ClaimsSummary {
    let mut by_status = BTreeMap::new();
    for c in claims {
        *by_status.entry(c.status.as_str()).or_insert(0) += 1;
    }
    ClaimsSummary {
        total_claims: claims.len(),
        by_status,
        total_claimed: claims.iter().map(|c| c.claimed_amount).sum(),
        total_approved: claims.iter().filter_map(|c| c.approved_amount).sum(),
        flagged_count: claims.iter().filter(|c| c.is_flagged).count(),
        high_risk_count: claims
            .iter()
            .filter(|c| c.risk_score >= HIGH_RISK_THRESHOLD)
            .count(),
    }
}

pub fn level_for_risk_score(score: i32) -> RiskLevel {
    match score {
        s if s >= 75 => RiskLevel::Critical,
        s if s >= 50 => RiskLevel::High,
        s if s >= 25 => RiskLevel::Moderate,
        _ => RiskLevel::Low,
    }
}

pub fn validate_risk_score(score: i32) -> AppResult<()> {
    check_score("riskScore", score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    fn claim(status: ClaimStatus, claimed: f64, approved: Option<f64>, risk: i32, flagged: bool) -> Claim {
        Claim {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            service_date: datetime!(2026-02-10 0:00 UTC),
            claimed_amount: claimed,
            approved_amount: approved,
            status,
            diagnosis_codes: vec!["E11.9".into()],
            procedure_codes: vec!["99213".into()],
            risk_score: risk,
            is_flagged: flagged,
            flag_reason: None,
            reviewer_notes: None,
            submitted_at: datetime!(2026-02-11 0:00 UTC),
            reviewed_at: None,
        }
    }

    fn review(decision: ReviewDecision, amount: Option<f64>) -> ReviewClaimRequest {
        ReviewClaimRequest {
            decision,
            approved_amount: amount,
            notes: Some("  checked against policy ".into()),
        }
    }

    #[test]
    fn approval_defaults_to_claimed_amount() {
        let c = claim(ClaimStatus::Submitted, 420.0, None, 10, false);
        let out = resolve_review(&c, &review(ReviewDecision::Approved, None)).unwrap();
        assert_eq!(out.status, ClaimStatus::Approved);
        assert_eq!(out.approved_amount, 420.0);
        assert_eq!(out.notes.as_deref(), Some("checked against policy"));
    }

    #[test]
    fn approved_amount_cannot_exceed_claim() {
        let c = claim(ClaimStatus::UnderReview, 420.0, None, 10, false);
        let err = resolve_review(&c, &review(ReviewDecision::Approved, Some(420.01))).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        let err = resolve_review(&c, &review(ReviewDecision::PartiallyApproved, Some(-1.0))).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn partial_approval_needs_amount_and_denial_zeroes() {
        let c = claim(ClaimStatus::Submitted, 300.0, None, 10, false);
        assert!(resolve_review(&c, &review(ReviewDecision::PartiallyApproved, None)).is_err());
        let partial = resolve_review(&c, &review(ReviewDecision::PartiallyApproved, Some(120.0))).unwrap();
        assert_eq!(partial.status, ClaimStatus::PartiallyApproved);
        assert_eq!(partial.approved_amount, 120.0);
        let denied = resolve_review(&c, &review(ReviewDecision::Denied, None)).unwrap();
        assert_eq!(denied.status, ClaimStatus::Denied);
        assert_eq!(denied.approved_amount, 0.0);
    }

    #[test]
    fn decided_claims_cannot_be_reviewed_again() {
        let c = claim(ClaimStatus::Paid, 300.0, Some(300.0), 10, false);
        let err = resolve_review(&c, &review(ReviewDecision::Denied, None)).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }

    #[test]
    fn flagging_rules() {
        assert!(ensure_flaggable(&claim(ClaimStatus::Submitted, 1.0, None, 0, false)).is_ok());
        assert!(ensure_flaggable(&claim(ClaimStatus::Approved, 1.0, Some(1.0), 0, false)).is_ok());
        let err = ensure_flaggable(&claim(ClaimStatus::Denied, 1.0, Some(0.0), 0, false)).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }

    #[test]
    fn summary_counts() {
        let claims = vec![
            claim(ClaimStatus::Submitted, 100.0, None, 80, true),
            claim(ClaimStatus::Approved, 200.0, Some(200.0), 70, false),
            claim(ClaimStatus::PartiallyApproved, 300.0, Some(150.0), 20, false),
            claim(ClaimStatus::Submitted, 50.0, None, 69, true),
        ];
        let s = summarize_claims(&claims);
        assert_eq!(s.total_claims, 4);
        assert_eq!(s.by_status.get("submitted"), Some(&2));
        assert_eq!(s.by_status.get("approved"), Some(&1));
        assert_eq!(s.by_status.get("denied"), None);
        assert_eq!(s.total_claimed, 650.0);
        assert_eq!(s.total_approved, 350.0);
        assert_eq!(s.flagged_count, 2);
        assert_eq!(s.high_risk_count, 2);
    }

    #[test]
    fn new_claim_validation() {
        let req: CreateClaimRequest = serde_json::from_value(serde_json::json!({
            "patientId": Uuid::new_v4(),
            "serviceDate": "2026-02-10T09:00:00Z",
            "claimedAmount": 0.0
        }))
        .unwrap();
        assert!(validate_new_claim(&req).is_err());

        let req: CreateClaimRequest = serde_json::from_value(serde_json::json!({
            "patientId": Uuid::new_v4(),
            "serviceDate": "2026-02-10T09:00:00Z",
            "claimedAmount": 125.5,
            "riskScore": 101
        }))
        .unwrap();
        assert!(validate_new_claim(&req).is_err());
    }

    #[test]
    fn risk_levels_by_score() {
        assert_eq!(level_for_risk_score(0), RiskLevel::Low);
        assert_eq!(level_for_risk_score(25), RiskLevel::Moderate);
        assert_eq!(level_for_risk_score(50), RiskLevel::High);
        assert_eq!(level_for_risk_score(99), RiskLevel::Critical);
    }
}
