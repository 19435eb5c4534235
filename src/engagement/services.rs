use std::cmp::Reverse;

use time::{Duration, OffsetDateTime};

use super::dto::{EngagementSummary, UpdateEngagementRequest};
use super::repo_types::{CaregiverEngagement, EngagementLevel};
use crate::error::{AppError, AppResult};

/// Burnout risk at or above this marks a caregiver as at risk.
pub const AT_RISK_THRESHOLD: i32 = 60;
pub const ACTIVE_WINDOW_DAYS: i64 = 7;

const HIGH_ENGAGEMENT_FROM: i32 = 70;
const MEDIUM_ENGAGEMENT_FROM: i32 = 40;

pub fn level_for_score(score: i32) -> EngagementLevel {
    if score >= HIGH_ENGAGEMENT_FROM {
        EngagementLevel::High
    } else if score >= MEDIUM_ENGAGEMENT_FROM {
        EngagementLevel::Medium
    } else {
        EngagementLevel::Low
    }
}

pub fn is_at_risk(row: &CaregiverEngagement) -> bool {
    row.burnout_risk >= AT_RISK_THRESHOLD
}

/// Low engagement first, then highest burnout risk.
pub fn sort_for_review(rows: &mut [CaregiverEngagement]) {
    rows.sort_by_key(|r| (r.engagement_level, Reverse(r.burnout_risk)));
}

pub fn summarize(rows: &[CaregiverEngagement], now: OffsetDateTime) -> EngagementSummary {
    let total = rows.len();
    let average_engagement = if total == 0 {
        0.0
    } else {
        let sum: i64 = rows.iter().map(|r| i64::from(r.engagement_score)).sum();
        ((sum as f64 / total as f64) * 10.0).round() / 10.0
    };
    let cutoff = now - Duration::days(ACTIVE_WINDOW_DAYS);

    EngagementSummary {
        total_caregivers: total,
        average_engagement,
        at_risk_count: rows.iter().filter(|r| is_at_risk(r)).count(),
        active_this_week: rows
            .iter()
            .filter(|r| r.last_active_at.is_some_and(|t| t >= cutoff))
            .count(),
    }
}

fn check_percent(name: &str, value: Option<i32>) -> AppResult<()> {
    match value {
        Some(v) if !(0..=100).contains(&v) => {
            Err(AppError::bad_request(format!("{name} must be between 0 and 100")))
        }
        _ => Ok(()),
    }
}

/// Validated update; the level is derived from the score when only the score is given.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementUpdate {
    pub engagement_score: Option<i32>,
    pub engagement_level: Option<EngagementLevel>,
    pub burnout_risk: Option<i32>,
    pub stress_factors: Option<Vec<String>>,
}

pub fn resolve_update(req: UpdateEngagementRequest) -> AppResult<EngagementUpdate> {
    check_percent("engagementScore", req.engagement_score)?;
    check_percent("burnoutRisk", req.burnout_risk)?;

    let engagement_level = req
        .engagement_level
        .or_else(|| req.engagement_score.map(level_for_score));
    let stress_factors = req.stress_factors.map(|v| {
        v.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });

    Ok(EngagementUpdate {
        engagement_score: req.engagement_score,
        engagement_level,
        burnout_risk: req.burnout_risk,
        stress_factors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    fn row(score: i32, level: EngagementLevel, burnout: i32, last_active: Option<OffsetDateTime>) -> CaregiverEngagement {
        CaregiverEngagement {
            id: Uuid::new_v4(),
            caregiver_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            engagement_score: score,
            engagement_level: level,
            burnout_risk: burnout,
            stress_factors: vec!["sleep".into()],
            interventions: vec![],
            check_ins: 0,
            tasks_completed: 0,
            messages_sent: 0,
            resources_viewed: 0,
            last_active_at: last_active,
            updated_at: datetime!(2026-03-01 0:00 UTC),
        }
    }

    #[test]
    fn at_risk_count_uses_inclusive_threshold() {
        let now = datetime!(2026-03-14 12:00 UTC);
        let rows = vec![
            row(80, EngagementLevel::High, 59, None),
            row(50, EngagementLevel::Medium, 60, None),
            row(20, EngagementLevel::Low, 95, None),
        ];
        let s = summarize(&rows, now);
        assert_eq!(s.at_risk_count, 2);
        assert_eq!(s.at_risk_count, rows.iter().filter(|r| r.burnout_risk >= 60).count());
    }

    #[test]
    fn summary_average_and_weekly_activity() {
        let now = datetime!(2026-03-14 12:00 UTC);
        let rows = vec![
            row(80, EngagementLevel::High, 10, Some(datetime!(2026-03-13 9:00 UTC))),
            row(55, EngagementLevel::Medium, 30, Some(datetime!(2026-03-07 12:00 UTC))),
            row(20, EngagementLevel::Low, 70, Some(datetime!(2026-03-01 0:00 UTC))),
            row(30, EngagementLevel::Low, 40, None),
        ];
        let s = summarize(&rows, now);
        assert_eq!(s.total_caregivers, 4);
        // 185 / 4 = 46.25
        assert_eq!(s.average_engagement, 46.3);
        // exactly seven days ago still counts
        assert_eq!(s.active_this_week, 2);
    }

    #[test]
    fn empty_summary() {
        let s = summarize(&[], datetime!(2026-03-14 12:00 UTC));
        assert_eq!(s.total_caregivers, 0);
        assert_eq!(s.average_engagement, 0.0);
    }

    #[test]
    fn review_order_is_level_then_burnout_desc() {
        let mut rows = vec![
            row(90, EngagementLevel::High, 80, None),
            row(20, EngagementLevel::Low, 30, None),
            row(50, EngagementLevel::Medium, 65, None),
            row(25, EngagementLevel::Low, 85, None),
        ];
        sort_for_review(&mut rows);
        let order: Vec<_> = rows.iter().map(|r| (r.engagement_level, r.burnout_risk)).collect();
        assert_eq!(
            order,
            vec![
                (EngagementLevel::Low, 85),
                (EngagementLevel::Low, 30),
                (EngagementLevel::Medium, 65),
                (EngagementLevel::High, 80),
            ]
        );
    }

    #[test]
    fn level_derivation() {
        assert_eq!(level_for_score(100), EngagementLevel::High);
        assert_eq!(level_for_score(70), EngagementLevel::High);
        assert_eq!(level_for_score(69), EngagementLevel::Medium);
        assert_eq!(level_for_score(40), EngagementLevel::Medium);
        assert_eq!(level_for_score(39), EngagementLevel::Low);
    }

    #[test]
    fn resolve_update_validates_and_derives() {
        let upd = resolve_update(UpdateEngagementRequest {
            engagement_score: Some(45),
            stress_factors: Some(vec![" finances ".into(), "".into()]),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(upd.engagement_level, Some(EngagementLevel::Medium));
        assert_eq!(upd.stress_factors, Some(vec!["finances".to_string()]));

        let explicit = resolve_update(UpdateEngagementRequest {
            engagement_score: Some(45),
            engagement_level: Some(EngagementLevel::Low),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(explicit.engagement_level, Some(EngagementLevel::Low));

        let err = resolve_update(UpdateEngagementRequest {
            burnout_risk: Some(101),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
