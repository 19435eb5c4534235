use serde::{Deserialize, Serialize};

use super::repo_types::{CaregiverEngagement, EngagementLevel};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSummary {
    pub total_caregivers: usize,
    pub average_engagement: f64,
    pub at_risk_count: usize,
    pub active_this_week: usize,
}

#[derive(Debug, Serialize)]
pub struct EngagementOverview {
    pub summary: EngagementSummary,
    pub caregivers: Vec<CaregiverEngagement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEngagementRequest {
    pub engagement_score: Option<i32>,
    pub engagement_level: Option<EngagementLevel>,
    pub burnout_risk: Option<i32>,
    pub stress_factors: Option<Vec<String>>,
}

/// ReclaiMe activity a caregiver can log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    CheckIn,
    Task,
    Message,
    Resource,
}

#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    pub kind: ActivityKind,
}

#[derive(Debug, Deserialize)]
pub struct InterventionRequest {
    pub intervention: String,
}
