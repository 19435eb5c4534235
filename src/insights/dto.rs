use serde::Deserialize;
use uuid::Uuid;

use super::repo_types::Severity;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightQuery {
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub unread_only: bool,
}

fn default_severity() -> Severity {
    Severity::Info
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInsightRequest {
    pub patient_id: Uuid,
    pub category: String,
    pub title: String,
    pub message: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub recommendations: Vec<String>,
}
