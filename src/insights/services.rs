use super::dto::CreateInsightRequest;
use crate::error::{AppError, AppResult};

/// Trims text fields and drops blank recommendations.
pub fn normalize_new_insight(mut req: CreateInsightRequest) -> AppResult<CreateInsightRequest> {
    for (name, value) in [
        ("category", &mut req.category),
        ("title", &mut req.title),
        ("message", &mut req.message),
    ] {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::bad_request(format!("{name} is required")));
        }
        *value = trimmed.to_string();
    }
    req.recommendations = req
        .recommendations
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    Ok(req)
}
