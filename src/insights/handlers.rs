use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CreateInsightRequest, InsightQuery};
use super::repo;
use super::repo_types::HealthInsight;
use super::services::normalize_new_insight;
use crate::{
    auth::{AuthUser, Role},
    error::{AppError, AppResult},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health-insights", get(list_insights).post(create_insight))
        .route("/health-insights/:id/read", post(mark_read))
        .route("/health-insights/:id/dismiss", post(dismiss))
}

/// Only the patient an insight is about may mark or dismiss it.
async fn ensure_owner(state: &AppState, auth: &AuthUser, id: Uuid) -> AppResult<()> {
    auth.require_role(&[Role::Patient])?;
    let owner = repo::owner(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Insight not found"))?;
    auth.ensure_patient_access(owner)
}

#[instrument(skip(state))]
pub async fn list_insights(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<InsightQuery>,
) -> AppResult<Json<Vec<HealthInsight>>> {
    let patient_id = auth.patient_scope(q.patient_id)?;
    Ok(Json(repo::list(&state.db, patient_id, q.unread_only).await?))
}

#[instrument(skip(state, body))]
pub async fn create_insight(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateInsightRequest>,
) -> AppResult<(StatusCode, Json<HealthInsight>)> {
    auth.require_role(&[Role::Provider])?;
    let body = normalize_new_insight(body)?;

    let insight = repo::create(&state.db, auth.id, &body).await?;
    info!(insight_id = %insight.id, patient_id = %insight.patient_id, severity = ?insight.severity, "insight created");
    Ok((StatusCode::CREATED, Json(insight)))
}

#[instrument(skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<HealthInsight>> {
    ensure_owner(&state, &auth, id).await?;
    Ok(Json(repo::mark_read(&state.db, id).await?))
}

#[instrument(skip(state))]
pub async fn dismiss(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<HealthInsight>> {
    ensure_owner(&state, &auth, id).await?;
    Ok(Json(repo::dismiss(&state.db, id).await?))
}
