use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{ActivityRequest, EngagementOverview, InterventionRequest, UpdateEngagementRequest};
use super::repo;
use super::repo_types::CaregiverEngagement;
use super::services::{resolve_update, sort_for_review, summarize};
use crate::{
    auth::{AuthUser, Role},
    error::{AppError, AppResult},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/caregiver-engagement", get(overview))
        .route("/caregiver-engagement/me", get(my_engagement))
        .route("/caregiver-engagement/:id", get(get_engagement).put(update_engagement))
        .route("/caregiver-engagement/:id/activity", post(record_activity))
        .route("/caregiver-engagement/:id/interventions", post(add_intervention))
}

/// Loads a row and checks the caller may see it: providers see all, caregivers their own.
async fn load_visible(state: &AppState, auth: &AuthUser, id: Uuid) -> AppResult<CaregiverEngagement> {
    auth.require_role(&[Role::Provider, Role::Caregiver])?;
    let row = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Engagement record not found"))?;
    if auth.role == Role::Caregiver && row.caregiver_id != auth.id {
        return Err(AppError::forbidden("Caregivers can only access their own records"));
    }
    Ok(row)
}

#[instrument(skip(state))]
pub async fn overview(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<EngagementOverview>> {
    auth.require_role(&[Role::Provider])?;
    let mut caregivers = repo::list_all(&state.db).await?;
    sort_for_review(&mut caregivers);
    let summary = summarize(&caregivers, OffsetDateTime::now_utc());
    Ok(Json(EngagementOverview { summary, caregivers }))
}

#[instrument(skip(state))]
pub async fn my_engagement(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<CaregiverEngagement>>> {
    auth.require_role(&[Role::Caregiver])?;
    Ok(Json(repo::list_by_caregiver(&state.db, auth.id).await?))
}

#[instrument(skip(state))]
pub async fn get_engagement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CaregiverEngagement>> {
    Ok(Json(load_visible(&state, &auth, id).await?))
}

#[instrument(skip(state, body))]
pub async fn update_engagement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateEngagementRequest>,
) -> AppResult<Json<CaregiverEngagement>> {
    let update = resolve_update(body)?;
    load_visible(&state, &auth, id).await?;

    let row = repo::update(&state.db, id, &update).await?;
    info!(engagement_id = %id, burnout_risk = row.burnout_risk, "engagement updated");
    Ok(Json(row))
}

#[instrument(skip(state))]
pub async fn record_activity(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ActivityRequest>,
) -> AppResult<Json<CaregiverEngagement>> {
    auth.require_role(&[Role::Caregiver])?;
    load_visible(&state, &auth, id).await?;
    Ok(Json(repo::record_activity(&state.db, id, body.kind).await?))
}

#[instrument(skip(state, body))]
pub async fn add_intervention(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<InterventionRequest>,
) -> AppResult<Json<CaregiverEngagement>> {
    auth.require_role(&[Role::Provider])?;
    let intervention = body.intervention.trim();
    if intervention.is_empty() {
        return Err(AppError::bad_request("intervention is required"));
    }
    load_visible(&state, &auth, id).await?;

    let row = repo::add_intervention(&state.db, id, intervention).await?;
    info!(engagement_id = %id, provider_id = %auth.id, "intervention added");
    Ok(Json(row))
}
