use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    ClaimQuery, ClaimsSummary, CreateClaimRequest, CreateRiskAssessmentRequest, FlagClaimRequest,
    ReviewClaimRequest, RiskAssessmentQuery,
};
use super::repo::{self, ClaimScope};
use super::repo_types::{Claim, RiskAssessment};
use super::services::{
    ensure_flaggable, level_for_risk_score, resolve_review, summarize_claims, validate_new_claim,
    validate_risk_score,
};
use crate::{
    auth::{AuthUser, Role},
    error::{AppError, AppResult},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/claims", get(list_claims).post(create_claim))
        .route("/claims/summary", get(claims_summary))
        .route("/claims/:id", get(get_claim))
        .route("/claims/:id/flag", post(flag_claim))
        .route("/claims/:id/review", post(review_claim))
        .route(
            "/risk-assessments",
            get(list_risk_assessments).post(create_risk_assessment),
        )
}

fn scope_for(auth: &AuthUser) -> ClaimScope {
    match auth.role {
        Role::Insurer => ClaimScope::default(),
        Role::Provider => ClaimScope {
            provider_id: Some(auth.id),
            ..Default::default()
        },
        _ => ClaimScope {
            patient_id: Some(auth.id),
            ..Default::default()
        },
    }
}

fn can_see(auth: &AuthUser, claim: &Claim) -> bool {
    match auth.role {
        Role::Insurer => true,
        Role::Provider => claim.provider_id == auth.id,
        Role::Patient => claim.patient_id == auth.id,
        Role::Caregiver => false,
    }
}

async fn load_claim(state: &AppState, id: Uuid) -> AppResult<Claim> {
    repo::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Claim not found"))
}

#[instrument(skip(state))]
pub async fn list_claims(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<ClaimQuery>,
) -> AppResult<Json<Vec<Claim>>> {
    auth.require_role(&[Role::Insurer, Role::Provider, Role::Patient])?;
    Ok(Json(repo::list(&state.db, scope_for(&auth), &q).await?))
}

#[instrument(skip(state))]
pub async fn claims_summary(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ClaimsSummary>> {
    auth.require_role(&[Role::Insurer])?;
    let claims = repo::list(&state.db, ClaimScope::default(), &ClaimQuery::default()).await?;
    Ok(Json(summarize_claims(&claims)))
}

#[instrument(skip(state))]
pub async fn get_claim(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Claim>> {
    let claim = load_claim(&state, id).await?;
    if !can_see(&auth, &claim) {
        // Not revealing existence to other parties.
        return Err(AppError::not_found("Claim not found"));
    }
    Ok(Json(claim))
}

#[instrument(skip(state, body))]
pub async fn create_claim(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateClaimRequest>,
) -> AppResult<(StatusCode, Json<Claim>)> {
    auth.require_role(&[Role::Provider])?;
    validate_new_claim(&body)?;

    let claim = repo::create(&state.db, auth.id, &body).await?;
    info!(claim_id = %claim.id, provider_id = %auth.id, amount = claim.claimed_amount, "claim submitted");
    Ok((StatusCode::CREATED, Json(claim)))
}

#[instrument(skip(state, body))]
pub async fn flag_claim(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<FlagClaimRequest>,
) -> AppResult<Json<Claim>> {
    auth.require_role(&[Role::Insurer])?;
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(AppError::bad_request("reason is required"));
    }

    let claim = load_claim(&state, id).await?;
    ensure_flaggable(&claim)?;

    let claim = repo::flag(&state.db, id, reason)
        .await?
        .ok_or_else(|| AppError::conflict("Claim was finalized concurrently"))?;
    warn!(claim_id = %id, insurer_id = %auth.id, %reason, "claim flagged");
    Ok(Json(claim))
}

#[instrument(skip(state, body))]
pub async fn review_claim(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewClaimRequest>,
) -> AppResult<Json<Claim>> {
    auth.require_role(&[Role::Insurer])?;
    let claim = load_claim(&state, id).await?;
    let outcome = resolve_review(&claim, &body)?;

    let claim = repo::review(&state.db, id, &outcome)
        .await?
        .ok_or_else(|| AppError::conflict("Claim was decided concurrently"))?;
    info!(claim_id = %id, status = claim.status.as_str(), "claim reviewed");
    Ok(Json(claim))
}

#[instrument(skip(state))]
pub async fn list_risk_assessments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<RiskAssessmentQuery>,
) -> AppResult<Json<Vec<RiskAssessment>>> {
    let patient_id = match auth.role {
        Role::Insurer | Role::Provider => q.patient_id,
        Role::Patient => Some(auth.patient_scope(q.patient_id)?),
        Role::Caregiver => return Err(AppError::forbidden("Insufficient permissions")),
    };
    Ok(Json(repo::list_risk_assessments(&state.db, patient_id).await?))
}

#[instrument(skip(state, body))]
pub async fn create_risk_assessment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateRiskAssessmentRequest>,
) -> AppResult<(StatusCode, Json<RiskAssessment>)> {
    auth.require_role(&[Role::Insurer, Role::Provider])?;
    validate_risk_score(body.risk_score)?;
    let level = body
        .risk_level
        .unwrap_or_else(|| level_for_risk_score(body.risk_score));

    let row = repo::create_risk_assessment(&state.db, auth.id, level, &body).await?;
    Ok((StatusCode::CREATED, Json(row)))
}
