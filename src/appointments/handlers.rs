use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{AppointmentQuery, CreateAppointmentRequest, UpdateStatusRequest};
use super::repo::{self, AppointmentScope, Booking};
use super::repo_types::Appointment;
use super::services::{ensure_transition, may_set_status, resolve_parties, validate_window};
use crate::{
    auth::{AuthUser, Role},
    error::{AppError, AppResult},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/:id/status", patch(update_status))
}

fn scope_for(auth: &AuthUser, q: &AppointmentQuery) -> AppResult<AppointmentScope> {
    Ok(match auth.role {
        Role::Provider => AppointmentScope {
            patient_id: q.patient_id,
            provider_id: Some(auth.id),
        },
        _ => AppointmentScope {
            patient_id: Some(auth.patient_scope(q.patient_id)?),
            provider_id: None,
        },
    })
}

#[instrument(skip(state))]
pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<AppointmentQuery>,
) -> AppResult<Json<Vec<Appointment>>> {
    let scope = scope_for(&auth, &q)?;
    Ok(Json(repo::list(&state.db, scope, &q).await?))
}

#[instrument(skip(state, body))]
pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateAppointmentRequest>,
) -> AppResult<(StatusCode, Json<Appointment>)> {
    validate_window(body.start_time, body.end_time)?;
    let (patient_id, provider_id) = resolve_parties(&auth, &body)?;

    match repo::create(&state.db, patient_id, provider_id, &body).await? {
        Booking::Booked(appt) => {
            info!(appointment_id = %appt.id, %patient_id, %provider_id, "appointment booked");
            Ok((StatusCode::CREATED, Json(appt)))
        }
        Booking::Conflict(existing) => {
            warn!(%provider_id, %existing, "appointment slot taken");
            Err(AppError::conflict(
                "Provider already has an appointment in that time slot",
            ))
        }
    }
}

#[instrument(skip(state, body))]
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusRequest>,
) -> AppResult<Json<Appointment>> {
    let appt = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Appointment not found"))?;

    let party = match auth.role {
        Role::Provider => appt.provider_id == auth.id,
        Role::Patient => appt.patient_id == auth.id,
        _ => false,
    };
    if !party || !may_set_status(&auth, body.status) {
        return Err(AppError::forbidden("Insufficient permissions"));
    }
    ensure_transition(appt.status, body.status)?;

    let notes = body.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let updated = repo::set_status(&state.db, id, appt.status, body.status, notes)
        .await?
        .ok_or_else(|| AppError::conflict("Appointment status changed concurrently"))?;

    info!(
        appointment_id = %id,
        from = appt.status.as_str(),
        to = updated.status.as_str(),
        "appointment status changed"
    );
    Ok(Json(updated))
}
