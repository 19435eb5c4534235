use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::CreateAppointmentRequest;
use super::repo_types::AppointmentStatus;
use crate::{
    auth::{AuthUser, Role},
    error::{AppError, AppResult},
};

pub fn validate_window(start: OffsetDateTime, end: OffsetDateTime) -> AppResult<()> {
    if end <= start {
        return Err(AppError::bad_request("endTime must be after startTime"));
    }
    Ok(())
}

/// Half-open intervals: back-to-back slots do not overlap.
pub fn overlaps(
    a: (OffsetDateTime, OffsetDateTime),
    b: (OffsetDateTime, OffsetDateTime),
) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Works out `(patient_id, provider_id)` for a booking made by `auth`.
pub fn resolve_parties(auth: &AuthUser, req: &CreateAppointmentRequest) -> AppResult<(Uuid, Uuid)> {
    match auth.role {
        Role::Patient => {
            let patient_id = auth.patient_scope(req.patient_id)?;
            let provider_id = req
                .provider_id
                .ok_or_else(|| AppError::bad_request("providerId is required"))?;
            Ok((patient_id, provider_id))
        }
        Role::Provider => {
            if req.provider_id.is_some_and(|id| id != auth.id) {
                return Err(AppError::forbidden("Providers can only book their own schedule"));
            }
            let patient_id = req
                .patient_id
                .ok_or_else(|| AppError::bad_request("patientId is required"))?;
            Ok((patient_id, auth.id))
        }
        Role::Caregiver => match (req.patient_id, req.provider_id) {
            (Some(patient), Some(provider)) => Ok((patient, provider)),
            _ => Err(AppError::bad_request("patientId and providerId are required")),
        },
        Role::Insurer => Err(AppError::forbidden("Insufficient permissions")),
    }
}

pub fn ensure_transition(from: AppointmentStatus, to: AppointmentStatus) -> AppResult<()> {
    if from.is_terminal() {
        return Err(AppError::conflict(format!(
            "Appointment is already {}",
            from.as_str()
        )));
    }
    if !from.can_transition_to(to) {
        return Err(AppError::conflict(format!(
            "Cannot move appointment from {} to {}",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}

/// Patients may confirm or cancel their own visits; the rest is up to the provider.
pub fn may_set_status(auth: &AuthUser, to: AppointmentStatus) -> bool {
    match auth.role {
        Role::Provider => true,
        Role::Patient => matches!(to, AppointmentStatus::Confirmed | AppointmentStatus::Cancelled),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use AppointmentStatus::*;

    fn booking(patient: Option<Uuid>, provider: Option<Uuid>) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id: patient,
            provider_id: provider,
            start_time: datetime!(2026-04-01 9:00 UTC),
            end_time: datetime!(2026-04-01 9:30 UTC),
            is_virtual: false,
            reason: None,
            location: None,
            notes: None,
        }
    }

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn window_must_move_forward() {
        let t = datetime!(2026-04-01 9:00 UTC);
        assert!(validate_window(t, t).is_err());
        assert!(validate_window(t, datetime!(2026-04-01 8:00 UTC)).is_err());
        assert!(validate_window(t, datetime!(2026-04-01 9:15 UTC)).is_ok());
    }

    #[test]
    fn overlap_is_half_open() {
        let nine = datetime!(2026-04-01 9:00 UTC);
        let half = datetime!(2026-04-01 9:30 UTC);
        let ten = datetime!(2026-04-01 10:00 UTC);
        assert!(overlaps((nine, ten), (half, ten)));
        assert!(overlaps((nine, ten), (datetime!(2026-04-01 8:00 UTC), half)));
        assert!(!overlaps((nine, half), (half, ten)));
    }

    #[test]
    fn lifecycle_transitions() {
        assert!(ensure_transition(Scheduled, Confirmed).is_ok());
        assert!(ensure_transition(Scheduled, Completed).is_ok());
        assert!(ensure_transition(Confirmed, NoShow).is_ok());
        assert!(ensure_transition(Confirmed, Scheduled).is_err());
        for terminal in [Completed, Cancelled, NoShow] {
            let err = ensure_transition(terminal, Confirmed).unwrap_err();
            assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
        }
    }

    #[test]
    fn patients_book_for_themselves() {
        let me = user(Role::Patient);
        let provider = Uuid::new_v4();
        assert_eq!(
            resolve_parties(&me, &booking(None, Some(provider))).unwrap(),
            (me.id, provider)
        );
        let err = resolve_parties(&me, &booking(Some(Uuid::new_v4()), Some(provider))).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
        assert!(resolve_parties(&me, &booking(None, None)).is_err());
    }

    #[test]
    fn providers_book_their_own_schedule() {
        let doc = user(Role::Provider);
        let patient = Uuid::new_v4();
        assert_eq!(
            resolve_parties(&doc, &booking(Some(patient), None)).unwrap(),
            (patient, doc.id)
        );
        assert!(resolve_parties(&doc, &booking(Some(patient), Some(Uuid::new_v4()))).is_err());
        assert!(resolve_parties(&user(Role::Insurer), &booking(Some(patient), Some(doc.id))).is_err());
    }

    #[test]
    fn patients_only_confirm_or_cancel() {
        let p = user(Role::Patient);
        assert!(may_set_status(&p, Cancelled));
        assert!(!may_set_status(&p, Completed));
        assert!(may_set_status(&user(Role::Provider), NoShow));
        assert!(!may_set_status(&user(Role::Caregiver), Cancelled));
    }
}
