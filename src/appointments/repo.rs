use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::dto::{AppointmentQuery, CreateAppointmentRequest};
use super::repo_types::{Appointment, AppointmentStatus};

/// Restricts a listing to one patient and/or one provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentScope {
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
}

pub enum Booking {
    Booked(Appointment),
    /// The provider already has a live appointment in that slot.
    Conflict(Uuid),
}

pub async fn list(
    db: &PgPool,
    scope: AppointmentScope,
    q: &AppointmentQuery,
) -> anyhow::Result<Vec<Appointment>> {
    let rows = sqlx::query_as::<_, Appointment>(
        r#"
        SELECT id, patient_id, provider_id, start_time, end_time, status, is_virtual,
               reason, location, notes, created_at
          FROM appointments
         WHERE ($1::uuid IS NULL OR patient_id = $1)
           AND ($2::uuid IS NULL OR provider_id = $2)
           AND ($3::timestamptz IS NULL OR start_time >= $3)
           AND ($4::timestamptz IS NULL OR start_time < $4)
           AND ($5::appointment_status IS NULL OR status = $5)
         ORDER BY start_time ASC
        "#,
    )
    .bind(scope.patient_id)
    .bind(scope.provider_id)
    .bind(q.from)
    .bind(q.to)
    .bind(q.status)
    .fetch_all(db)
    .await
    .context("list appointments")?;
    Ok(rows)
}

pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Appointment>> {
    let row = sqlx::query_as::<_, Appointment>(
        r#"
        SELECT id, patient_id, provider_id, start_time, end_time, status, is_virtual,
               reason, location, notes, created_at
          FROM appointments
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("get appointment")?;
    Ok(row)
}

/// Inserts the appointment unless it overlaps another non-cancelled one for
/// the same provider. Bookings for one provider are serialized with an
/// advisory lock held for the transaction.
pub async fn create(
    db: &PgPool,
    patient_id: Uuid,
    provider_id: Uuid,
    req: &CreateAppointmentRequest,
) -> anyhow::Result<Booking> {
    let mut tx = db.begin().await.context("begin tx")?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(provider_id)
        .execute(&mut *tx)
        .await
        .context("lock provider schedule")?;

    let clash: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id
          FROM appointments
         WHERE provider_id = $1
           AND status <> 'cancelled'
           AND start_time < $3
           AND end_time > $2
         LIMIT 1
        "#,
    )
    .bind(provider_id)
    .bind(req.start_time)
    .bind(req.end_time)
    .fetch_optional(&mut *tx)
    .await
    .context("check overlapping appointments")?;

    if let Some((existing,)) = clash {
        return Ok(Booking::Conflict(existing));
    }

    let row = sqlx::query_as::<_, Appointment>(
        r#"
        INSERT INTO appointments (patient_id, provider_id, start_time, end_time, is_virtual,
                                  reason, location, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, patient_id, provider_id, start_time, end_time, status, is_virtual,
                  reason, location, notes, created_at
        "#,
    )
    .bind(patient_id)
    .bind(provider_id)
    .bind(req.start_time)
    .bind(req.end_time)
    .bind(req.is_virtual)
    .bind(req.reason.as_deref())
    .bind(req.location.as_deref())
    .bind(req.notes.as_deref())
    .fetch_one(&mut *tx)
    .await
    .context("insert appointment")?;

    tx.commit().await.context("commit tx")?;
    Ok(Booking::Booked(row))
}

/// Moves `from` to `to`. Returns `None` when the row is no longer in `from`.
pub async fn set_status(
    db: &PgPool,
    id: Uuid,
    from: AppointmentStatus,
    to: AppointmentStatus,
    notes: Option<&str>,
) -> anyhow::Result<Option<Appointment>> {
    let row = sqlx::query_as::<_, Appointment>(
        r#"
        UPDATE appointments
           SET status = $3, notes = COALESCE($4, notes)
         WHERE id = $1 AND status = $2
        RETURNING id, patient_id, provider_id, start_time, end_time, status, is_virtual,
                  reason, location, notes, created_at
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(notes)
    .fetch_optional(db)
    .await
    .context("update appointment status")?;
    Ok(row)
}
