use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::dto::{JwtKeys, TokenKind};
use super::repo_types::Role;
use crate::error::{AppError, AppResult};

/// Authenticated caller, taken from a bearer access token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err(AppError::Unauthorized("Invalid or expired token".into()));
            }
        };

        if claims.kind != TokenKind::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }

        Ok(AuthUser {
            id: claims.sub,
            role: claims.role,
        })
    }
}

impl AuthUser {
    pub fn require_role(&self, allowed: &[Role]) -> AppResult<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            warn!(user_id = %self.id, role = ?self.role, "role not permitted");
            Err(AppError::forbidden("Insufficient permissions"))
        }
    }

    /// Which patient a request is about. Patients are pinned to themselves,
    /// everyone else has to say.
    pub fn patient_scope(&self, requested: Option<Uuid>) -> AppResult<Uuid> {
        match self.role {
            Role::Patient => match requested {
                Some(id) if id != self.id => Err(AppError::forbidden("Patients can only access their own records")),
                _ => Ok(self.id),
            },
            _ => requested.ok_or_else(|| AppError::bad_request("patientId is required")),
        }
    }

    pub fn ensure_patient_access(&self, patient_id: Uuid) -> AppResult<()> {
        match self.role {
            Role::Patient if patient_id != self.id => {
                Err(AppError::forbidden("Patients can only access their own records"))
            }
            _ => Ok(()),
        }
    }
}
