use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{appointments, auth, claims, engagement, insights, meal_plans, recipes};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(recipes::router())
                .merge(meal_plans::router())
                .merge(engagement::router())
                .merge(claims::router())
                .merge(appointments::router())
                .merge(insights::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{JwtKeys, Role};
    use axum::{
        body::Body,
        extract::FromRef,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn bearer(role: Role) -> String {
        let keys = JwtKeys::from_ref(&AppState::fake());
        let token = keys.sign_access(Uuid::new_v4(), role).unwrap();
        format!("Bearer {token}")
    }

    async fn send(req: Request<Body>) -> (StatusCode, Value) {
        let res = build_app(AppState::fake()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, auth: Option<String>, body: Value) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(a) = auth {
            req = req.header(header::AUTHORIZATION, a);
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let res = build_app(AppState::fake())
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn missing_token_is_401_with_error_body() {
        let (status, body) = send(
            Request::get("/api/heredibles/meal-plans")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected_before_lookup() {
        let uri = format!("/api/heredibles/meals/{}/rate", Uuid::new_v4());
        let (status, body) = send(post_json(&uri, Some(bearer(Role::Patient)), json!({ "rating": 7 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Rating"));
    }

    #[tokio::test]
    async fn appointment_must_end_after_it_starts() {
        let (status, _) = send(post_json(
            "/api/appointments",
            Some(bearer(Role::Patient)),
            json!({
                "providerId": Uuid::new_v4(),
                "startTime": "2026-04-01T10:00:00Z",
                "endTime": "2026-04-01T09:00:00Z"
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn claims_summary_is_for_insurers() {
        let (status, body) = send(
            Request::get("/api/claims/summary")
                .header(header::AUTHORIZATION, bearer(Role::Caregiver))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Insufficient permissions");
    }

    #[tokio::test]
    async fn only_providers_write_insights() {
        let (status, _) = send(post_json(
            "/api/health-insights",
            Some(bearer(Role::Insurer)),
            json!({
                "patientId": Uuid::new_v4(),
                "category": "nutrition",
                "title": "t",
                "message": "m"
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn completion_refuses_bucket_key_as_photo_url() {
        let other_patient = Uuid::new_v4();
        let uri = format!("/api/heredibles/meals/{}/complete", Uuid::new_v4());
        let (status, body) = send(post_json(
            &uri,
            Some(bearer(Role::Patient)),
            json!({ "photoUrl": format!("meals/{other_patient}/x.jpg") }),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("photoUrl"));
    }

    #[tokio::test]
    async fn malformed_completion_body_is_400() {
        let uri = format!("/api/heredibles/meals/{}/complete", Uuid::new_v4());
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, bearer(Role::Patient))
            .body(Body::from("{\"photoUrl\": "))
            .unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn insurers_cannot_self_register() {
        let (status, _) = send(post_json(
            "/api/auth/register",
            None,
            json!({
                "email": "adjuster@example.com",
                "password": "long-enough-pw",
                "role": "insurer",
                "firstName": "Ada",
                "lastName": "Obi"
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
