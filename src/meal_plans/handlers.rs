use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    AddPlannedMealRequest, CreateMealPlanRequest, CreateNutritionLogRequest,
    MealPhotoResponse, NutritionLogQuery, NutritionSummary, NutritionSummaryQuery, PatientQuery,
    PreferenceAnalytics, RangeQuery, RateMealRequest,
};
use super::repo;
use super::repo_types::{MealNutrients, MealPlan, NutritionLog, PlannedMeal, PlannedMealView};
use super::services::{
    completion_fields, day_window, parse_completion_body, parse_day, preference_analytics,
    summarize_day, validate_new_plan, validate_rating,
};
use crate::{
    auth::{AuthUser, Role},
    error::{AppError, AppResult},
    images::services::{ext_from_mime, resolve_photo_url, upload_meal_photo, UploadItem},
    recipes,
    state::AppState,
};

/// Roles that may see or edit a patient's nutrition data.
const CARE_ROLES: &[Role] = &[Role::Patient, Role::Caregiver, Role::Provider];

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/heredibles/meal-plans", get(list_plans))
        .route("/heredibles/meal-plans/active", get(get_active_plan))
        .route("/heredibles/meal-plans/:id/meals", get(list_meals))
        .route("/heredibles/meals/:id/photo", get(get_meal_photo))
        .route("/heredibles/nutrition/summary", get(nutrition_summary))
        .route("/heredibles/nutrition/logs", get(list_logs))
        .route("/heredibles/analytics/preferences", get(preferences))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/heredibles/meal-plans", post(create_plan))
        .route("/heredibles/meal-plans/:id/meals", post(add_meal))
        .route("/heredibles/meals/:id/complete", post(complete_meal))
        .route("/heredibles/meals/:id/rate", post(rate_meal))
        .route("/heredibles/nutrition/logs", post(create_log))
        .route(
            "/heredibles/meals/:id/photo",
            post(upload_photo).layer(DefaultBodyLimit::max(10 * 1024 * 1024)), // 10MB
        )
}

async fn load_plan(state: &AppState, auth: &AuthUser, plan_id: Uuid) -> AppResult<MealPlan> {
    let plan = repo::find_plan(&state.db, plan_id)
        .await?
        .ok_or_else(|| AppError::not_found("Meal plan not found"))?;
    auth.ensure_patient_access(plan.patient_id)?;
    Ok(plan)
}

async fn load_meal_owner(state: &AppState, auth: &AuthUser, meal_id: Uuid) -> AppResult<Uuid> {
    let patient_id = repo::meal_patient_id(&state.db, meal_id)
        .await?
        .ok_or_else(|| AppError::not_found("Meal not found"))?;
    auth.ensure_patient_access(patient_id)?;
    Ok(patient_id)
}

// ---- meal plans ----

#[instrument(skip(state))]
pub async fn list_plans(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<PatientQuery>,
) -> AppResult<Json<Vec<MealPlan>>> {
    auth.require_role(CARE_ROLES)?;
    let patient_id = auth.patient_scope(q.patient_id)?;
    Ok(Json(repo::list_plans(&state.db, patient_id).await?))
}

#[instrument(skip(state))]
pub async fn get_active_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<PatientQuery>,
) -> AppResult<Json<Option<MealPlan>>> {
    auth.require_role(CARE_ROLES)?;
    let patient_id = auth.patient_scope(q.patient_id)?;
    Ok(Json(repo::active_plan(&state.db, patient_id).await?))
}

#[instrument(skip(state, body))]
pub async fn create_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateMealPlanRequest>,
) -> AppResult<(StatusCode, Json<MealPlan>)> {
    auth.require_role(CARE_ROLES)?;
    let patient_id = auth.patient_scope(body.patient_id)?;
    validate_new_plan(&body)?;

    let plan = repo::create_plan(&state.db, patient_id, &body).await?;
    info!(plan_id = %plan.id, %patient_id, active = plan.is_active, "meal plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(range): Query<RangeQuery>,
) -> AppResult<Json<Vec<PlannedMealView>>> {
    auth.require_role(CARE_ROLES)?;
    let plan = load_plan(&state, &auth, id).await?;
    let meals = repo::list_meals(&state.db, plan.id, range.from, range.to).await?;
    Ok(Json(meals))
}

#[instrument(skip(state, body))]
pub async fn add_meal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AddPlannedMealRequest>,
) -> AppResult<(StatusCode, Json<PlannedMeal>)> {
    auth.require_role(CARE_ROLES)?;
    let plan = load_plan(&state, &auth, id).await?;

    let recipe = recipes::repo::find_by_id(&state.db, body.recipe_id).await?;
    if !recipe.is_some_and(|r| r.is_public || r.created_by == Some(auth.id)) {
        return Err(AppError::bad_request("Unknown recipe"));
    }

    let meal = repo::add_meal(&state.db, plan.id, &body).await?;
    Ok((StatusCode::CREATED, Json(meal)))
}

// ---- planned meal actions ----

#[instrument(skip(state, raw))]
pub async fn complete_meal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    raw: Bytes,
) -> AppResult<Json<PlannedMeal>> {
    auth.require_role(CARE_ROLES)?;
    let body = parse_completion_body(&raw)?;
    let completion = completion_fields(OffsetDateTime::now_utc(), body.photo_url.as_deref())?;
    load_meal_owner(&state, &auth, id).await?;

    let meal = repo::complete_meal(&state.db, id, &completion, body.notes.as_deref()).await?;
    info!(meal_id = %id, with_photo = completion.photo_url.is_some(), "meal completed");
    Ok(Json(meal))
}

#[instrument(skip(state, body))]
pub async fn rate_meal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RateMealRequest>,
) -> AppResult<Json<PlannedMeal>> {
    auth.require_role(CARE_ROLES)?;
    if let Err(e) = validate_rating(body.rating) {
        warn!(meal_id = %id, rating = body.rating, "rating out of range");
        return Err(e);
    }
    load_meal_owner(&state, &auth, id).await?;

    let meal = repo::rate_meal(&state.db, id, body.rating, body.feedback.as_deref()).await?;
    Ok(Json(meal))
}

/// POST /heredibles/meals/:id/photo (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_photo(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> AppResult<(StatusCode, Json<MealPhotoResponse>)> {
    auth.require_role(CARE_ROLES)?;
    let patient_id = load_meal_owner(&state, &auth, id).await?;

    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.to_string()))?
    {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(e.to_string()))?;
            upload = Some((content_type, data));
            break;
        }
    }
    let (content_type, body) = upload.ok_or_else(|| AppError::bad_request("file is required"))?;
    if ext_from_mime(&content_type).is_none() {
        return Err(AppError::bad_request("Unsupported image type"));
    }

    let key = upload_meal_photo(
        &state,
        patient_id,
        id,
        UploadItem {
            body,
            content_type: &content_type,
        },
    )
    .await?;
    let url = resolve_photo_url(&state, &key).await?;

    Ok((
        StatusCode::CREATED,
        Json(MealPhotoResponse {
            meal_id: id,
            photo_key: key,
            url,
        }),
    ))
}

/// 302 to the meal photo.
#[instrument(skip(state))]
pub async fn get_meal_photo(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, [(header::HeaderName, String); 1])> {
    auth.require_role(CARE_ROLES)?;
    load_meal_owner(&state, &auth, id).await?;

    let reference = repo::photo_ref(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Photo not found"))?;
    let url = resolve_photo_url(&state, &reference).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]))
}

// ---- nutrition ----

#[instrument(skip(state))]
pub async fn nutrition_summary(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<NutritionSummaryQuery>,
) -> AppResult<Json<Option<NutritionSummary>>> {
    auth.require_role(CARE_ROLES)?;
    let patient_id = auth.patient_scope(q.patient_id)?;
    let day = parse_day(q.date.as_deref(), OffsetDateTime::now_utc())?;

    let plan = repo::active_plan(&state.db, patient_id).await?;
    let (completed, logged) = match &plan {
        Some(plan) => {
            let (start, end) = day_window(day);
            let completed = repo::completed_nutrients_between(&state.db, plan.id, start, end).await?;
            let logged: Vec<MealNutrients> =
                repo::list_logs(&state.db, patient_id, Some(start), Some(end))
                    .await?
                    .into_iter()
                    .map(|l| MealNutrients {
                        calories: l.calories,
                        protein_g: l.protein_g,
                        carbs_g: l.carbs_g,
                        fat_g: l.fat_g,
                    })
                    .collect();
            (completed, logged)
        }
        None => (Vec::new(), Vec::new()),
    };

    Ok(Json(summarize_day(day, plan.as_ref(), &completed, &logged)))
}

#[instrument(skip(state))]
pub async fn list_logs(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<NutritionLogQuery>,
) -> AppResult<Json<Vec<NutritionLog>>> {
    auth.require_role(CARE_ROLES)?;
    let patient_id = auth.patient_scope(q.patient_id)?;
    Ok(Json(repo::list_logs(&state.db, patient_id, q.from, q.to).await?))
}

#[instrument(skip(state, body))]
pub async fn create_log(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateNutritionLogRequest>,
) -> AppResult<(StatusCode, Json<NutritionLog>)> {
    auth.require_role(CARE_ROLES)?;
    let patient_id = auth.patient_scope(body.patient_id)?;
    if body.description.trim().is_empty() {
        return Err(AppError::bad_request("description is required"));
    }
    if body.calories < 0 || body.protein_g < 0.0 || body.carbs_g < 0.0 || body.fat_g < 0.0 {
        return Err(AppError::bad_request("Nutrition values cannot be negative"));
    }

    let logged_at = body.logged_at.unwrap_or_else(OffsetDateTime::now_utc);
    let log = repo::create_log(&state.db, patient_id, logged_at, &body).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

#[instrument(skip(state))]
pub async fn preferences(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<PatientQuery>,
) -> AppResult<Json<PreferenceAnalytics>> {
    auth.require_role(CARE_ROLES)?;
    let patient_id = auth.patient_scope(q.patient_id)?;
    let rated = repo::rated_meals(&state.db, patient_id).await?;
    Ok(Json(preference_analytics(&rated)))
}
