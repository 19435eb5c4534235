use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::dto::{CreateRecipeRequest, RecipeQuery};
use super::repo;
use super::repo_types::Recipe;
use super::services::{validate_new_recipe, RecipeFilter};
use crate::{
    auth::{AuthUser, Role},
    error::{AppError, AppResult},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/heredibles/recipes", get(list_recipes).post(create_recipe))
        .route("/heredibles/recipes/:id", get(get_recipe))
}

#[instrument(skip(state, _auth))]
pub async fn list_recipes(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(q): Query<RecipeQuery>,
) -> AppResult<Json<Vec<Recipe>>> {
    let filter = RecipeFilter::from_query(&q)?;
    let rows = repo::list_public(&state.db, &q).await?;
    let fetched = rows.len();

    let recipes = filter.apply(rows);
    debug!(fetched, returned = recipes.len(), "recipes listed");
    Ok(Json(recipes))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Recipe>> {
    let recipe = repo::find_by_id(&state.db, id)
        .await?
        .filter(|r| r.is_public || r.created_by == Some(auth.id))
        .ok_or_else(|| AppError::not_found("Recipe not found"))?;
    Ok(Json(recipe))
}

#[instrument(skip(state, body))]
pub async fn create_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateRecipeRequest>,
) -> AppResult<(StatusCode, Json<Recipe>)> {
    auth.require_role(&[Role::Provider])?;
    validate_new_recipe(&body)?;

    let recipe = repo::create(&state.db, auth.id, &body).await?;
    info!(recipe_id = %recipe.id, created_by = %auth.id, "recipe created");
    Ok((StatusCode::CREATED, Json(recipe)))
}
