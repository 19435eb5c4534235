use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::dto::{CreateRecipeRequest, RecipeQuery};
use super::repo_types::Recipe;

pub(crate) const RECIPE_COLUMNS: &str = r#"
    id, name, description, category, cultural_origin, difficulty,
    prep_time_minutes, cook_time_minutes, servings, calories,
    protein_g, carbs_g, fat_g, fiber_g, ingredients, instructions,
    dietary_tags, good_for, rating, rating_count, is_public, image_url,
    created_by, created_at
"#;

/// Public recipes, best rated first. Tag filtering happens in the service layer.
pub async fn list_public(db: &PgPool, q: &RecipeQuery) -> anyhow::Result<Vec<Recipe>> {
    let sql = format!(
        r#"
        SELECT {RECIPE_COLUMNS}
          FROM recipes
         WHERE is_public = TRUE
           AND ($1::text IS NULL OR category = $1)
           AND ($2::recipe_difficulty IS NULL OR difficulty = $2)
           AND ($3::int IS NULL OR calories <= $3)
           AND ($4::text IS NULL OR cultural_origin = $4)
         ORDER BY rating DESC, name ASC
        "#
    );
    let rows = sqlx::query_as::<_, Recipe>(&sql)
        .bind(q.category.as_deref())
        .bind(q.difficulty)
        .bind(q.max_calories)
        .bind(q.cultural_origin.as_deref())
        .fetch_all(db)
        .await
        .context("list public recipes")?;
    Ok(rows)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Recipe>> {
    let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1");
    let row = sqlx::query_as::<_, Recipe>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("get recipe")?;
    Ok(row)
}

pub async fn create(
    db: &PgPool,
    created_by: Uuid,
    r: &CreateRecipeRequest,
) -> anyhow::Result<Recipe> {
    let sql = format!(
        r#"
        INSERT INTO recipes (
            name, description, category, cultural_origin, difficulty,
            prep_time_minutes, cook_time_minutes, servings, calories,
            protein_g, carbs_g, fat_g, fiber_g, ingredients, instructions,
            dietary_tags, good_for, is_public, image_url, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        RETURNING {RECIPE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, Recipe>(&sql)
        .bind(r.name.trim())
        .bind(r.description.as_deref())
        .bind(r.category.trim())
        .bind(r.cultural_origin.as_deref())
        .bind(r.difficulty)
        .bind(r.prep_time_minutes)
        .bind(r.cook_time_minutes)
        .bind(r.servings)
        .bind(r.calories)
        .bind(r.protein_g)
        .bind(r.carbs_g)
        .bind(r.fat_g)
        .bind(r.fiber_g)
        .bind(&r.ingredients)
        .bind(&r.instructions)
        .bind(&r.dietary_tags)
        .bind(&r.good_for)
        .bind(r.is_public)
        .bind(r.image_url.as_deref())
        .bind(created_by)
        .fetch_one(db)
        .await
        .context("insert recipe")?;
    Ok(row)
}
