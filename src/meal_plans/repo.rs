use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{AddPlannedMealRequest, CreateMealPlanRequest, CreateNutritionLogRequest};
use super::repo_types::{MealNutrients, MealPlan, NutritionLog, PlannedMeal, PlannedMealView, RatedMeal};
use super::services::{updated_recipe_rating, MealCompletion};

// ---- Meal plans ----

pub async fn list_plans(db: &PgPool, patient_id: Uuid) -> anyhow::Result<Vec<MealPlan>> {
    let rows = sqlx::query_as::<_, MealPlan>(
        r#"
        SELECT id, patient_id, name, is_active, start_date, end_date, target_calories,
               target_protein_g, target_carbs_g, target_fat_g, health_conditions, created_at
          FROM meal_plans
         WHERE patient_id = $1
         ORDER BY is_active DESC, start_date DESC
        "#,
    )
    .bind(patient_id)
    .fetch_all(db)
    .await
    .context("list meal plans")?;
    Ok(rows)
}

pub async fn active_plan(db: &PgPool, patient_id: Uuid) -> anyhow::Result<Option<MealPlan>> {
    let row = sqlx::query_as::<_, MealPlan>(
        r#"
        SELECT id, patient_id, name, is_active, start_date, end_date, target_calories,
               target_protein_g, target_carbs_g, target_fat_g, health_conditions, created_at
          FROM meal_plans
         WHERE patient_id = $1 AND is_active = TRUE
         LIMIT 1
        "#,
    )
    .bind(patient_id)
    .fetch_optional(db)
    .await
    .context("get active meal plan")?;
    Ok(row)
}

pub async fn find_plan(db: &PgPool, plan_id: Uuid) -> anyhow::Result<Option<MealPlan>> {
    let row = sqlx::query_as::<_, MealPlan>(
        r#"
        SELECT id, patient_id, name, is_active, start_date, end_date, target_calories,
               target_protein_g, target_carbs_g, target_fat_g, health_conditions, created_at
          FROM meal_plans
         WHERE id = $1
        "#,
    )
    .bind(plan_id)
    .fetch_optional(db)
    .await
    .context("get meal plan")?;
    Ok(row)
}

/// Inserts a plan. An active plan replaces the patient's current active one.
pub async fn create_plan(
    db: &PgPool,
    patient_id: Uuid,
    req: &CreateMealPlanRequest,
) -> anyhow::Result<MealPlan> {
    let mut tx = db.begin().await.context("begin tx")?;

    if req.is_active {
        deactivate_plans_tx(&mut tx, patient_id).await?;
    }

    let plan = sqlx::query_as::<_, MealPlan>(
        r#"
        INSERT INTO meal_plans (patient_id, name, is_active, start_date, end_date, target_calories,
                                target_protein_g, target_carbs_g, target_fat_g, health_conditions)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id, patient_id, name, is_active, start_date, end_date, target_calories,
                  target_protein_g, target_carbs_g, target_fat_g, health_conditions, created_at
        "#,
    )
    .bind(patient_id)
    .bind(req.name.trim())
    .bind(req.is_active)
    .bind(req.start_date)
    .bind(req.end_date)
    .bind(req.target_calories)
    .bind(req.target_protein_g)
    .bind(req.target_carbs_g)
    .bind(req.target_fat_g)
    .bind(&req.health_conditions)
    .fetch_one(&mut *tx)
    .await
    .context("insert meal plan")?;

    tx.commit().await.context("commit tx")?;
    Ok(plan)
}

async fn deactivate_plans_tx(
    tx: &mut Transaction<'_, Postgres>,
    patient_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE meal_plans SET is_active = FALSE WHERE patient_id = $1 AND is_active")
        .bind(patient_id)
        .execute(&mut **tx)
        .await
        .context("deactivate meal plans")?;
    Ok(())
}

// ---- Planned meals ----

pub async fn list_meals(
    db: &PgPool,
    plan_id: Uuid,
    from: Option<OffsetDateTime>,
    to: Option<OffsetDateTime>,
) -> anyhow::Result<Vec<PlannedMealView>> {
    let rows = sqlx::query_as::<_, PlannedMealView>(
        r#"
        SELECT pm.id, pm.meal_plan_id, pm.recipe_id, r.name AS recipe_name,
               r.image_url AS recipe_image_url, pm.date, pm.meal_type, pm.is_completed,
               pm.completed_at, pm.rating, r.calories, r.protein_g, r.carbs_g, r.fat_g
          FROM planned_meals pm
          JOIN recipes r ON r.id = pm.recipe_id
         WHERE pm.meal_plan_id = $1
           AND ($2::timestamptz IS NULL OR pm.date >= $2)
           AND ($3::timestamptz IS NULL OR pm.date < $3)
         ORDER BY pm.date ASC, pm.meal_type ASC
        "#,
    )
    .bind(plan_id)
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await
    .context("list planned meals")?;
    Ok(rows)
}

pub async fn add_meal(
    db: &PgPool,
    plan_id: Uuid,
    req: &AddPlannedMealRequest,
) -> anyhow::Result<PlannedMeal> {
    let row = sqlx::query_as::<_, PlannedMeal>(
        r#"
        INSERT INTO planned_meals (meal_plan_id, recipe_id, date, meal_type, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, meal_plan_id, recipe_id, date, meal_type, is_completed, completed_at,
                  rating, feedback, photo_url, photo_uploaded_at, notes
        "#,
    )
    .bind(plan_id)
    .bind(req.recipe_id)
    .bind(req.date)
    .bind(req.meal_type)
    .bind(req.notes.as_deref())
    .fetch_one(db)
    .await
    .context("insert planned meal")?;
    Ok(row)
}

/// Patient owning the plan the meal belongs to.
pub async fn meal_patient_id(db: &PgPool, meal_id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query_as::<_, (Uuid,)>(
        r#"
        SELECT mp.patient_id
          FROM planned_meals pm
          JOIN meal_plans mp ON mp.id = pm.meal_plan_id
         WHERE pm.id = $1
        "#,
    )
    .bind(meal_id)
    .fetch_optional(db)
    .await
    .context("get meal owner")?;
    Ok(row.map(|r| r.0))
}

/// Marks a meal eaten. Photo columns are only touched when the completion carries a photo.
pub async fn complete_meal(
    db: &PgPool,
    meal_id: Uuid,
    completion: &MealCompletion,
    notes: Option<&str>,
) -> anyhow::Result<PlannedMeal> {
    let row = sqlx::query_as::<_, PlannedMeal>(
        r#"
        UPDATE planned_meals
           SET is_completed = TRUE,
               completed_at = $2,
               photo_url = COALESCE($3, photo_url),
               photo_uploaded_at = COALESCE($4, photo_uploaded_at),
               notes = COALESCE($5, notes)
         WHERE id = $1
        RETURNING id, meal_plan_id, recipe_id, date, meal_type, is_completed, completed_at,
                  rating, feedback, photo_url, photo_uploaded_at, notes
        "#,
    )
    .bind(meal_id)
    .bind(completion.completed_at)
    .bind(completion.photo_url.as_deref())
    .bind(completion.photo_uploaded_at)
    .bind(notes)
    .fetch_one(db)
    .await
    .context("complete planned meal")?;
    Ok(row)
}

/// Stores a meal rating and folds it into the recipe's running average.
pub async fn rate_meal(
    db: &PgPool,
    meal_id: Uuid,
    rating: i32,
    feedback: Option<&str>,
) -> anyhow::Result<PlannedMeal> {
    let mut tx = db.begin().await.context("begin tx")?;

    let (recipe_id, previous) = sqlx::query_as::<_, (Uuid, Option<i32>)>(
        "SELECT recipe_id, rating FROM planned_meals WHERE id = $1 FOR UPDATE",
    )
    .bind(meal_id)
    .fetch_one(&mut *tx)
    .await
    .context("lock planned meal")?;

    let meal = sqlx::query_as::<_, PlannedMeal>(
        r#"
        UPDATE planned_meals
           SET rating = $2, feedback = COALESCE($3, feedback)
         WHERE id = $1
        RETURNING id, meal_plan_id, recipe_id, date, meal_type, is_completed, completed_at,
                  rating, feedback, photo_url, photo_uploaded_at, notes
        "#,
    )
    .bind(meal_id)
    .bind(rating)
    .bind(feedback)
    .fetch_one(&mut *tx)
    .await
    .context("rate planned meal")?;

    let (average, count) = sqlx::query_as::<_, (f64, i32)>(
        "SELECT rating, rating_count FROM recipes WHERE id = $1 FOR UPDATE",
    )
    .bind(recipe_id)
    .fetch_one(&mut *tx)
    .await
    .context("lock recipe")?;

    let (average, count) = updated_recipe_rating(average, count, rating, previous);
    sqlx::query("UPDATE recipes SET rating = $2, rating_count = $3 WHERE id = $1")
        .bind(recipe_id)
        .bind(average)
        .bind(count)
        .execute(&mut *tx)
        .await
        .context("update recipe rating")?;

    tx.commit().await.context("commit tx")?;
    Ok(meal)
}

pub async fn photo_ref(db: &PgPool, meal_id: Uuid) -> anyhow::Result<Option<String>> {
    let row = sqlx::query_as::<_, (Option<String>,)>(
        "SELECT photo_url FROM planned_meals WHERE id = $1",
    )
    .bind(meal_id)
    .fetch_optional(db)
    .await
    .context("get meal photo")?;
    Ok(row.and_then(|r| r.0))
}

/// Points the meal at a freshly stored photo, returning the reference it replaced.
pub async fn set_photo(
    db: &PgPool,
    meal_id: Uuid,
    photo_key: &str,
) -> anyhow::Result<Option<String>> {
    let row = sqlx::query_as::<_, (Option<String>,)>(
        r#"
        UPDATE planned_meals pm
           SET photo_url = $2, photo_uploaded_at = now()
          FROM (SELECT id, photo_url FROM planned_meals WHERE id = $1 FOR UPDATE) old
         WHERE pm.id = old.id
        RETURNING old.photo_url
        "#,
    )
    .bind(meal_id)
    .bind(photo_key)
    .fetch_one(db)
    .await
    .context("set meal photo")?;
    Ok(row.0)
}

// ---- Nutrition ----

pub async fn completed_nutrients_between(
    db: &PgPool,
    plan_id: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> anyhow::Result<Vec<MealNutrients>> {
    let rows = sqlx::query_as::<_, MealNutrients>(
        r#"
        SELECT r.calories, r.protein_g, r.carbs_g, r.fat_g
          FROM planned_meals pm
          JOIN recipes r ON r.id = pm.recipe_id
         WHERE pm.meal_plan_id = $1
           AND pm.is_completed
           AND pm.date >= $2 AND pm.date < $3
        "#,
    )
    .bind(plan_id)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await
    .context("completed meal nutrients")?;
    Ok(rows)
}

pub async fn list_logs(
    db: &PgPool,
    patient_id: Uuid,
    from: Option<OffsetDateTime>,
    to: Option<OffsetDateTime>,
) -> anyhow::Result<Vec<NutritionLog>> {
    let rows = sqlx::query_as::<_, NutritionLog>(
        r#"
        SELECT id, patient_id, logged_at, meal_type, description, calories, protein_g, carbs_g, fat_g
          FROM nutrition_logs
         WHERE patient_id = $1
           AND ($2::timestamptz IS NULL OR logged_at >= $2)
           AND ($3::timestamptz IS NULL OR logged_at < $3)
         ORDER BY logged_at DESC
        "#,
    )
    .bind(patient_id)
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await
    .context("list nutrition logs")?;
    Ok(rows)
}

pub async fn create_log(
    db: &PgPool,
    patient_id: Uuid,
    logged_at: OffsetDateTime,
    req: &CreateNutritionLogRequest,
) -> anyhow::Result<NutritionLog> {
    let row = sqlx::query_as::<_, NutritionLog>(
        r#"
        INSERT INTO nutrition_logs (patient_id, logged_at, meal_type, description,
                                    calories, protein_g, carbs_g, fat_g)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, patient_id, logged_at, meal_type, description, calories, protein_g, carbs_g, fat_g
        "#,
    )
    .bind(patient_id)
    .bind(logged_at)
    .bind(req.meal_type)
    .bind(req.description.trim())
    .bind(req.calories)
    .bind(req.protein_g)
    .bind(req.carbs_g)
    .bind(req.fat_g)
    .fetch_one(db)
    .await
    .context("insert nutrition log")?;
    Ok(row)
}

// ---- Analytics ----

pub async fn rated_meals(db: &PgPool, patient_id: Uuid) -> anyhow::Result<Vec<RatedMeal>> {
    let rows = sqlx::query_as::<_, RatedMeal>(
        r#"
        SELECT pm.meal_type, r.name AS recipe_name, pm.rating
          FROM planned_meals pm
          JOIN meal_plans mp ON mp.id = pm.meal_plan_id
          JOIN recipes r ON r.id = pm.recipe_id
         WHERE mp.patient_id = $1 AND pm.rating IS NOT NULL
        "#,
    )
    .bind(patient_id)
    .fetch_all(db)
    .await
    .context("list rated meals")?;
    Ok(rows)
}
