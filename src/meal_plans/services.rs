use std::collections::HashMap;

use time::{macros::format_description, Date, Duration, OffsetDateTime};

use super::dto::{
    CompleteMealRequest, CreateMealPlanRequest, GroupRating, MacroPercentages, MacroTotals, NutritionSummary,
    PreferenceAnalytics,
};
use super::repo_types::{MealNutrients, MealPlan, RatedMeal};
use crate::error::{AppError, AppResult};
use crate::images::services::is_external;

pub const DEFAULT_TARGET_CALORIES: f64 = 2000.0;
pub const DEFAULT_TARGET_PROTEIN_G: f64 = 50.0;
pub const DEFAULT_TARGET_CARBS_G: f64 = 250.0;
pub const DEFAULT_TARGET_FAT_G: f64 = 65.0;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

const RANKED_LIST_LEN: usize = 5;

/// Parses `YYYY-MM-DD`; missing means the current UTC day.
pub fn parse_day(raw: Option<&str>, now: OffsetDateTime) -> AppResult<Date> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(now.date()),
        Some(s) => Date::parse(s, format_description!("[year]-[month]-[day]"))
            .map_err(|_| AppError::bad_request("date must be formatted as YYYY-MM-DD")),
    }
}

/// Half-open UTC window `[start of day, start of next day)`.
pub fn day_window(day: Date) -> (OffsetDateTime, OffsetDateTime) {
    let start = day.midnight().assume_utc();
    (start, start + Duration::days(1))
}

pub fn sum_macros<'a, I>(items: I) -> MacroTotals
where
    I: IntoIterator<Item = &'a MealNutrients>,
{
    items.into_iter().fold(MacroTotals::default(), |acc, m| MacroTotals {
        calories: acc.calories + f64::from(m.calories),
        protein: acc.protein + m.protein_g,
        carbs: acc.carbs + m.carbs_g,
        fat: acc.fat + m.fat_g,
    })
}

pub fn plan_targets(plan: &MealPlan) -> MacroTotals {
    MacroTotals {
        calories: plan
            .target_calories
            .map(f64::from)
            .unwrap_or(DEFAULT_TARGET_CALORIES),
        protein: plan.target_protein_g.unwrap_or(DEFAULT_TARGET_PROTEIN_G),
        carbs: plan.target_carbs_g.unwrap_or(DEFAULT_TARGET_CARBS_G),
        fat: plan.target_fat_g.unwrap_or(DEFAULT_TARGET_FAT_G),
    }
}

/// `round(total / target * 100)`, 0 for a non-positive target.
pub fn percent_of(total: f64, target: f64) -> i64 {
    if target <= 0.0 {
        return 0;
    }
    (total / target * 100.0).round() as i64
}

/// Daily summary, or `None` when the patient has no active plan.
pub fn summarize_day(
    day: Date,
    plan: Option<&MealPlan>,
    completed: &[MealNutrients],
    logged: &[MealNutrients],
) -> Option<NutritionSummary> {
    plan.map(|p| build_summary(day, p, completed, logged))
}

pub fn build_summary(
    day: Date,
    plan: &MealPlan,
    completed: &[MealNutrients],
    logged: &[MealNutrients],
) -> NutritionSummary {
    let totals = sum_macros(completed.iter().chain(logged.iter()));
    let targets = plan_targets(plan);
    NutritionSummary {
        date: day.to_string(),
        meal_plan_id: plan.id,
        totals,
        targets,
        percentages: MacroPercentages {
            calories: percent_of(totals.calories, targets.calories),
            protein: percent_of(totals.protein, targets.protein),
            carbs: percent_of(totals.carbs, targets.carbs),
            fat: percent_of(totals.fat, targets.fat),
        },
        completed_meals: completed.len(),
        logged_entries: logged.len(),
    }
}

/// Fields written when a meal is marked eaten.
#[derive(Debug, Clone, PartialEq)]
pub struct MealCompletion {
    pub completed_at: OffsetDateTime,
    pub photo_url: Option<String>,
    pub photo_uploaded_at: Option<OffsetDateTime>,
}

/// Client-supplied photos must be absolute `http(s)` URLs. Bucket keys are
/// only ever written by the upload path.
pub fn completion_fields(now: OffsetDateTime, photo_url: Option<&str>) -> AppResult<MealCompletion> {
    let photo_url = photo_url.map(str::trim).filter(|u| !u.is_empty());
    if photo_url.is_some_and(|u| !is_external(u)) {
        return Err(AppError::bad_request("photoUrl must be an absolute http(s) URL"));
    }
    let photo_url = photo_url.map(str::to_string);
    Ok(MealCompletion {
        completed_at: now,
        photo_uploaded_at: photo_url.as_ref().map(|_| now),
        photo_url,
    })
}

/// Body of `POST /meals/:id/complete`. An empty body completes without extras.
pub fn parse_completion_body(raw: &[u8]) -> AppResult<CompleteMealRequest> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(CompleteMealRequest::default());
    }
    serde_json::from_slice(raw)
        .map_err(|e| AppError::bad_request(format!("Invalid JSON body: {e}")))
}

pub fn validate_rating(rating: i32) -> AppResult<()> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(AppError::bad_request("Rating must be between 1 and 5"))
    }
}

pub fn validate_new_plan(req: &CreateMealPlanRequest) -> AppResult<()> {
    if req.name.trim().is_empty() {
        return Err(AppError::bad_request("Meal plan name is required"));
    }
    if let Some(end) = req.end_date {
        if end < req.start_date {
            return Err(AppError::bad_request("endDate must not be before startDate"));
        }
    }
    let non_positive = req.target_calories.is_some_and(|v| v <= 0)
        || [req.target_protein_g, req.target_carbs_g, req.target_fat_g]
            .iter()
            .flatten()
            .any(|v| *v <= 0.0);
    if non_positive {
        return Err(AppError::bad_request("Nutrition targets must be positive"));
    }
    Ok(())
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn group_ratings<'a, I>(pairs: I) -> Vec<GroupRating>
where
    I: IntoIterator<Item = (&'a str, i32)>,
{
    let mut groups: HashMap<&str, (i64, usize)> = HashMap::new();
    for (name, rating) in pairs {
        let entry = groups.entry(name).or_insert((0, 0));
        entry.0 += i64::from(rating);
        entry.1 += 1;
    }
    let mut out: Vec<GroupRating> = groups
        .into_iter()
        .map(|(name, (sum, count))| GroupRating {
            name: name.to_string(),
            average_rating: round1(sum as f64 / count as f64),
            count,
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// Groups rated meals by meal type and by recipe and ranks the recipes.
pub fn preference_analytics(meals: &[RatedMeal]) -> PreferenceAnalytics {
    let total_rated = meals.len();
    let overall_average = (total_rated > 0).then(|| {
        let sum: i64 = meals.iter().map(|m| i64::from(m.rating)).sum();
        round1(sum as f64 / total_rated as f64)
    });

    let by_meal_type = group_ratings(meals.iter().map(|m| (m.meal_type.as_str(), m.rating)));
    let by_recipe = group_ratings(meals.iter().map(|m| (m.recipe_name.as_str(), m.rating)));

    let mut top_rated = by_recipe.clone();
    top_rated.sort_by(|a, b| {
        b.average_rating
            .total_cmp(&a.average_rating)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.name.cmp(&b.name))
    });
    top_rated.truncate(RANKED_LIST_LEN);

    let mut least_rated = by_recipe.clone();
    least_rated.sort_by(|a, b| {
        a.average_rating
            .total_cmp(&b.average_rating)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.name.cmp(&b.name))
    });
    least_rated.truncate(RANKED_LIST_LEN);

    PreferenceAnalytics {
        total_rated,
        overall_average,
        by_meal_type,
        by_recipe,
        top_rated,
        least_rated,
    }
}

/// New running average after a rating is added, or replaced when `previous` is set.
pub fn updated_recipe_rating(
    average: f64,
    count: i32,
    new_rating: i32,
    previous: Option<i32>,
) -> (f64, i32) {
    match previous {
        Some(old) if count > 0 => (
            average + f64::from(new_rating - old) / f64::from(count),
            count,
        ),
        _ => {
            let next = count + 1;
            (
                (average * f64::from(count) + f64::from(new_rating)) / f64::from(next),
                next,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meal_plans::repo_types::MealType;
    use time::macros::{date, datetime};
    use uuid::Uuid;

    fn plan(targets: (Option<i32>, Option<f64>, Option<f64>, Option<f64>)) -> MealPlan {
        MealPlan {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            name: "Low sodium".into(),
            is_active: true,
            start_date: datetime!(2026-01-01 0:00 UTC),
            end_date: None,
            target_calories: targets.0,
            target_protein_g: targets.1,
            target_carbs_g: targets.2,
            target_fat_g: targets.3,
            health_conditions: vec!["hypertension".into()],
            created_at: datetime!(2026-01-01 0:00 UTC),
        }
    }

    fn nutrients(calories: i32, protein: f64, carbs: f64, fat: f64) -> MealNutrients {
        MealNutrients {
            calories,
            protein_g: protein,
            carbs_g: carbs,
            fat_g: fat,
        }
    }

    #[test]
    fn day_window_is_half_open_utc_day() {
        let (start, end) = day_window(date!(2026 - 03 - 14));
        assert_eq!(start, datetime!(2026-03-14 0:00 UTC));
        assert_eq!(end, datetime!(2026-03-15 0:00 UTC));
    }

    #[test]
    fn parse_day_defaults_and_rejects_garbage() {
        let now = datetime!(2026-05-02 18:30 UTC);
        assert_eq!(parse_day(None, now).unwrap(), date!(2026 - 05 - 02));
        assert_eq!(parse_day(Some("2026-01-31"), now).unwrap(), date!(2026 - 01 - 31));
        assert!(parse_day(Some("31/01/2026"), now).is_err());
    }

    #[test]
    fn percentages_are_rounded_share_of_target() {
        let p = plan((Some(1800), Some(90.0), Some(200.0), Some(60.0)));
        let completed = [nutrients(600, 30.0, 70.0, 20.0), nutrients(455, 22.5, 44.0, 17.0)];
        let summary = build_summary(date!(2026 - 03 - 14), &p, &completed, &[]);
        assert_eq!(summary.totals.calories, 1055.0);
        // 1055 / 1800 = 58.61%
        assert_eq!(summary.percentages.calories, 59);
        // 52.5 / 90 = 58.33%
        assert_eq!(summary.percentages.protein, 58);
        // 114 / 200 = 57%
        assert_eq!(summary.percentages.carbs, 57);
        // 37 / 60 = 61.67%
        assert_eq!(summary.percentages.fat, 62);
        assert_eq!(summary.completed_meals, 2);
        assert_eq!(summary.date, "2026-03-14");
    }

    #[test]
    fn missing_targets_fall_back_to_defaults() {
        let p = plan((None, None, None, None));
        let summary = build_summary(date!(2026 - 03 - 14), &p, &[nutrients(500, 25.0, 125.0, 13.0)], &[]);
        assert_eq!(summary.targets.calories, DEFAULT_TARGET_CALORIES);
        assert_eq!(summary.percentages.calories, 25);
        assert_eq!(summary.percentages.protein, 50);
        assert_eq!(summary.percentages.carbs, 50);
        assert_eq!(summary.percentages.fat, 20);
    }

    #[test]
    fn logged_entries_count_towards_totals() {
        let p = plan((Some(2000), None, None, None));
        let summary = build_summary(
            date!(2026 - 03 - 14),
            &p,
            &[nutrients(400, 0.0, 0.0, 0.0)],
            &[nutrients(100, 0.0, 0.0, 0.0)],
        );
        assert_eq!(summary.totals.calories, 500.0);
        assert_eq!(summary.logged_entries, 1);
    }

    #[test]
    fn percent_of_guards_zero_target() {
        assert_eq!(percent_of(100.0, 0.0), 0);
        assert_eq!(percent_of(0.0, 100.0), 0);
        assert_eq!(percent_of(250.0, 100.0), 250);
    }

    #[test]
    fn completion_sets_photo_fields_only_with_url() {
        let now = datetime!(2026-03-14 12:00 UTC);
        let plain = completion_fields(now, None).unwrap();
        assert_eq!(plain.completed_at, now);
        assert_eq!(plain.photo_url, None);
        assert_eq!(plain.photo_uploaded_at, None);

        let blank = completion_fields(now, Some("   ")).unwrap();
        assert_eq!(blank.photo_url, None);
        assert_eq!(blank.photo_uploaded_at, None);

        let with_photo = completion_fields(now, Some("https://cdn.example/plate.jpg")).unwrap();
        assert_eq!(with_photo.photo_url.as_deref(), Some("https://cdn.example/plate.jpg"));
        assert_eq!(with_photo.photo_uploaded_at, Some(now));
    }

    #[test]
    fn completion_rejects_bucket_keys_and_relative_urls() {
        let now = datetime!(2026-03-14 12:00 UTC);
        for raw in [
            "meals/7d0f1c3e-0000-4000-8000-000000000000/someone-else.jpg",
            "/meals/a.jpg",
            "ftp://cdn.example/plate.jpg",
        ] {
            let err = completion_fields(now, Some(raw)).unwrap_err();
            assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST, "{raw}");
        }
    }

    #[test]
    fn completion_body_parsing() {
        assert_eq!(parse_completion_body(b"").unwrap().photo_url, None);
        assert_eq!(parse_completion_body(b"  \n").unwrap().notes, None);
        let body = parse_completion_body(br#"{"notes":"half portion"}"#).unwrap();
        assert_eq!(body.notes.as_deref(), Some("half portion"));
        let err = parse_completion_body(br#"{"photoUrl": "#).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn summary_is_absent_without_active_plan() {
        let day = date!(2026 - 03 - 14);
        let eaten = [nutrients(500, 25.0, 60.0, 15.0)];
        assert!(summarize_day(day, None, &eaten, &[]).is_none());

        let p = plan((None, None, None, None));
        let summary = summarize_day(day, Some(&p), &eaten, &[]).unwrap();
        assert_eq!(summary.meal_plan_id, p.id);
        assert_eq!(summary.percentages.calories, 25);
    }

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        for bad in [0, 6, -1] {
            let err = validate_rating(bad).unwrap_err();
            assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        }
    }

    fn rated(meal_type: MealType, recipe: &str, rating: i32) -> RatedMeal {
        RatedMeal {
            meal_type,
            recipe_name: recipe.into(),
            rating,
        }
    }

    #[test]
    fn preference_analytics_groups_and_ranks() {
        let meals = vec![
            rated(MealType::Breakfast, "Akara", 5),
            rated(MealType::Breakfast, "Akara", 4),
            rated(MealType::Lunch, "Jollof", 3),
            rated(MealType::Dinner, "Egusi", 2),
            rated(MealType::Dinner, "Suya", 5),
        ];
        let a = preference_analytics(&meals);
        assert_eq!(a.total_rated, 5);
        assert_eq!(a.overall_average, Some(3.8));

        let breakfast = a.by_meal_type.iter().find(|g| g.name == "breakfast").unwrap();
        assert_eq!(breakfast.average_rating, 4.5);
        assert_eq!(breakfast.count, 2);
        let dinner = a.by_meal_type.iter().find(|g| g.name == "dinner").unwrap();
        assert_eq!(dinner.average_rating, 3.5);

        let top: Vec<_> = a.top_rated.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(top, vec!["Suya", "Akara", "Jollof", "Egusi"]);
        let least: Vec<_> = a.least_rated.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(least, vec!["Egusi", "Jollof", "Akara", "Suya"]);
    }

    #[test]
    fn ranked_lists_are_capped_at_five() {
        let meals: Vec<_> = (1..=8)
            .map(|i| rated(MealType::Snack, &format!("Recipe {i}"), (i % 5) + 1))
            .collect();
        let a = preference_analytics(&meals);
        assert_eq!(a.by_recipe.len(), 8);
        assert_eq!(a.top_rated.len(), 5);
        assert_eq!(a.least_rated.len(), 5);
    }

    #[test]
    fn no_ratings_yields_empty_analytics() {
        let a = preference_analytics(&[]);
        assert_eq!(a.total_rated, 0);
        assert_eq!(a.overall_average, None);
        assert!(a.top_rated.is_empty());
    }

    #[test]
    fn recipe_rating_running_average() {
        assert_eq!(updated_recipe_rating(0.0, 0, 4, None), (4.0, 1));
        assert_eq!(updated_recipe_rating(4.0, 1, 2, None), (3.0, 2));
        // re-rating a meal replaces its old score
        assert_eq!(updated_recipe_rating(3.0, 2, 4, Some(2)), (4.0, 2));
    }

    #[test]
    fn plan_validation() {
        let req: CreateMealPlanRequest = serde_json::from_value(serde_json::json!({
            "name": "Renal friendly",
            "startDate": "2026-03-01T00:00:00Z",
            "endDate": "2026-02-01T00:00:00Z"
        }))
        .unwrap();
        assert!(validate_new_plan(&req).is_err());

        let req: CreateMealPlanRequest = serde_json::from_value(serde_json::json!({
            "name": "Renal friendly",
            "startDate": "2026-03-01T00:00:00Z",
            "targetCalories": 1800,
            "targetFatG": 0.0
        }))
        .unwrap();
        assert!(validate_new_plan(&req).is_err());

        let req: CreateMealPlanRequest = serde_json::from_value(serde_json::json!({
            "name": "Renal friendly",
            "startDate": "2026-03-01T00:00:00Z",
            "targetCalories": 1800
        }))
        .unwrap();
        assert!(validate_new_plan(&req).is_ok());
        assert!(req.is_active);
    }
}
