use super::dto::{CreateRecipeRequest, RecipeQuery};
use super::repo_types::Recipe;
use crate::error::{AppError, AppResult};

/// Splits a `dietaryTags` query value into normalized tags.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// True when any wanted tag appears among the recipe tags. No wanted tags matches everything.
pub fn matches_dietary_tags(recipe_tags: &[String], wanted: &[String]) -> bool {
    wanted.is_empty()
        || recipe_tags
            .iter()
            .any(|t| wanted.iter().any(|w| w.eq_ignore_ascii_case(t.trim())))
}

/// Row filters re-checked after the SQL query. Tags are only checked here.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecipeFilter {
    pub max_calories: Option<i32>,
    pub dietary_tags: Vec<String>,
}

impl RecipeFilter {
    pub fn from_query(q: &RecipeQuery) -> AppResult<Self> {
        if q.max_calories.is_some_and(|c| c < 0) {
            return Err(AppError::bad_request("maxCalories cannot be negative"));
        }
        Ok(Self {
            max_calories: q.max_calories,
            dietary_tags: q.dietary_tags.as_deref().map(parse_tag_list).unwrap_or_default(),
        })
    }

    pub fn matches(&self, recipe: &Recipe) -> bool {
        self.max_calories.map_or(true, |max| recipe.calories <= max)
            && matches_dietary_tags(&recipe.dietary_tags, &self.dietary_tags)
    }

    /// Keeps matching recipes in their original order.
    pub fn apply(&self, recipes: Vec<Recipe>) -> Vec<Recipe> {
        recipes.into_iter().filter(|r| self.matches(r)).collect()
    }
}

pub fn validate_new_recipe(r: &CreateRecipeRequest) -> AppResult<()> {
    if r.name.trim().is_empty() {
        return Err(AppError::bad_request("Recipe name is required"));
    }
    if r.category.trim().is_empty() {
        return Err(AppError::bad_request("Recipe category is required"));
    }
    if r.calories < 0 || r.protein_g < 0.0 || r.carbs_g < 0.0 || r.fat_g < 0.0 || r.fiber_g < 0.0 {
        return Err(AppError::bad_request("Nutrition values cannot be negative"));
    }
    if r.servings < 1 {
        return Err(AppError::bad_request("Servings must be at least 1"));
    }
    if r.prep_time_minutes < 0 || r.cook_time_minutes < 0 {
        return Err(AppError::bad_request("Times cannot be negative"));
    }
    Ok(())
}
