use serde::Deserialize;

use super::repo_types::Difficulty;

/// Query string of `GET /heredibles/recipes`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeQuery {
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub max_calories: Option<i32>,
    /// Comma separated, e.g. `vegan,low-sodium`.
    pub dietary_tags: Option<String>,
    pub cultural_origin: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecipeRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub cultural_origin: Option<String>,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub prep_time_minutes: i32,
    #[serde(default)]
    pub cook_time_minutes: i32,
    #[serde(default = "default_servings")]
    pub servings: i32,
    pub calories: i32,
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carbs_g: f64,
    #[serde(default)]
    pub fat_g: f64,
    #[serde(default)]
    pub fiber_g: f64,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub dietary_tags: Vec<String>,
    #[serde(default)]
    pub good_for: Vec<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    pub image_url: Option<String>,
}

fn default_servings() -> i32 {
    1
}

fn default_public() -> bool {
    true
}
