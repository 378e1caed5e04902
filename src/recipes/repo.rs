use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::recipes::dto::{CreateRecipeRequest, PageSlice};

/// Recipe record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub description: String,
    pub preview: Option<String>,
    pub owner_id: Uuid,
    pub created_at: OffsetDateTime,
}

/// An ingredient as it appears inside one recipe.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecipeIngredient {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub measure: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PopularRecipe {
    pub id: Uuid,
    pub title: String,
    pub preview: Option<String>,
    pub total_added: i64,
}

const RECIPE_COLUMNS: &str = "id, title, category, description, preview, owner_id, created_at";

/// Turn raw user input into a substring ILIKE pattern, escaping the
/// wildcard characters so they match literally.
pub fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("%{escaped}%")
}

// Paged listings pair a LIMIT/OFFSET query with an independent COUNT over
// the same filter. The two reads are not a snapshot; under concurrent
// writes `total` and the page can briefly disagree.

pub async fn list_landing(db: &PgPool) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes \
         WHERE category IN ('Breakfast', 'Miscellaneous', 'Chicken', 'Dessert') \
         ORDER BY created_at"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_by_category(
    db: &PgPool,
    category: &str,
    slice: PageSlice,
) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes WHERE category = $1 \
         ORDER BY created_at LIMIT $2 OFFSET $3"
    ))
    .bind(category)
    .bind(slice.limit)
    .bind(slice.offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_by_category(db: &PgPool, category: &str) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes WHERE category = $1")
        .bind(category)
        .fetch_one(db)
        .await?;
    Ok(total)
}

pub async fn get_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Recipe>> {
    let recipe =
        sqlx::query_as::<_, Recipe>(&format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?;
    Ok(recipe)
}

pub async fn ingredients_of(db: &PgPool, recipe_id: Uuid) -> anyhow::Result<Vec<RecipeIngredient>> {
    let rows = sqlx::query_as::<_, RecipeIngredient>(
        "SELECT i.id, i.name, i.description, i.image_url, ri.measure \
         FROM recipe_ingredients ri \
         JOIN ingredients i ON i.id = ri.ingredient_id \
         WHERE ri.recipe_id = $1 \
         ORDER BY ri.position",
    )
    .bind(recipe_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn search_by_title(
    db: &PgPool,
    pattern: &str,
    slice: PageSlice,
) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes WHERE title ILIKE $1 \
         ORDER BY created_at LIMIT $2 OFFSET $3"
    ))
    .bind(pattern)
    .bind(slice.limit)
    .bind(slice.offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_by_title(db: &PgPool, pattern: &str) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes WHERE title ILIKE $1")
        .bind(pattern)
        .fetch_one(db)
        .await?;
    Ok(total)
}

pub async fn any_ingredient_matches(db: &PgPool, pattern: &str) -> anyhow::Result<bool> {
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM ingredients WHERE name ILIKE $1)",
    )
    .bind(pattern)
    .fetch_one(db)
    .await?;
    Ok(found)
}

pub async fn search_by_ingredient(
    db: &PgPool,
    pattern: &str,
    slice: PageSlice,
) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes r \
         WHERE EXISTS (\
             SELECT 1 FROM recipe_ingredients ri \
             JOIN ingredients i ON i.id = ri.ingredient_id \
             WHERE ri.recipe_id = r.id AND i.name ILIKE $1) \
         ORDER BY created_at LIMIT $2 OFFSET $3"
    ))
    .bind(pattern)
    .bind(slice.limit)
    .bind(slice.offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_by_ingredient(db: &PgPool, pattern: &str) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM recipes r \
         WHERE EXISTS (\
             SELECT 1 FROM recipe_ingredients ri \
             JOIN ingredients i ON i.id = ri.ingredient_id \
             WHERE ri.recipe_id = r.id AND i.name ILIKE $1)",
    )
    .bind(pattern)
    .fetch_one(db)
    .await?;
    Ok(total)
}

pub async fn list_by_owner(
    db: &PgPool,
    owner_id: Uuid,
    slice: PageSlice,
) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes WHERE owner_id = $1 \
         ORDER BY created_at LIMIT $2 OFFSET $3"
    ))
    .bind(owner_id)
    .bind(slice.limit)
    .bind(slice.offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_by_owner(db: &PgPool, owner_id: Uuid) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes WHERE owner_id = $1")
        .bind(owner_id)
        .fetch_one(db)
        .await?;
    Ok(total)
}

pub async fn list_favorites(
    db: &PgPool,
    user_id: Uuid,
    slice: PageSlice,
) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes r \
         WHERE EXISTS (\
             SELECT 1 FROM recipe_favorites f \
             WHERE f.recipe_id = r.id AND f.user_id = $1) \
         ORDER BY created_at LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(slice.limit)
    .bind(slice.offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_favorites(db: &PgPool, user_id: Uuid) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM recipes r \
         WHERE EXISTS (\
             SELECT 1 FROM recipe_favorites f \
             WHERE f.recipe_id = r.id AND f.user_id = $1)",
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(total)
}

/// Like-count is computed by the aggregate, never stored on the recipe.
pub async fn list_popular(db: &PgPool, slice: PageSlice) -> anyhow::Result<Vec<PopularRecipe>> {
    let rows = sqlx::query_as::<_, PopularRecipe>(
        "SELECT r.id, r.title, r.preview, COUNT(f.user_id) AS total_added \
         FROM recipes r \
         LEFT JOIN recipe_favorites f ON f.recipe_id = r.id \
         GROUP BY r.id, r.title, r.preview \
         ORDER BY total_added DESC \
         LIMIT $1 OFFSET $2",
    )
    .bind(slice.limit)
    .bind(slice.offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn count_all(db: &PgPool) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes")
        .fetch_one(db)
        .await?;
    Ok(total)
}

pub async fn exists(db: &PgPool, recipe_id: Uuid) -> anyhow::Result<bool> {
    let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM recipes WHERE id = $1)")
        .bind(recipe_id)
        .fetch_one(db)
        .await?;
    Ok(found)
}

pub async fn insert(
    db: &PgPool,
    owner_id: Uuid,
    req: &CreateRecipeRequest,
) -> anyhow::Result<Recipe> {
    let mut tx = db.begin().await.context("begin tx")?;

    let recipe = sqlx::query_as::<_, Recipe>(&format!(
        "INSERT INTO recipes (title, category, description, preview, owner_id) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {RECIPE_COLUMNS}"
    ))
    .bind(&req.title)
    .bind(&req.category)
    .bind(&req.description)
    .bind(&req.preview)
    .bind(owner_id)
    .fetch_one(&mut *tx)
    .await?;

    for (position, ingredient) in req.ingredients.iter().enumerate() {
        sqlx::query(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, measure, position) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(recipe.id)
        .bind(ingredient.id)
        .bind(&ingredient.measure)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await.context("commit tx")?;
    Ok(recipe)
}

/// Delete a recipe, but only for its owner. Returns the number of rows gone.
pub async fn delete_owned(db: &PgPool, recipe_id: Uuid, owner_id: Uuid) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1 AND owner_id = $2")
        .bind(recipe_id)
        .bind(owner_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

/// One atomic conditional insert; the membership primary key turns a
/// duplicate like into zero affected rows instead of a second entry.
pub async fn add_favorite(db: &PgPool, recipe_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "INSERT INTO recipe_favorites (recipe_id, user_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(recipe_id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_favorite(db: &PgPool, recipe_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM recipe_favorites WHERE recipe_id = $1 AND user_id = $2")
        .bind(recipe_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_pattern_wraps_in_wildcards() {
        assert_eq!(contains_pattern("cake"), "%cake%");
        assert_eq!(contains_pattern(""), "%%");
    }

    #[test]
    fn contains_pattern_escapes_like_metacharacters() {
        assert_eq!(contains_pattern("50%"), "%50\\%%");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(contains_pattern(r"back\slash"), "%back\\\\slash%");
    }
}
