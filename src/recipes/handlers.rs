use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{dto::MessageResponse, extractors::AuthUser},
    error::ApiError,
    recipes::{
        dto::{
            CategoryGroup, CreateRecipeRequest, DeletedResponse, FavoriteRequest, PageQuery, Paged,
            RecipeDetails, SearchQuery,
        },
        repo::{self, PopularRecipe, Recipe},
    },
    state::AppState,
};

const CATEGORY_PAGE: i64 = 8;
const SEARCH_PAGE: i64 = 8;
const PROFILE_PAGE: i64 = 4;
const LANDING_GROUP: usize = 4;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/main-page", get(main_page))
        .route("/recipes/category/:name", get(by_category))
        .route("/recipes/search/title", get(by_title))
        .route("/recipes/search/ingredient", get(by_ingredient))
        .route("/recipes/popular", get(popular))
        .route("/recipes/own", get(own_recipes))
        .route("/recipes/favorites", get(favorites).post(add_favorite))
        .route("/recipes/favorites/:id", delete(remove_favorite))
        .route("/recipes", post(create_recipe))
        .route("/recipes/:id", get(by_id).delete(delete_recipe))
}

/// Group the landing query's rows by category, keeping at most the first
/// four recipes per category. Groups appear in first-encounter order and
/// categories without recipes are simply absent.
fn group_for_landing(recipes: Vec<Recipe>) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    for recipe in recipes {
        let idx = match groups.iter().position(|g| g.category == recipe.category) {
            Some(idx) => idx,
            None => {
                groups.push(CategoryGroup {
                    category: recipe.category.clone(),
                    recipes: Vec::new(),
                });
                groups.len() - 1
            }
        };
        if groups[idx].recipes.len() < LANDING_GROUP {
            groups[idx].recipes.push(recipe);
        }
    }
    groups
}

#[instrument(skip(state))]
async fn main_page(State(state): State<AppState>) -> Result<Json<Vec<CategoryGroup>>, ApiError> {
    let recipes = repo::list_landing(&state.db).await?;
    Ok(Json(group_for_landing(recipes)))
}

#[instrument(skip(state))]
async fn by_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(paging): Query<PageQuery>,
) -> Result<Json<Paged<Recipe>>, ApiError> {
    let slice = paging.slice(CATEGORY_PAGE)?;
    let recipes = repo::list_by_category(&state.db, &name, slice).await?;
    if recipes.is_empty() {
        return Err(ApiError::NotFound("no recipes found".into()));
    }
    let total = repo::count_by_category(&state.db, &name).await?;
    Ok(Json(Paged { total, recipes }))
}

#[instrument(skip(state))]
async fn by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<RecipeDetails>>, ApiError> {
    // A missing recipe is a JSON null, not an error.
    let Some(recipe) = repo::get_by_id(&state.db, id).await? else {
        return Ok(Json(None));
    };
    let ingredients = repo::ingredients_of(&state.db, recipe.id).await?;
    Ok(Json(Some(RecipeDetails {
        recipe,
        ingredients,
    })))
}

#[instrument(skip(state))]
async fn by_title(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<Json<Paged<Recipe>>, ApiError> {
    let slice = search.slice(SEARCH_PAGE)?;
    let pattern = repo::contains_pattern(&search.query);
    let recipes = repo::search_by_title(&state.db, &pattern, slice).await?;
    if recipes.is_empty() {
        return Err(ApiError::NotFound("no recipes found".into()));
    }
    let total = repo::count_by_title(&state.db, &pattern).await?;
    Ok(Json(Paged { total, recipes }))
}

#[instrument(skip(state))]
async fn by_ingredient(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<Json<Paged<Recipe>>, ApiError> {
    let slice = search.slice(SEARCH_PAGE)?;
    let pattern = repo::contains_pattern(&search.query);
    if !repo::any_ingredient_matches(&state.db, &pattern).await? {
        return Err(ApiError::NotFound("no recipes found".into()));
    }
    let recipes = repo::search_by_ingredient(&state.db, &pattern, slice).await?;
    if recipes.is_empty() {
        return Err(ApiError::NotFound("no recipes found".into()));
    }
    let total = repo::count_by_ingredient(&state.db, &pattern).await?;
    Ok(Json(Paged { total, recipes }))
}

#[instrument(skip(state, user))]
async fn own_recipes(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(paging): Query<PageQuery>,
) -> Result<Json<Paged<Recipe>>, ApiError> {
    let slice = paging.slice(PROFILE_PAGE)?;
    let recipes = repo::list_by_owner(&state.db, user.id, slice).await?;
    if recipes.is_empty() {
        return Err(ApiError::NotFound("no recipes found".into()));
    }
    let total = repo::count_by_owner(&state.db, user.id).await?;
    Ok(Json(Paged { total, recipes }))
}

#[instrument(skip(state, user, payload))]
async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let recipe = repo::insert(&state.db, user.id, &payload).await?;
    info!(recipe_id = %recipe.id, owner_id = %user.id, "recipe created");
    Ok((StatusCode::CREATED, Json(recipe)))
}

#[instrument(skip(state, user))]
async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = repo::delete_owned(&state.db, id, user.id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Not found".into()));
    }
    info!(recipe_id = %id, owner_id = %user.id, "recipe deleted");
    Ok(Json(DeletedResponse {
        id,
        message: "Recipe deleted".into(),
    }))
}

#[instrument(skip(state, user))]
async fn favorites(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(paging): Query<PageQuery>,
) -> Result<Json<Paged<Recipe>>, ApiError> {
    let slice = paging.slice(PROFILE_PAGE)?;
    let recipes = repo::list_favorites(&state.db, user.id, slice).await?;
    if recipes.is_empty() {
        return Err(ApiError::NotFound("no recipes found".into()));
    }
    let total = repo::count_favorites(&state.db, user.id).await?;
    Ok(Json(Paged { total, recipes }))
}

#[instrument(skip(state, user, payload))]
async fn add_favorite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<FavoriteRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    if !repo::exists(&state.db, payload.recipe_id).await? {
        return Err(ApiError::NotFound("Recipe not found".into()));
    }
    if !repo::add_favorite(&state.db, payload.recipe_id, user.id).await? {
        return Err(ApiError::Conflict("recipe already liked".into()));
    }
    info!(recipe_id = %payload.recipe_id, user_id = %user.id, "recipe liked");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Added to favorite recipes")),
    ))
}

#[instrument(skip(state, user))]
async fn remove_favorite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !repo::exists(&state.db, id).await? {
        return Err(ApiError::NotFound("Recipe not found".into()));
    }
    if !repo::remove_favorite(&state.db, id, user.id).await? {
        return Err(ApiError::Conflict(
            "recipe is not in your favorite list".into(),
        ));
    }
    info!(recipe_id = %id, user_id = %user.id, "recipe unliked");
    Ok(Json(MessageResponse::new("Recipe deleted")))
}

#[instrument(skip(state))]
async fn popular(
    State(state): State<AppState>,
    Query(paging): Query<PageQuery>,
) -> Result<Json<Paged<PopularRecipe>>, ApiError> {
    let slice = paging.slice(PROFILE_PAGE)?;
    let recipes = repo::list_popular(&state.db, slice).await?;
    if recipes.is_empty() {
        return Err(ApiError::NotFound("no recipes found".into()));
    }
    let total = repo::count_all(&state.db).await?;
    Ok(Json(Paged { total, recipes }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn recipe(title: &str, category: &str) -> Recipe {
        Recipe {
            id: Uuid::new_v4(),
            title: title.into(),
            category: category.into(),
            description: String::new(),
            preview: None,
            owner_id: Uuid::new_v4(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn landing_groups_keep_first_four_per_category() {
        let mut rows = Vec::new();
        for i in 0..6 {
            rows.push(recipe(&format!("breakfast {i}"), "Breakfast"));
        }
        rows.push(recipe("cake", "Dessert"));

        let groups = group_for_landing(rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].category, "Breakfast");
        assert_eq!(groups[0].recipes.len(), 4);
        assert_eq!(groups[0].recipes[0].title, "breakfast 0");
        assert_eq!(groups[0].recipes[3].title, "breakfast 3");
        assert_eq!(groups[1].category, "Dessert");
        assert_eq!(groups[1].recipes.len(), 1);
    }

    #[test]
    fn landing_groups_follow_first_encounter_order() {
        let rows = vec![
            recipe("pie", "Dessert"),
            recipe("eggs", "Breakfast"),
            recipe("cake", "Dessert"),
        ];
        let groups = group_for_landing(rows);
        assert_eq!(groups[0].category, "Dessert");
        assert_eq!(groups[1].category, "Breakfast");
        assert_eq!(groups[0].recipes.len(), 2);
    }

    #[test]
    fn landing_groups_empty_input_yields_no_groups() {
        assert!(group_for_landing(Vec::new()).is_empty());
    }
}
