use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::recipes::repo::{Recipe, RecipeIngredient};

/// 1-based `page`/`limit` query parameters shared by all paged endpoints.
/// The default limit differs per endpoint, so it is supplied at resolution.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageSlice {
    pub limit: i64,
    pub offset: i64,
}

impl PageQuery {
    pub fn slice(&self, default_limit: i64) -> Result<PageSlice, ApiError> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(default_limit);
        if page < 1 || limit < 1 {
            return Err(ApiError::BadRequest("invalid pagination".into()));
        }
        Ok(PageSlice {
            limit,
            offset: (page - 1) * limit,
        })
    }
}

/// Substring search endpoints take `query` next to the paging parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl SearchQuery {
    pub fn slice(&self, default_limit: i64) -> Result<PageSlice, ApiError> {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
        .slice(default_limit)
    }
}

/// Envelope of every paged listing: `total` counts all matches, not the page.
#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub total: i64,
    pub recipes: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct IngredientRef {
    pub id: Uuid,
    #[serde(default)]
    pub measure: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecipeRequest {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub preview: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<IngredientRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    pub recipe_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub message: String,
}

/// One landing-feed group: a category with its first few recipes.
#[derive(Debug, Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub recipes: Vec<Recipe>,
}

/// A single recipe with its ingredient list resolved.
#[derive(Debug, Serialize)]
pub struct RecipeDetails {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<RecipeIngredient>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_defaults_to_first_page() {
        let q = PageQuery::default();
        let s = q.slice(8).unwrap();
        assert_eq!(s.limit, 8);
        assert_eq!(s.offset, 0);
    }

    #[test]
    fn slice_computes_offset_from_page_and_limit() {
        let q = PageQuery {
            page: Some(3),
            limit: Some(4),
        };
        let s = q.slice(8).unwrap();
        assert_eq!(s.limit, 4);
        assert_eq!(s.offset, 8);
    }

    #[test]
    fn explicit_limit_overrides_the_default() {
        let q = PageQuery {
            page: None,
            limit: Some(2),
        };
        let s = q.slice(8).unwrap();
        assert_eq!(s.limit, 2);
        assert_eq!(s.offset, 0);
    }

    #[test]
    fn zero_or_negative_pagination_is_rejected() {
        for (page, limit) in [(Some(0), None), (None, Some(0)), (Some(-1), Some(4))] {
            let q = PageQuery { page, limit };
            assert!(q.slice(8).is_err());
        }
    }

    #[test]
    fn paged_envelope_has_total_and_recipes_keys() {
        let body = Paged::<u32> {
            total: 10,
            recipes: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["total"], 10);
        assert_eq!(json["recipes"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn favorite_request_uses_camel_case() {
        let req: FavoriteRequest =
            serde_json::from_str(r#"{"recipeId":"00000000-0000-0000-0000-000000000001"}"#)
                .unwrap();
        assert_eq!(
            req.recipe_id,
            "00000000-0000-0000-0000-000000000001".parse::<Uuid>().unwrap()
        );
    }
}
