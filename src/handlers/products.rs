use crate::handlers::common::{success_response, validate_input, PaginatedResponse};
use crate::{auth::AuthUser, errors::ApiError, services::catalog::ProductFilter, AppState};
use axum::{
    extract::{Extension, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Catalog endpoints; prices are personalised when a caller is attached
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[validate(length(max = 100))]
    pub search: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<u64>,
    #[validate(range(min = 1))]
    pub limit: Option<u64>,
}

impl From<ListProductsQuery> for ProductFilter {
    fn from(query: ListProductsQuery) -> Self {
        Self {
            category: query.category,
            min_price: query.min_price,
            max_price: query.max_price,
            search: query.search,
            page: query.page,
            limit: query.limit,
        }
    }
}

async fn list_products(
    State(state): State<Arc<AppState>>,
    viewer: Option<Extension<AuthUser>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&query)?;
    if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
        if min > max {
            return Err(ApiError::ValidationError(
                "minPrice cannot exceed maxPrice".to_string(),
            ));
        }
    }

    let viewer = viewer.map(|Extension(user)| user.user_id);
    let page = state
        .services
        .catalog
        .list_products(query.into(), viewer)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        page.products,
        page.page,
        page.limit,
        page.total,
    )))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    viewer: Option<Extension<AuthUser>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = viewer.map(|Extension(user)| user.user_id);
    let product = state.services.catalog.get_product(id, viewer).await?;
    Ok(success_response(product))
}
