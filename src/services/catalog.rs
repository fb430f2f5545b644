use crate::{
    config::AppConfig,
    entities::product,
    errors::ServiceError,
    services::pricing::PricingSnapshot,
};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Product with the price the viewer would pay for a single unit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub base_price: Decimal,
    pub price: Decimal,
    pub inventory: Option<i32>,
}

impl ProductView {
    fn priced(product: product::Model, snapshot: &PricingSnapshot) -> Self {
        let price = snapshot.unit_price(product.id, product.base_price, 1);
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            category: product.category,
            base_price: product.base_price,
            price,
            inventory: product.inventory,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProductPage {
    pub products: Vec<ProductView>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    /// Filtered, name-ordered page of products. Anonymous viewers see base prices.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: ProductFilter,
        viewer: Option<Uuid>,
    ) -> Result<ProductPage, ServiceError> {
        let db = &*self.db;
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter
            .limit
            .unwrap_or(self.config.api_default_page_size)
            .clamp(1, self.config.api_max_page_size.max(1));

        let mut query = product::Entity::find();

        if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
            query = query.filter(product::Column::Category.eq(category));
        }
        if let Some(min) = filter.min_price {
            query = query.filter(product::Column::BasePrice.gte(min));
        }
        if let Some(max) = filter.max_price {
            query = query.filter(product::Column::BasePrice.lte(max));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = LikeExpr::new(contains_pattern(&search.to_lowercase())).escape('\\');
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(product::Column::Name))).like(pattern),
            );
        }

        let offset = (page - 1)
            .checked_mul(limit)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| ServiceError::ValidationError("Page is out of range".to_string()))?;

        let total = query.clone().count(db).await?;

        let rows = query
            .order_by_asc(product::Column::Name)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?;

        let snapshot = PricingSnapshot::load(db, viewer).await?;
        let products = rows
            .into_iter()
            .map(|p| ProductView::priced(p, &snapshot))
            .collect();

        Ok(ProductPage {
            products,
            page,
            limit,
            total,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_product(
        &self,
        product_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<ProductView, ServiceError> {
        let db = &*self.db;
        let product = product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let snapshot = PricingSnapshot::load(db, viewer).await?;
        Ok(ProductView::priced(product, &snapshot))
    }
}

/// Wraps `search` for a substring LIKE match, escaping wildcards with `\`.
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
