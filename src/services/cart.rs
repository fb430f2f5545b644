use crate::{
    entities::{cart, cart_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::{CartTotals, LineInput, PricingSnapshot},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Priced line as returned to the shopper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discounted_unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<CartItemView>,
    pub sub_total: Decimal,
    pub discount_applied: Decimal,
    pub total_amount: Decimal,
}

/// A cart row joined with its product.
pub(crate) type CartLine = (cart_item::Model, product::Model);

/// Cart rows with their products, oldest first.
pub(crate) async fn load_cart_lines<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<Vec<CartLine>, ServiceError> {
    let rows = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .find_also_related(product::Entity)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item, product)| match product {
            Some(product) => Some((item, product)),
            None => {
                warn!(item_id = %item.id, "cart item references a missing product");
                None
            }
        })
        .collect())
}

pub(crate) fn line_inputs(lines: &[CartLine]) -> Vec<LineInput> {
    lines
        .iter()
        .map(|(item, product)| LineInput {
            product_id: product.id,
            base_price: product.base_price,
            quantity: item.quantity,
        })
        .collect()
}

fn build_view(cart_id: Uuid, lines: &[CartLine], totals: CartTotals) -> CartView {
    let items = lines
        .iter()
        .zip(totals.lines)
        .map(|((item, product), priced)| CartItemView {
            id: item.id,
            product_id: product.id,
            name: product.name.clone(),
            quantity: item.quantity,
            unit_price: priced.unit_price,
            discounted_unit_price: priced.discounted_unit_price,
            line_total: priced.line_total,
        })
        .collect();

    CartView {
        id: cart_id,
        items,
        sub_total: totals.sub_total,
        discount_applied: totals.discount_applied,
        total_amount: totals.total_amount,
    }
}

/// Per-user cart. Every call returns a freshly priced view.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the user's cart, creating it on first access.
    async fn get_or_create(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        let db = &*self.db;
        if let Some(existing) = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let created = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await;

        match created {
            Ok(model) => {
                info!(%user_id, cart_id = %model.id, "created cart");
                Ok(model)
            }
            // lost a race on the unique user_id; the other insert won
            Err(err) => cart::Entity::find()
                .filter(cart::Column::UserId.eq(user_id))
                .one(db)
                .await?
                .ok_or(ServiceError::DatabaseError(err)),
        }
    }

    async fn priced_view(&self, user_id: Uuid, cart_id: Uuid) -> Result<CartView, ServiceError> {
        let db = &*self.db;
        let snapshot = PricingSnapshot::load(db, Some(user_id)).await?;
        let lines = load_cart_lines(db, cart_id).await?;
        let totals = snapshot.price_cart(&line_inputs(&lines));
        Ok(build_view(cart_id, &lines, totals))
    }

    /// Finds a line only if it belongs to the user's cart.
    async fn owned_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        cart_item::Entity::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))
    }

    fn notify(&self, user_id: Uuid, cart_id: Uuid) {
        self.event_sender
            .send_or_log(Event::CartUpdated { user_id, cart_id });
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create(user_id).await?;
        self.priced_view(user_id, cart.id).await
    }

    /// Adds `quantity` units, merging into an existing line for the product.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let db = &*self.db;
        product::Entity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let cart = self.get_or_create(user_id).await?;
        let now = Utc::now();

        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(db)
            .await?;

        if let Some(item) = existing {
            let merged = item.quantity.checked_add(quantity).ok_or_else(|| {
                ServiceError::ValidationError("Quantity is too large".to_string())
            })?;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(merged);
            item.updated_at = Set(now);
            item.update(db).await?;
        } else {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await?;
        }

        info!(%user_id, %product_id, quantity, "added item to cart");
        self.notify(user_id, cart.id);
        self.priced_view(user_id, cart.id).await
    }

    /// Sets a line's quantity; zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity cannot be negative".to_string(),
            ));
        }

        let cart = self.get_or_create(user_id).await?;
        let item = self.owned_item(cart.id, item_id).await?;

        if quantity == 0 {
            item.delete(&*self.db).await?;
            info!(%user_id, %item_id, "removed cart item via zero quantity");
        } else {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&*self.db).await?;
        }

        self.notify(user_id, cart.id);
        self.priced_view(user_id, cart.id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create(user_id).await?;
        let item = self.owned_item(cart.id, item_id).await?;
        item.delete(&*self.db).await?;

        info!(%user_id, %item_id, "removed cart item");
        self.notify(user_id, cart.id);
        self.priced_view(user_id, cart.id).await
    }
}
