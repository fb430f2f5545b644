use crate::{
    entities::{
        cart, cart_item,
        order::{self, OrderStatus},
        order_item, product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::{line_inputs, load_cart_lines, CartLine},
        payments::{PaymentHandle, PaymentProvider},
        pricing::{CartTotals, PricingSnapshot},
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, LoaderTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Reply to a successful checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment: PaymentHandle,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discounted_unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<order_item::Model> for OrderItemView {
    fn from(item: order_item::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            discounted_unit_price: item.discounted_unit_price,
            line_total: item.line_total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    pub status: OrderStatus,
    pub sub_total: Decimal,
    pub discount_applied: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    fn new(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            status: order.status,
            sub_total: order.sub_total,
            discount_applied: order.discount_applied,
            total_amount: order.total_amount,
            currency: order.currency,
            payment_reference: order.payment_reference,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.into_iter().map(OrderItemView::from).collect(),
        }
    }
}

/// Converts a major-unit total into provider minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Turns carts into orders and serves order history.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    payments: Arc<dyn PaymentProvider>,
    event_sender: Arc<EventSender>,
    currency: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        payments: Arc<dyn PaymentProvider>,
        event_sender: Arc<EventSender>,
        currency: String,
    ) -> Self {
        Self {
            db,
            payments,
            event_sender,
            currency,
        }
    }

    /// Checks out the user's cart.
    ///
    /// Inventory, the order rows and the cart clearing share one transaction
    /// with the payment request. Any failure, including the provider call,
    /// rolls all of it back.
    #[instrument(skip(self))]
    pub async fn create_order(&self, user_id: Uuid) -> Result<OrderConfirmation, ServiceError> {
        let txn = self.db.begin().await?;
        let outcome = self.place_order(&txn, user_id).await;

        match outcome {
            Ok((order, payment)) => {
                txn.commit().await?;
                counter!("storefront.orders.created", 1);
                info!(order_id = %order.id, %user_id, total = %order.total_amount, "order created");

                self.event_sender.send_or_log(Event::OrderCreated {
                    order_id: order.id,
                    user_id,
                    total_amount: order.total_amount,
                });

                Ok(OrderConfirmation {
                    order_id: order.id,
                    total_amount: order.total_amount,
                    currency: order.currency,
                    payment,
                })
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(%user_id, "order rollback failed: {}", rollback_err);
                }
                counter!("storefront.orders.failed", 1);
                warn!(%user_id, "order creation failed: {}", err);
                Err(err)
            }
        }
    }

    async fn place_order(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
    ) -> Result<(order::Model, PaymentHandle), ServiceError> {
        let cart = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(txn)
            .await?
            .ok_or(ServiceError::EmptyCart)?;

        let mut lines = load_cart_lines(txn, cart.id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        // consistent row order across concurrent checkouts
        lines.sort_by_key(|(_, product)| product.id);

        let snapshot = PricingSnapshot::load(txn, Some(user_id)).await?;
        let totals = snapshot.price_cart(&line_inputs(&lines));

        for (item, product) in &lines {
            reserve_stock(txn, product, item.quantity).await?;
        }

        let order = self.insert_order(txn, user_id, &lines, &totals).await?;

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(txn)
            .await?;

        let amount_minor = to_minor_units(totals.total_amount)
            .filter(|minor| *minor > 0)
            .ok_or_else(|| {
                ServiceError::PaymentInitiation(format!(
                    "Order total {} is not payable",
                    totals.total_amount
                ))
            })?;

        let payment = self
            .payments
            .create_payment_request(amount_minor, &self.currency, &order.id.to_string())
            .await
            .map_err(|e| {
                error!(order_id = %order.id, error = %e, "payment initiation failed");
                ServiceError::PaymentInitiation("Payment provider unavailable".to_string())
            })?;

        let mut active: order::ActiveModel = order.into();
        active.payment_reference = Set(Some(payment.provider_reference.clone()));
        active.updated_at = Set(Utc::now());
        let order = active.update(txn).await?;

        Ok((order, payment))
    }

    async fn insert_order(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        lines: &[CartLine],
        totals: &CartTotals,
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            sub_total: Set(totals.sub_total),
            discount_applied: Set(totals.discount_applied),
            total_amount: Set(totals.total_amount),
            currency: Set(self.currency.clone()),
            status: Set(OrderStatus::PendingPayment),
            payment_reference: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        for ((_, product), priced) in lines.iter().zip(&totals.lines) {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                quantity: Set(priced.quantity),
                unit_price: Set(priced.unit_price),
                discounted_unit_price: Set(priced.discounted_unit_price),
                line_total: Set(priced.line_total),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;
        }

        Ok(order)
    }

    /// The user's orders, newest first, each with its items.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let db = &*self.db;
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await?;
        let items = orders.load_many(order_item::Entity, db).await?;

        Ok(orders
            .into_iter()
            .zip(items)
            .map(|(order, items)| OrderView::new(order, items))
            .collect())
    }

    /// A single order. Orders owned by someone else read as missing.
    #[instrument(skip(self))]
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let db = &*self.db;
        let order = order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::ProductName)
            .all(db)
            .await?;

        Ok(OrderView::new(order, items))
    }
}

/// Decrements tracked stock with a compare-and-set, so two checkouts can never
/// both take the last unit. Untracked products (`inventory` NULL) pass through.
async fn reserve_stock(
    txn: &DatabaseTransaction,
    product: &product::Model,
    quantity: i32,
) -> Result<(), ServiceError> {
    if product.inventory.is_none() {
        return Ok(());
    }

    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Inventory,
            Expr::col(product::Column::Inventory).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product.id))
        .filter(product::Column::Inventory.gte(quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        let available = product::Entity::find_by_id(product.id)
            .one(txn)
            .await?
            .and_then(|p| p.inventory)
            .unwrap_or(0);

        warn!(
            product_id = %product.id,
            available,
            requested = quantity,
            "insufficient inventory"
        );
        return Err(ServiceError::InsufficientInventory {
            product: product.name.clone(),
            available,
            requested: quantity,
        });
    }

    Ok(())
}
