//! Discount resolution.
//!
//! Prices are resolved by filtering the active rules down to the ones that
//! apply, computing each candidate's monetary discount and subtracting only the
//! single largest one. Rules never stack. The functions here are pure and work
//! on snapshots so the same logic backs catalog listings, cart views and
//! checkout.

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::{
    discount_rule::{self, DiscountType},
    user,
};
use crate::errors::ServiceError;

pub type DiscountRule = discount_rule::Model;

/// Product and quantity to be priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInput {
    pub product_id: Uuid,
    pub base_price: Decimal,
    pub quantity: i32,
}

/// A line after discount resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discounted_unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub lines: Vec<PricedLine>,
    pub sub_total: Decimal,
    pub discount_applied: Decimal,
    pub total_amount: Decimal,
}

fn tier_matches(rule: &DiscountRule, tier_id: Option<Uuid>) -> bool {
    match rule.applicable_to_pricing_tier_id {
        None => true,
        Some(required) => tier_id == Some(required),
    }
}

/// Item-level eligibility. Rules gated on an order amount belong to the cart
/// and are never considered per item.
fn item_rule_applies(
    rule: &DiscountRule,
    product_id: Uuid,
    quantity: i32,
    tier_id: Option<Uuid>,
) -> bool {
    rule.is_active
        && rule.minimum_order_amount.is_none()
        && rule
            .applicable_to_product_id
            .map_or(true, |scoped| scoped == product_id)
        && tier_matches(rule, tier_id)
        && rule.minimum_quantity.map_or(true, |min| quantity >= min)
}

fn cart_rule_applies(rule: &DiscountRule, sub_total: Decimal, tier_id: Option<Uuid>) -> bool {
    rule.is_active
        && rule.applicable_to_product_id.is_none()
        && tier_matches(rule, tier_id)
        && rule
            .minimum_order_amount
            .map_or(false, |min| sub_total >= min)
}

/// Monetary value of `rule` against `amount`. Fixed discounts are flat and
/// never scaled by quantity.
fn discount_amount(rule: &DiscountRule, amount: Decimal) -> Decimal {
    match rule.rule_type {
        DiscountType::Percentage => amount * rule.value,
        DiscountType::Fixed => rule.value,
    }
}

/// Largest amount, zero when empty. The first maximum wins on ties.
fn largest(amounts: impl Iterator<Item = Decimal>) -> Decimal {
    amounts.fold(Decimal::ZERO, |best, amount| {
        if amount > best {
            amount
        } else {
            best
        }
    })
}

/// Best per-unit discount available for a product at the given quantity.
pub fn best_item_discount(
    product_id: Uuid,
    base_price: Decimal,
    quantity: i32,
    tier_id: Option<Uuid>,
    rules: &[DiscountRule],
) -> Decimal {
    largest(
        rules
            .iter()
            .filter(|rule| item_rule_applies(rule, product_id, quantity, tier_id))
            .map(|rule| discount_amount(rule, base_price)),
    )
}

/// Effective unit price, always within `0..=base_price`.
pub fn effective_unit_price(
    product_id: Uuid,
    base_price: Decimal,
    quantity: i32,
    tier_id: Option<Uuid>,
    rules: &[DiscountRule],
) -> Decimal {
    let best = best_item_discount(product_id, base_price, quantity, tier_id, rules);
    (base_price - best).max(Decimal::ZERO)
}

/// Best single cart-level discount for a subtotal.
pub fn best_cart_discount(
    sub_total: Decimal,
    tier_id: Option<Uuid>,
    rules: &[DiscountRule],
) -> Decimal {
    largest(
        rules
            .iter()
            .filter(|rule| cart_rule_applies(rule, sub_total, tier_id))
            .map(|rule| discount_amount(rule, sub_total)),
    )
}

/// Prices every line, then applies the best cart-level discount to the subtotal.
pub fn calculate_cart(
    lines: &[LineInput],
    tier_id: Option<Uuid>,
    rules: &[DiscountRule],
) -> CartTotals {
    let priced: Vec<PricedLine> = lines
        .iter()
        .map(|line| {
            let discounted = effective_unit_price(
                line.product_id,
                line.base_price,
                line.quantity,
                tier_id,
                rules,
            );
            PricedLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.base_price,
                discounted_unit_price: discounted,
                line_total: discounted * Decimal::from(line.quantity),
            }
        })
        .collect();

    let sub_total: Decimal = priced.iter().map(|line| line.line_total).sum();
    let discount_applied = best_cart_discount(sub_total, tier_id, rules);
    let total_amount = (sub_total - discount_applied).max(Decimal::ZERO);

    CartTotals {
        lines: priced,
        sub_total,
        discount_applied,
        total_amount,
    }
}

/// Caller's tier plus every active rule, read once per request.
#[derive(Debug, Clone, Default)]
pub struct PricingSnapshot {
    pub tier_id: Option<Uuid>,
    pub rules: Vec<DiscountRule>,
}

impl PricingSnapshot {
    /// Loads the snapshot for `user_id`; anonymous callers get an empty one.
    pub async fn load<C: ConnectionTrait>(
        conn: &C,
        user_id: Option<Uuid>,
    ) -> Result<Self, ServiceError> {
        let Some(user_id) = user_id else {
            return Ok(Self::default());
        };

        let tier_id = user::Entity::find_by_id(user_id)
            .one(conn)
            .await?
            .and_then(|u| u.pricing_tier_id);

        let rules = discount_rule::Entity::find()
            .filter(discount_rule::Column::IsActive.eq(true))
            .all(conn)
            .await?;

        Ok(Self { tier_id, rules })
    }

    pub fn unit_price(&self, product_id: Uuid, base_price: Decimal, quantity: i32) -> Decimal {
        effective_unit_price(product_id, base_price, quantity, self.tier_id, &self.rules)
    }

    pub fn price_cart(&self, lines: &[LineInput]) -> CartTotals {
        calculate_cart(lines, self.tier_id, &self.rules)
    }
}
