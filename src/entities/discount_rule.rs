use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scoped price reduction.
///
/// Every optional column narrows where the rule applies; a rule with all of
/// them unset is a general rule. `minimum_quantity` gates a single line item,
/// `minimum_order_amount` gates the whole cart.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub rule_type: DiscountType,
    /// Fraction of the price for `percentage` (0.1 = 10%), flat amount for `fixed`.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub value: Decimal,
    pub is_active: bool,
    pub applicable_to_product_id: Option<Uuid>,
    pub applicable_to_pricing_tier_id: Option<Uuid>,
    pub minimum_quantity: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub minimum_order_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ApplicableToProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::pricing_tier::Entity",
        from = "Column::ApplicableToPricingTierId",
        to = "super::pricing_tier::Column::Id"
    )]
    PricingTier,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::pricing_tier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PricingTier.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
