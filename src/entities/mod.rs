pub mod cart;
pub mod cart_item;
pub mod discount_rule;
pub mod order;
pub mod order_item;
pub mod pricing_tier;
pub mod product;
pub mod user;
