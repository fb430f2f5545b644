pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod payments;
pub mod pricing;
