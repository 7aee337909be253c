pub mod coupons;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod payments;
