pub mod actor;
pub mod cart;
pub mod pharmacy;
pub mod pricing;
pub mod product;
pub mod state;
