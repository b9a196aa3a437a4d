// src/config/mod.rs
pub mod reviews;

pub use reviews::{AppConfig, PlaceConfig, StoreKind};
