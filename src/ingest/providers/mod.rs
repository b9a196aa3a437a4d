// src/ingest/providers/mod.rs
pub mod google;
pub mod hostaway;
