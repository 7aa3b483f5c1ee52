//! Rotamail Storage - Database access layer
//!
//! This crate provides the PostgreSQL-backed account and campaign stores.
//! Campaign recipients and the sending-account snapshot live as JSONB
//! document columns so that one delivery attempt can read-modify-write
//! them as a unit.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
