//! Rotamail Common - Shared types and utilities
//!
//! This crate provides configuration and the error taxonomy
//! shared across all Rotamail components.

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
