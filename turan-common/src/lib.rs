//! # TuranTalim Common Library
//!
//! Shared code for TuranTalim services:
//! - Database initialization and shared enums
//! - Event types (`TuranEvent`) and the broadcast `EventBus`
//! - Bootstrap configuration loading
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
