//! Common types, traits and configuration loading shared across the engine

pub mod config;
pub mod traits;
pub mod types;
