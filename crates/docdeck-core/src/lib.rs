//! Core types, config, and errors for docdeck.

pub mod config;
pub mod error;
pub mod types;
