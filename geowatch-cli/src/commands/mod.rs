//! CLI command implementations.

pub mod config;
pub mod ip;
pub mod simulate;
