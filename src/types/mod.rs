//! Shared type definitions
//!
//! Configuration and model descriptors used across the crate.

pub mod config;
pub mod model;
