//! # Configuration Module
//!
//! This module centralizes the constants that define bucket sizing and the
//! on-disk record layout. Interdependent values are co-located and checked at
//! compile time so that a change to one cannot silently invalidate another.
//!
//! Runtime configuration of a pool (directory, object name, bucket size) is
//! done through [`crate::storage::PoolBuilder`].
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency documentation

pub mod constants;
pub use constants::*;
