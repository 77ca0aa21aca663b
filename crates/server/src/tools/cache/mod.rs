//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting, invalidating and warming the
//! two-tier cache.

pub mod invalidate;
pub mod stats;
pub mod warm;

pub use invalidate::{CacheInvalidateParams, invalidate_impl};
pub use stats::stats_impl;
pub use warm::warm_impl;
