//! Shared identifier types used across the order reservation crates.

mod types;

pub use types::OrderId;
