#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Configuration options
pub mod config;

/// Document mirror and line-offset index
pub mod doc;

/// Editor capability surface
pub mod editor;

/// Error (common error types)
pub mod error;

/// Sync engine, reconciliation, and multi-document management
pub mod sync;

/// Change tracking and echo suppression
pub mod tracker;

/// Core value types
pub mod types;

#[cfg(test)]
pub mod test_utils;
