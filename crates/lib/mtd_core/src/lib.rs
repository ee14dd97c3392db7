//! # mtd_core
//!
//! Core submission pipeline for Making Tax Digital: tokens, fraud-prevention
//! headers, category mapping, aggregation, payload building, HMRC calls and
//! the submission ledger.

pub mod aggregate;
pub mod boxes;
pub mod config;
pub mod error;
pub mod fraud_headers;
pub mod hmrc;
pub mod keyed_lock;
pub mod migrate;
pub mod models;
pub mod payload;
pub mod secrets;
pub mod store;
pub mod submission;
pub mod tax_year;
pub mod tokens;
pub mod translate;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
