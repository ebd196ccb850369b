//! URL handling for trawler
//!
//! This module provides URL canonicalization (the dedup key for the whole
//! engine), host extraction, and the table-driven domain boost lookup used
//! by frontier priorities.

mod canonical;
mod domain;

pub use canonical::canonicalize_url;
pub use domain::{extract_domain, DomainBoosts};
