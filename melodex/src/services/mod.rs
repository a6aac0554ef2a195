//! Stateless domain services (C2, C4, C5, C6, C8).
//!
//! Catalog persistence lives in `crate::db`; session orchestration lives in
//! `crate::workflow`. Everything in here is a pure function or a
//! constructor-injected value type with no process-global state.

pub mod auto_resolver;
pub mod file_scanner;
pub mod fingerprint_generator;
pub mod fingerprint_matcher;
pub mod fuzzy_matcher;
pub mod metadata_extractor;
