//! Utility Module Implementation
//!
//! Aggregates internal helpers: logging setup, file IO, request validation and
//! per-invocation working storage.

pub mod io;
pub mod logger;
pub mod scope;
pub mod validation;

pub use self::{
    io::{read_file, secure_erase, write_file_atomic},
    logger::init_logging,
    scope::WorkingScope,
    validation::validate_payload,
};
