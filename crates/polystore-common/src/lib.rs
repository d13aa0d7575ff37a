//! Shared error taxonomy for polystore

pub mod error;

pub use error::{Result, StorageError};
