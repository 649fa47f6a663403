//! Common utilities for docmodel
//!
//! This crate provides the error type shared by the docmodel crates.

pub mod error;

pub use error::{OdmError, Result};
