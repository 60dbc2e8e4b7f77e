//! Shared domain types for the image processing service.
//!
//! Has no internal workspace dependencies so every other crate can use it.

pub mod env;
pub mod error;
pub mod naming;
pub mod status;
pub mod types;
pub mod upload;
