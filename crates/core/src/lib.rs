//! Quince Core - Shared types library.
//!
//! Common types used across the Quince storefront components. This crate
//! contains only types and traits - no I/O, no HTTP clients - so it can be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
