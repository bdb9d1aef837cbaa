//! Core types and trait definitions for Ident, the contact identity
//! reconciliation service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::ContactStore`]; the request layer
//! drives [`resolver::Resolver`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod contact;
pub mod error;
pub mod identity;
pub mod memory;
pub mod resolver;
pub mod store;

pub use error::{CorruptGraph, Error, Result};
