//! Admin endpoint handlers.

pub mod cache;
