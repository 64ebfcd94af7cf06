//! Domain model for per-project reference numbering.
//!
//! # Responsibility
//! - Define the closed set of trackable entity kinds and their identities.
//! - Define the persisted reference record and lifecycle notifications.
//!
//! # Invariants
//! - Entity kinds are a closed tagged union; no runtime type lookup.
//! - A reference number is only meaningful together with its project.

pub mod entity;
pub mod event;
pub mod reference;
