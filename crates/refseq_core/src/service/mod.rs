//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate sequence and reference repositories into allocation APIs.
//! - Provide the tracker host that persists entities and fires hooks.

pub mod reference_service;
pub mod tracker_service;
