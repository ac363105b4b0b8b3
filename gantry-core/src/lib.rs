//! Gantry Core
//!
//! Core types and abstractions for the Gantry execution control plane.
//!
//! This crate contains:
//! - Domain types: Core business entities (Execution, Pipeline, checks)
//! - Trigger events: The inbound events that may create executions
//! - DTOs: Data transfer objects for API and dispatch communication

pub mod domain;
pub mod dto;
pub mod trigger;
