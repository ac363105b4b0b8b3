//! Core domain types
//!
//! This module contains the core domain structures used across Gantry crates.
//! These types represent the fundamental business entities and are shared between
//! the orchestrator (for persistence) and its clients (for display and requests).

pub mod access;
pub mod check;
pub mod commit;
pub mod execution;
pub mod pipeline;
