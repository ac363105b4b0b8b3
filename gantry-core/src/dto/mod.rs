//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used between the orchestrator, its API clients
//! and the build-dispatch consumer.

pub mod dispatch;
pub mod execution;
