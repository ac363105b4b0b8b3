//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles persistence for a specific domain entity and is
//! trait-based so the services can run against PostgreSQL or memory.

pub mod error;
pub mod execution;
pub mod memory;
pub mod pipeline;

pub use error::StoreError;
pub use execution::{ExecutionRepository, PgExecutionRepository};
pub use memory::{MemoryExecutionRepository, MemoryPipelineRepository};
pub use pipeline::{PgPipelineRepository, PipelineRepository};
