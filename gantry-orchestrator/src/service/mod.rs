//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and the outside collaborators
//! (source control, build dispatch, authorization) and own the execution
//! lifecycle rules.

pub mod authz;
pub mod canceler;
pub mod check;
pub mod commit;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod policy;
pub mod signals;
pub mod triggerer;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::ExecutionController;
pub use error::ExecutionError;
