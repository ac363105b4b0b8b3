//! Build-dispatch messages
//!
//! Sent to whatever schedules work on runners. Consumers must dedupe by
//! execution id; the orchestrator sends each message at most once but offers
//! no delivery guarantee.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::execution::Execution;
use crate::domain::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DispatchMessage {
    Start {
        execution_id: Uuid,
        pipeline_id: Uuid,
        number: i64,
        config_path: String,
        params: HashMap<String, String>,
        debug: bool,
    },
    Abort {
        execution_id: Uuid,
    },
}

impl DispatchMessage {
    pub fn start(execution: &Execution, pipeline: &Pipeline) -> Self {
        DispatchMessage::Start {
            execution_id: execution.id,
            pipeline_id: pipeline.id,
            number: execution.number,
            config_path: pipeline.config_path.clone(),
            params: execution.params.clone(),
            debug: execution.debug,
        }
    }

    pub fn abort(execution_id: Uuid) -> Self {
        DispatchMessage::Abort { execution_id }
    }

    pub fn execution_id(&self) -> Uuid {
        match self {
            DispatchMessage::Start { execution_id, .. } | DispatchMessage::Abort { execution_id } => {
                *execution_id
            }
        }
    }
}
