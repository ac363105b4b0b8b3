//! Trigger policy
//!
//! Decides whether an event should start an execution of a pipeline.

use async_trait::async_trait;
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::trigger::FilterSubject;

#[async_trait]
pub trait TriggerPolicy: Send + Sync {
    async fn allows(&self, pipeline: &Pipeline, subject: &FilterSubject) -> bool;
}

/// Evaluates the pipeline's own trigger rules
pub struct PipelineRulesPolicy;

#[async_trait]
impl TriggerPolicy for PipelineRulesPolicy {
    async fn allows(&self, pipeline: &Pipeline, subject: &FilterSubject) -> bool {
        let rules = &pipeline.triggers;
        rules.allows_event(subject.kind) && rules.allows_branch(subject.branch.as_deref())
    }
}
