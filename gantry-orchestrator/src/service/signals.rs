//! Outbound signals
//!
//! Bundles the build dispatcher and check reporter so the services emit
//! start/abort messages and check updates the same way. Every signal is
//! best-effort; failures are logged by the helpers they delegate to.

use gantry_core::domain::execution::Execution;
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::dispatch::DispatchMessage;
use std::sync::Arc;

use crate::service::check::{CheckReporter, LinkBuilder, report_logged};
use crate::service::dispatch::{BuildDispatcher, dispatch_logged};

#[derive(Clone)]
pub struct Signals {
    dispatcher: Arc<dyn BuildDispatcher>,
    checks: Arc<dyn CheckReporter>,
    links: LinkBuilder,
}

impl Signals {
    pub fn new(
        dispatcher: Arc<dyn BuildDispatcher>,
        checks: Arc<dyn CheckReporter>,
        links: LinkBuilder,
    ) -> Self {
        Self {
            dispatcher,
            checks,
            links,
        }
    }

    /// Ask the dispatcher to schedule a freshly created execution.
    pub async fn start(&self, execution: &Execution, pipeline: &Pipeline) {
        dispatch_logged(
            self.dispatcher.as_ref(),
            DispatchMessage::start(execution, pipeline),
        )
        .await;
    }

    /// Tell runners to stop working on an execution.
    pub async fn abort(&self, execution: &Execution) {
        dispatch_logged(self.dispatcher.as_ref(), DispatchMessage::abort(execution.id)).await;
    }

    /// Publish the execution's current status as a commit check.
    pub async fn check(&self, execution: &Execution) {
        report_logged(self.checks.as_ref(), &self.links, execution).await;
    }
}
