use super::{Observer, RunContext};
use crate::errors::StructuredError;
use crate::run::Step;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Logs every lifecycle hook through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

#[async_trait]
impl Observer for TracingObserver {
    async fn before(&self, run: &RunContext) {
        info!(run_id = %run.run_id, iteration = run.iteration, "run started");
    }

    async fn before_step(&self, run: &RunContext, step: &Step) {
        info!(iteration = run.iteration, step = step.name(), "step started");
    }

    async fn before_step_action(&self, _run: &RunContext, step: &Step, action: &str) {
        debug!(step = step.name(), action, "action started");
    }

    async fn after_step_action(&self, _run: &RunContext, step: &Step, action: &str) {
        debug!(step = step.name(), action, "action finished");
    }

    async fn on_step_passed(&self, run: &RunContext, step: &Step) {
        info!(iteration = run.iteration, step = step.name(), "step passed");
    }

    async fn on_step_error(&self, run: &RunContext, step: &Step, error: &StructuredError) {
        warn!(
            iteration = run.iteration,
            step = step.name(),
            kind = %error.kind(),
            "step failed: {}",
            error.message()
        );
    }

    async fn on_step_skipped(&self, _run: &RunContext, step: &Step) {
        info!(step = step.name(), "step skipped");
    }

    async fn after(&self, run: &RunContext) {
        if run.failed {
            warn!(run_id = %run.run_id, iteration = run.iteration, "run failed");
        } else {
            info!(run_id = %run.run_id, iteration = run.iteration, "run passed");
        }
    }
}
