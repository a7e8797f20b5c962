//! Lifecycle observers.
//!
//! Per step the hooks fire in a fixed order:
//!
//! ```text
//! before_step → (before_step_action → after_step_action)* → on_step_passed | on_step_error → after_step
//! ```
//!
//! Per run, `before` fires once at the start and `after` once when the run passes or
//! fails. A cancelled run stops without calling `after`.

use crate::core::Settings;
use crate::errors::StructuredError;
use crate::run::Step;
use async_trait::async_trait;
use std::sync::Arc;

pub mod chain;
pub mod logging;
pub mod timing;

pub use chain::ObserverChain;
pub use logging::TracingObserver;
pub use timing::StepTimer;

/// Read-only view of the run handed to observers.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: uuid::Uuid,
    pub iteration: u32,
    pub settings: Arc<Settings>,
    pub failed: bool,
}

/// Receives run and step lifecycle notifications. Every hook defaults to a no-op.
///
/// Observers receive outcomes; they never change the state of the run.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn before(&self, _run: &RunContext) {}

    async fn before_step(&self, _run: &RunContext, _step: &Step) {}

    async fn before_step_action(&self, _run: &RunContext, _step: &Step, _action: &str) {}

    async fn after_step_action(&self, _run: &RunContext, _step: &Step, _action: &str) {}

    async fn on_step_passed(&self, _run: &RunContext, _step: &Step) {}

    async fn on_step_error(&self, _run: &RunContext, _step: &Step, _error: &StructuredError) {}

    /// A step declared with [`crate::run::StepKind::Skip`] was passed over.
    async fn on_step_skipped(&self, _run: &RunContext, _step: &Step) {}

    async fn after_step(&self, _run: &RunContext, _step: &Step) {}

    async fn after(&self, _run: &RunContext) {}
}
