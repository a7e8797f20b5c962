use crate::core::{Driver, Settings, SettingsOverride};
use crate::observer::{Observer, ObserverChain, RunContext};
use crate::types::DataRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type StepFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

type StepFn = dyn Fn(StepDriver, DataRecord) -> StepFuture + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Normal,
    /// Runs on the first iteration only.
    Once,
    /// Declared but never executed.
    Skip,
}

/// One unit of a test script. Immutable once built.
#[derive(Clone)]
pub struct Step {
    name: String,
    kind: StepKind,
    overrides: SettingsOverride,
    body: Arc<StepFn>,
}

impl Step {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(StepDriver, DataRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind: StepKind::Normal,
            overrides: SettingsOverride::default(),
            body: Arc::new(move |driver, record| Box::pin(body(driver, record))),
        }
    }

    pub fn once<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(StepDriver, DataRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, body).with_kind(StepKind::Once)
    }

    pub fn skip<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(StepDriver, DataRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, body).with_kind(StepKind::Skip)
    }

    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_overrides(mut self, overrides: SettingsOverride) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn overrides(&self) -> &SettingsOverride {
        &self.overrides
    }

    pub(crate) fn invoke(&self, driver: StepDriver, record: DataRecord) -> StepFuture {
        (self.body)(driver, record)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

/// Handle passed to a step body: the driver plus the step's merged settings.
#[derive(Clone)]
pub struct StepDriver {
    driver: Arc<dyn Driver>,
    observers: ObserverChain,
    run: RunContext,
    step: Step,
}

impl StepDriver {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        observers: ObserverChain,
        run: RunContext,
        step: Step,
    ) -> Self {
        Self {
            driver,
            observers,
            run,
            step,
        }
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.run.settings
    }

    pub fn step_name(&self) -> &str {
        self.step.name()
    }

    pub fn iteration(&self) -> u32 {
        self.run.iteration
    }

    /// Run one named driver action, reporting it to the observers and pausing for
    /// `action_delay_ms` afterwards.
    pub async fn action<T, F>(&self, name: &str, action: F) -> T
    where
        F: Future<Output = T>,
    {
        self.observers
            .before_step_action(&self.run, &self.step, name)
            .await;
        let output = action.await;
        self.observers
            .after_step_action(&self.run, &self.step, name)
            .await;

        let delay = self.run.settings.action_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        output
    }
}

impl fmt::Debug for StepDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDriver")
            .field("step", &self.step.name)
            .field("iteration", &self.run.iteration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingDriver, RecordingObserver};
    use serde_json::json;

    #[tokio::test]
    async fn body_receives_driver_and_record() {
        let step = Step::new("fill form", |driver, record| async move {
            driver.driver().set_user_agent("bot").await?;
            assert_eq!(record["user"], json!("ada"));
            Ok(())
        });
        assert_eq!(step.kind(), StepKind::Normal);

        let driver = Arc::new(RecordingDriver::new());
        let run = RunContext {
            run_id: uuid::Uuid::new_v4(),
            iteration: 1,
            settings: Arc::new(Settings::default()),
            failed: false,
        };
        let handle = StepDriver::new(driver.clone(), ObserverChain::new(), run, step.clone());

        step.invoke(handle, json!({"user": "ada"})).await.unwrap();
        assert_eq!(driver.calls(), vec!["set_user_agent(bot)"]);
    }

    #[tokio::test]
    async fn actions_are_reported_around_the_call() {
        let observer = Arc::new(RecordingObserver::new());
        let mut chain = ObserverChain::new();
        chain.register_shared(observer.clone());

        let step = Step::once("open", |_, _| async { Ok(()) });
        let run = RunContext {
            run_id: uuid::Uuid::new_v4(),
            iteration: 1,
            settings: Arc::new(Settings::default()),
            failed: false,
        };
        let handle = StepDriver::new(Arc::new(RecordingDriver::new()), chain, run, step);

        let value = handle.action("click", async { 42 }).await;
        assert_eq!(value, 42);
        assert_eq!(
            observer.calls(),
            vec!["beforeStepAction(open, click)", "afterStepAction(open, click)"]
        );
        assert_eq!(handle.step_name(), "open");
    }

    #[test]
    fn builders_set_kind_and_overrides() {
        let step = Step::skip("later", |_, _| async { Ok(()) })
            .with_overrides(SettingsOverride::default().with_step_delay(3));
        assert_eq!(step.kind(), StepKind::Skip);
        assert_eq!(step.overrides().step_delay_ms, Some(3));
        assert!(format!("{:?}", step).contains("later"));
    }
}
