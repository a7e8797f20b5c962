//! Executes the ordered steps of a test script for one iteration.
//!
//! A run attaches the driver, applies the run-level browser setup, asks the data
//! source for a record and then executes the steps strictly one after another. The
//! first failing step ends the run; the remaining steps never start. Whatever happens,
//! the interceptor is detached and the session released exactly once before `run`
//! returns.
//!
//! Cancellation is observed at step boundaries only. When it arrives while a step is
//! in flight, the runner stops waiting for that step but does not abort it: the step
//! body keeps running on its own task and may still touch the browser afterwards.

use super::cancel::{CancellationToken, Race};
use super::overlay::SettingsOverlay;
use super::state::{RunOutcome, RunState};
use super::step::{Step, StepDriver, StepKind};
use crate::core::{DataSource, Driver, Settings};
use crate::errors::{classify, Result, RunnerError, StructuredError};
use crate::observer::{Observer, ObserverChain, RunContext};
use crate::types::{DataRecord, Screenshot};
use anyhow::anyhow;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type CancelCallback = Arc<dyn Fn() + Send + Sync>;
type SessionSlot = Arc<Mutex<Option<Arc<dyn Driver>>>>;

/// Holds the token of the run in progress; empty between runs.
#[derive(Default)]
struct CancelSlot {
    token: Mutex<Option<CancellationToken>>,
    on_cancel: Mutex<Option<CancelCallback>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CancelSlot {
    fn current(&self) -> Option<CancellationToken> {
        lock(&self.token).clone()
    }

    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock(&self.token) = Some(token.clone());
        token
    }

    fn disarm(&self) {
        lock(&self.token).take();
    }

    fn is_requested(&self) -> bool {
        self.current().is_some_and(|token| token.is_requested())
    }

    fn cancel(&self) -> bool {
        let Some(token) = self.current() else {
            debug!("no run in progress, cancellation ignored");
            return false;
        };
        if !token.cancel() {
            return false;
        }
        info!("cancellation requested");
        let callback = lock(&self.on_cancel).clone();
        if let Some(callback) = callback {
            callback();
        }
        true
    }
}

/// Releases the driver of a run that never reached its own cleanup, i.e. whose
/// future was dropped mid-flight. Normal cleanup empties the session slot first,
/// which leaves nothing for the guard to do.
struct RunGuard {
    session: SessionSlot,
    cancel: Arc<CancelSlot>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.cancel.disarm();
        let session = lock(&self.session).take();
        let Some(session) = session else {
            return;
        };

        warn!("run dropped before cleanup, detaching interceptor in the background");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = session.detach_interceptor().await {
                        warn!("Failed to detach interceptor: {}", e);
                    }
                });
            }
            Err(_) => warn!("no runtime left to detach the interceptor on"),
        }
    }
}

/// Cloneable handle that cancels whichever run its sequencer is executing.
#[derive(Clone)]
pub struct CancelHandle {
    slot: Arc<CancelSlot>,
}

impl CancelHandle {
    /// Request cancellation of the current run. Only the first call per run has an
    /// effect; it fires the registered cancel callback and returns `true`. Calls made
    /// while no run is in progress are ignored and return `false`.
    ///
    /// The step in flight is abandoned, not aborted.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    pub fn is_requested(&self) -> bool {
        self.slot.is_requested()
    }
}

pub struct StepSequencer {
    driver: Arc<dyn Driver>,
    data: Arc<dyn DataSource>,
    observers: ObserverChain,
    steps: Vec<Step>,
    overlay: SettingsOverlay,
    state: RunState,
    iteration: u32,
    run_id: Uuid,
    active_session: SessionSlot,
    session_opened: bool,
    screenshots: Vec<Screenshot>,
    cancel: Arc<CancelSlot>,
}

impl StepSequencer {
    pub fn new(driver: Arc<dyn Driver>, data: Arc<dyn DataSource>, settings: Settings) -> Self {
        Self {
            driver,
            data,
            observers: ObserverChain::new(),
            steps: Vec::new(),
            overlay: SettingsOverlay::new(settings),
            state: RunState::NotStarted,
            iteration: 0,
            run_id: Uuid::new_v4(),
            active_session: Arc::default(),
            session_opened: false,
            screenshots: Vec::new(),
            cancel: Arc::new(CancelSlot::default()),
        }
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn with_observer<O: Observer + 'static>(mut self, observer: O) -> Self {
        self.observers.register(observer);
        self
    }

    pub fn with_shared_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.register_shared(observer);
        self
    }

    /// Register the callback fired once per run by the first `cancel()`.
    pub fn on_cancel<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *lock(&self.cancel.on_cancel) = Some(Arc::new(callback));
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            slot: Arc::clone(&self.cancel),
        }
    }

    /// See [`CancelHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// True once the current run failed or was cancelled.
    pub fn is_failed(&self) -> bool {
        self.state.is_failed()
            || (self.state == RunState::Running && self.cancel.is_requested())
    }

    pub fn settings(&self) -> &Arc<Settings> {
        self.overlay.active()
    }

    pub fn active_session(&self) -> Option<Arc<dyn Driver>> {
        lock(&self.active_session).clone()
    }

    /// Screenshots collected from the driver when the last run was cleaned up.
    pub fn screenshots(&self) -> &[Screenshot] {
        &self.screenshots
    }

    /// Execute every step for `iteration` (1-based).
    ///
    /// Returns the outcome of a passing or cancelled run. A run that fails, either
    /// because a step failed or because no data record was available, returns the
    /// error after the driver has been released. A cancellation that lands while a
    /// failing step is still being reported returns `Ok(RunOutcome::Failed)`, the
    /// outcome [`StepSequencer::state`] records.
    ///
    /// The interceptor is detached even if an observer or driver call panics; the
    /// panic resumes after cleanup. If the returned future is dropped before it
    /// completes, the detach is spawned onto the runtime instead and the state is left
    /// `Running` until the next run.
    pub async fn run(&mut self, iteration: u32) -> Result<RunOutcome> {
        let token = self.cancel.arm();
        let _guard = RunGuard {
            session: Arc::clone(&self.active_session),
            cancel: Arc::clone(&self.cancel),
        };
        self.state.start();
        self.iteration = iteration;
        self.run_id = Uuid::new_v4();
        lock(&self.active_session).take();
        self.screenshots.clear();
        info!(run_id = %self.run_id, iteration, steps = self.steps.len(), "starting run");

        let attempt = AssertUnwindSafe(self.run_attached(&token))
            .catch_unwind()
            .await;
        self.cancel.disarm();
        if !matches!(attempt, Ok(Ok(_))) {
            self.state.finish(RunOutcome::Failed);
        }

        self.cleanup().await;
        self.state.close();
        match attempt {
            Ok(result) => result,
            Err(panic) => {
                error!(run_id = %self.run_id, "run panicked, driver released");
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Close the browser session kept open between iterations.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.session_opened {
            return Ok(());
        }
        self.session_opened = false;
        self.driver.close_session().await
    }

    fn context(&self) -> RunContext {
        RunContext {
            run_id: self.run_id,
            iteration: self.iteration,
            settings: Arc::clone(self.overlay.active()),
            failed: self.is_failed(),
        }
    }

    async fn run_attached(&mut self, token: &CancellationToken) -> Result<RunOutcome> {
        self.attach().await?;

        let observers = self.observers.clone();
        observers.before(&self.context()).await;

        let Some(record) = self.data.feed(self.iteration).await else {
            warn!(iteration = self.iteration, "test data exhausted");
            self.state.finish(RunOutcome::Failed);
            observers.after(&self.context()).await;
            return Err(RunnerError::DataExhausted {
                iteration: self.iteration,
            });
        };

        for index in 0..self.steps.len() {
            let step = self.steps[index].clone();
            if token.is_requested() {
                return Ok(self.stop_cancelled(&step));
            }

            match step.kind() {
                StepKind::Once if self.iteration > 1 => {
                    debug!(step = step.name(), "once step already ran");
                    continue;
                }
                StepKind::Skip => {
                    observers.on_step_skipped(&self.context(), &step).await;
                    continue;
                }
                _ => {}
            }

            match token.race(self.run_step(&observers, &step, &record)).await {
                Race::Cancelled => return Ok(self.stop_cancelled(&step)),
                Race::Completed(Some(error)) => {
                    info!(
                        step = step.name(),
                        skipped = self.steps.len() - index - 1,
                        "aborting run after failed step"
                    );
                    observers.after(&self.context()).await;
                    return Err(RunnerError::StepFailed {
                        step: step.name().to_string(),
                        error,
                    });
                }
                Race::Completed(None) => {}
            }
        }

        self.state.finish(RunOutcome::Passed);
        observers.after(&self.context()).await;
        Ok(RunOutcome::Passed)
    }

    /// A step that failed before cancellation won the race keeps the run `Failed`.
    fn stop_cancelled(&mut self, step: &Step) -> RunOutcome {
        info!(step = step.name(), "run cancelled");
        self.state.finish(RunOutcome::Cancelled);
        self.state.outcome().unwrap_or(RunOutcome::Cancelled)
    }

    /// Open (or reopen) the session, attach the interceptor and apply the run-level
    /// browser setup in a fixed order.
    async fn attach(&mut self) -> Result<()> {
        let driver = Arc::clone(&self.driver);
        let settings = Arc::clone(self.overlay.active());
        *lock(&self.active_session) = Some(Arc::clone(&driver));

        if self.session_opened {
            driver.reopen_session(settings.incognito).await?;
        } else {
            driver.open_session(settings.incognito).await?;
            self.session_opened = true;
        }
        driver.attach_interceptor().await?;

        if settings.clear_cache {
            driver.clear_cache().await?;
        }
        if settings.clear_cookies {
            driver.clear_cookies().await?;
        }
        if settings.disable_cache {
            driver.set_cache_disabled(true).await?;
        }
        if let Some(device) = &settings.device {
            driver.emulate_device(device).await?;
        }
        if let Some(user_agent) = &settings.user_agent {
            driver.set_user_agent(user_agent).await?;
        }
        if !settings.extra_headers.is_empty() {
            driver.set_extra_headers(&settings.extra_headers).await?;
        }
        Ok(())
    }

    async fn cleanup(&mut self) {
        let session = lock(&self.active_session).take();
        let Some(session) = session else {
            return;
        };

        match session.fetch_screenshots().await {
            Ok(screenshots) => self.screenshots = screenshots,
            Err(e) => warn!("Failed to fetch screenshots: {}", e),
        }
        if let Err(e) = session.detach_interceptor().await {
            warn!("Failed to detach interceptor: {}", e);
        }
        debug!(run_id = %self.run_id, "driver released");
    }

    /// Execute one step and report it. Step errors are classified and returned,
    /// never propagated.
    async fn run_step(
        &mut self,
        observers: &ObserverChain,
        step: &Step,
        record: &DataRecord,
    ) -> Option<Arc<StructuredError>> {
        observers.before_step(&self.context(), step).await;

        let (step_settings, outcome) = {
            let scope = self.overlay.scope(step.overrides());
            let step_settings = Arc::clone(&*scope);
            let run = RunContext {
                run_id: self.run_id,
                iteration: self.iteration,
                settings: Arc::clone(&step_settings),
                failed: false,
            };
            let handle = StepDriver::new(
                Arc::clone(&self.driver),
                observers.clone(),
                run,
                step.clone(),
            );

            let body = tokio::spawn(step.invoke(handle, record.clone()));
            let outcome = body.await.unwrap_or_else(|e| Err(join_failure(e)));
            (step_settings, outcome)
        };

        match outcome {
            Ok(()) => {
                observers.on_step_passed(&self.context(), step).await;
                observers.after_step(&self.context(), step).await;

                let delay = step_settings.step_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                None
            }
            Err(raw) => {
                let error = Arc::new(classify(raw));
                self.state.finish(RunOutcome::Failed);

                let url = match self.driver.current_url().await {
                    Ok(url) => url.to_string(),
                    Err(_) => "<unknown>".to_string(),
                };
                warn!(
                    step = step.name(),
                    kind = %error.kind(),
                    url = %url,
                    "step failed: {}",
                    error.message()
                );

                if step_settings.screenshot_on_failure {
                    if let Err(e) = self.driver.take_screenshot(step.name()).await {
                        warn!("Failed to capture failure screenshot: {}", e);
                    }
                }

                observers.on_step_error(&self.context(), step, &error).await;
                observers.after_step(&self.context(), step).await;
                Some(error)
            }
        }
    }
}

/// A step task that did not return normally: turn a panic into an ordinary error so
/// `assert!` failures classify like any other assertion.
///
/// Only the panic message survives the task boundary. The error is created here, so
/// its backtrace (and the `original_stack` copied from it) points at the join site
/// rather than at the panicking line in the step body.
fn join_failure(err: JoinError) -> anyhow::Error {
    if !err.is_panic() {
        return anyhow!("step task was cancelled");
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        anyhow!("{}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        anyhow!("{}", message)
    } else {
        anyhow!("step panicked")
    }
}
