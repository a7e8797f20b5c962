//! In-memory doubles for driving the runner without a browser.

use crate::core::Driver;
use crate::errors::{Result, RunnerError, StructuredError};
use crate::observer::{Observer, RunContext};
use crate::run::Step;
use crate::types::{Headers, Screenshot};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Driver that performs nothing and records every call it receives.
pub struct RecordingDriver {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    screenshots: Mutex<Vec<Screenshot>>,
    url: Mutex<String>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            screenshots: Mutex::new(Vec::new()),
            url: Mutex::new("about:blank".to_string()),
        }
    }

    /// Make every later call to `method` return a driver error.
    pub fn fail_on(&self, method: &str) {
        lock(&self.failing).insert(method.to_string());
    }

    pub fn set_url(&self, url: &str) {
        *lock(&self.url) = url.to_string();
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, method: &str, call: String) -> Result<()> {
        tracing::debug!(call = %call, "driver call");
        lock(&self.calls).push(call);
        if lock(&self.failing).contains(method) {
            return Err(RunnerError::Driver(format!("{} failed", method)));
        }
        Ok(())
    }
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    async fn open_session(&self, incognito: bool) -> Result<()> {
        self.record("open_session", format!("open_session({})", incognito))
    }

    async fn reopen_session(&self, incognito: bool) -> Result<()> {
        self.record("reopen_session", format!("reopen_session({})", incognito))
    }

    async fn close_session(&self) -> Result<()> {
        self.record("close_session", "close_session".to_string())
    }

    async fn attach_interceptor(&self) -> Result<()> {
        self.record("attach_interceptor", "attach_interceptor".to_string())
    }

    async fn detach_interceptor(&self) -> Result<()> {
        self.record("detach_interceptor", "detach_interceptor".to_string())
    }

    async fn clear_cache(&self) -> Result<()> {
        self.record("clear_cache", "clear_cache".to_string())
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.record("clear_cookies", "clear_cookies".to_string())
    }

    async fn emulate_device(&self, device: &str) -> Result<()> {
        self.record("emulate_device", format!("emulate_device({})", device))
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.record("set_user_agent", format!("set_user_agent({})", user_agent))
    }

    async fn set_cache_disabled(&self, disabled: bool) -> Result<()> {
        self.record(
            "set_cache_disabled",
            format!("set_cache_disabled({})", disabled),
        )
    }

    async fn set_extra_headers(&self, headers: &Headers) -> Result<()> {
        let pairs: Vec<String> = headers
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        self.record(
            "set_extra_headers",
            format!("set_extra_headers({})", pairs.join(",")),
        )
    }

    async fn take_screenshot(&self, name: &str) -> Result<()> {
        self.record("take_screenshot", format!("take_screenshot({})", name))?;
        lock(&self.screenshots).push(Screenshot::new(name, Vec::new()));
        Ok(())
    }

    async fn fetch_screenshots(&self) -> Result<Vec<Screenshot>> {
        self.record("fetch_screenshots", "fetch_screenshots".to_string())?;
        Ok(std::mem::take(&mut *lock(&self.screenshots)))
    }

    async fn current_url(&self) -> Result<Url> {
        self.record("current_url", "current_url".to_string())?;
        let url = lock(&self.url).clone();
        Url::parse(&url).map_err(RunnerError::driver)
    }
}

/// Observer that records each hook as a short string, e.g. `beforeStep(login)`.
#[derive(Default)]
pub struct RecordingObserver {
    calls: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn push(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl Observer for RecordingObserver {
    async fn before(&self, _run: &RunContext) {
        self.push("before".to_string());
    }

    async fn before_step(&self, _run: &RunContext, step: &Step) {
        self.push(format!("beforeStep({})", step.name()));
    }

    async fn before_step_action(&self, _run: &RunContext, step: &Step, action: &str) {
        self.push(format!("beforeStepAction({}, {})", step.name(), action));
    }

    async fn after_step_action(&self, _run: &RunContext, step: &Step, action: &str) {
        self.push(format!("afterStepAction({}, {})", step.name(), action));
    }

    async fn on_step_passed(&self, _run: &RunContext, step: &Step) {
        self.push(format!("onStepPassed({})", step.name()));
    }

    async fn on_step_error(&self, _run: &RunContext, step: &Step, error: &StructuredError) {
        self.push(format!("onStepError({}, {})", step.name(), error.kind()));
    }

    async fn on_step_skipped(&self, _run: &RunContext, step: &Step) {
        self.push(format!("onStepSkipped({})", step.name()));
    }

    async fn after_step(&self, _run: &RunContext, step: &Step) {
        self.push(format!("afterStep({})", step.name()));
    }

    async fn after(&self, run: &RunContext) {
        let outcome = if run.failed { "failed" } else { "passed" };
        self.push(format!("after({})", outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_driver_fails_on_request() {
        let driver = RecordingDriver::new();
        assert!(driver.clear_cache().await.is_ok());

        driver.fail_on("clear_cache");
        assert!(matches!(
            driver.clear_cache().await,
            Err(RunnerError::Driver(_))
        ));
        assert_eq!(driver.calls(), vec!["clear_cache", "clear_cache"]);
    }

    #[tokio::test]
    async fn screenshots_are_drained() {
        let driver = RecordingDriver::new();
        driver.take_screenshot("home").await.unwrap();
        driver.take_screenshot("cart").await.unwrap();

        let shots = driver.fetch_screenshots().await.unwrap();
        assert_eq!(shots.len(), 2);
        assert_eq!(shots[1].name, "cart");
        assert!(driver.fetch_screenshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn current_url_is_parsed() {
        let driver = RecordingDriver::new();
        driver.set_url("https://shop.test/cart?id=3");
        let url = driver.current_url().await.unwrap();
        assert_eq!(url.host_str(), Some("shop.test"));

        driver.set_url("not a url");
        assert!(driver.current_url().await.is_err());
    }
}
