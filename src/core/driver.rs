use crate::errors::Result;
use crate::types::{Headers, Screenshot};
use async_trait::async_trait;
use url::Url;

/// Browser-driver capability consumed by the runner.
///
/// Implementations own the actual browser: navigation, DOM interaction and the
/// network interceptor all live behind this trait. Every method is a suspension
/// point; the runner calls them strictly one after another.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open the browser session for a run.
    async fn open_session(&self, incognito: bool) -> Result<()>;

    /// Replace the current page/context with a fresh one.
    async fn reopen_session(&self, incognito: bool) -> Result<()>;

    /// Close the session opened by [`Driver::open_session`].
    async fn close_session(&self) -> Result<()>;

    async fn attach_interceptor(&self) -> Result<()>;

    async fn detach_interceptor(&self) -> Result<()>;

    async fn clear_cache(&self) -> Result<()>;

    async fn clear_cookies(&self) -> Result<()>;

    async fn emulate_device(&self, device: &str) -> Result<()>;

    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    async fn set_cache_disabled(&self, disabled: bool) -> Result<()>;

    async fn set_extra_headers(&self, headers: &Headers) -> Result<()>;

    /// Capture a screenshot and keep it until [`Driver::fetch_screenshots`].
    async fn take_screenshot(&self, name: &str) -> Result<()>;

    /// Drain every screenshot captured so far.
    async fn fetch_screenshots(&self) -> Result<Vec<Screenshot>>;

    async fn current_url(&self) -> Result<Url>;
}
