use crate::core::{Settings, SettingsOverride};
use std::ops::Deref;
use std::sync::Arc;

/// Shallow merge: every key present in `overrides` replaces the base value wholesale.
/// Nested maps such as `extra_headers` are replaced, not merged. `base` is untouched.
pub fn merge(base: &Settings, overrides: &SettingsOverride) -> Settings {
    let mut extra = base.extra.clone();
    extra.extend(overrides.extra.clone());

    Settings {
        step_delay_ms: overrides.step_delay_ms.unwrap_or(base.step_delay_ms),
        action_delay_ms: overrides.action_delay_ms.unwrap_or(base.action_delay_ms),
        wait_timeout_ms: overrides.wait_timeout_ms.unwrap_or(base.wait_timeout_ms),
        clear_cache: overrides.clear_cache.unwrap_or(base.clear_cache),
        clear_cookies: overrides.clear_cookies.unwrap_or(base.clear_cookies),
        disable_cache: overrides.disable_cache.unwrap_or(base.disable_cache),
        incognito: overrides.incognito.unwrap_or(base.incognito),
        device: overrides.device.clone().or_else(|| base.device.clone()),
        user_agent: overrides
            .user_agent
            .clone()
            .or_else(|| base.user_agent.clone()),
        extra_headers: overrides
            .extra_headers
            .clone()
            .unwrap_or_else(|| base.extra_headers.clone()),
        screenshot_on_failure: overrides
            .screenshot_on_failure
            .unwrap_or(base.screenshot_on_failure),
        extra,
    }
}

/// Holds the run's active settings object.
#[derive(Debug, Clone)]
pub struct SettingsOverlay {
    active: Arc<Settings>,
}

impl SettingsOverlay {
    pub fn new(base: Settings) -> Self {
        Self {
            active: Arc::new(base),
        }
    }

    pub fn active(&self) -> &Arc<Settings> {
        &self.active
    }

    /// Reinstall `snapshot` as the active settings. The exact object comes back,
    /// not a copy of it.
    pub fn restore(&mut self, snapshot: Arc<Settings>) {
        self.active = snapshot;
    }

    /// Install `active ⊕ overrides` until the returned scope is dropped. Dropping the
    /// scope restores the previous settings on every exit path, unwinding included.
    pub fn scope(&mut self, overrides: &SettingsOverride) -> OverlayScope<'_> {
        let merged = Arc::new(merge(&self.active, overrides));
        let snapshot = std::mem::replace(&mut self.active, merged);
        OverlayScope {
            overlay: self,
            snapshot: Some(snapshot),
        }
    }
}

pub struct OverlayScope<'a> {
    overlay: &'a mut SettingsOverlay,
    snapshot: Option<Arc<Settings>>,
}

impl OverlayScope<'_> {
    /// The settings that were active before this scope.
    pub fn snapshot(&self) -> Option<&Arc<Settings>> {
        self.snapshot.as_ref()
    }
}

impl Deref for OverlayScope<'_> {
    type Target = Arc<Settings>;

    fn deref(&self) -> &Self::Target {
        &self.overlay.active
    }
}

impl Drop for OverlayScope<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.overlay.restore(snapshot);
        }
    }
}
