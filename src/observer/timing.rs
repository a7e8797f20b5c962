use super::{Observer, RunContext};
use crate::run::Step;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTiming {
    pub step: String,
    pub iteration: u32,
    pub duration: Duration,
}

/// Measures wall-clock time from `before_step` to `after_step`.
#[derive(Debug, Default)]
pub struct StepTimer {
    started: RwLock<HashMap<String, Instant>>,
    timings: RwLock<Vec<StepTiming>>,
}

impl StepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn timings(&self) -> Vec<StepTiming> {
        self.timings.read().await.clone()
    }

    pub async fn total(&self) -> Duration {
        self.timings.read().await.iter().map(|t| t.duration).sum()
    }
}

#[async_trait]
impl Observer for StepTimer {
    async fn before_step(&self, _run: &RunContext, step: &Step) {
        self.started
            .write()
            .await
            .insert(step.name().to_string(), Instant::now());
    }

    async fn after_step(&self, run: &RunContext, step: &Step) {
        let Some(started) = self.started.write().await.remove(step.name()) else {
            return;
        };
        self.timings.write().await.push(StepTiming {
            step: step.name().to_string(),
            iteration: run.iteration,
            duration: started.elapsed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Settings;
    use std::sync::Arc;

    #[tokio::test]
    async fn records_one_timing_per_finished_step() {
        let timer = StepTimer::new();
        let run = RunContext {
            run_id: uuid::Uuid::new_v4(),
            iteration: 3,
            settings: Arc::new(Settings::default()),
            failed: false,
        };
        let step = Step::new("checkout", |_, _| async { Ok(()) });

        timer.before_step(&run, &step).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        timer.after_step(&run, &step).await;
        // An unmatched after_step is ignored.
        timer.after_step(&run, &step).await;

        let timings = timer.timings().await;
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].step, "checkout");
        assert_eq!(timings[0].iteration, 3);
        assert!(timings[0].duration >= Duration::from_millis(5));
        assert_eq!(timer.total().await, timings[0].duration);
    }
}
