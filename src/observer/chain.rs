use super::{Observer, RunContext};
use crate::errors::StructuredError;
use crate::run::Step;
use async_trait::async_trait;
use std::sync::Arc;

/// Ordered list of observers. Each hook is delivered to every observer in
/// registration order; no observer can stop delivery to the ones after it.
#[derive(Clone, Default)]
pub struct ObserverChain {
    observers: Arc<Vec<Arc<dyn Observer>>>,
}

impl ObserverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<O: Observer + 'static>(&mut self, observer: O) -> &mut Self {
        self.register_shared(Arc::new(observer))
    }

    /// Register an observer the caller keeps a handle to.
    pub fn register_shared(&mut self, observer: Arc<dyn Observer>) -> &mut Self {
        // Chains already handed to a running step keep their own list.
        Arc::make_mut(&mut self.observers).push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[async_trait]
impl Observer for ObserverChain {
    async fn before(&self, run: &RunContext) {
        for observer in self.observers.iter() {
            observer.before(run).await;
        }
    }

    async fn before_step(&self, run: &RunContext, step: &Step) {
        for observer in self.observers.iter() {
            observer.before_step(run, step).await;
        }
    }

    async fn before_step_action(&self, run: &RunContext, step: &Step, action: &str) {
        for observer in self.observers.iter() {
            observer.before_step_action(run, step, action).await;
        }
    }

    async fn after_step_action(&self, run: &RunContext, step: &Step, action: &str) {
        for observer in self.observers.iter() {
            observer.after_step_action(run, step, action).await;
        }
    }

    async fn on_step_passed(&self, run: &RunContext, step: &Step) {
        for observer in self.observers.iter() {
            observer.on_step_passed(run, step).await;
        }
    }

    async fn on_step_error(&self, run: &RunContext, step: &Step, error: &StructuredError) {
        for observer in self.observers.iter() {
            observer.on_step_error(run, step, error).await;
        }
    }

    async fn on_step_skipped(&self, run: &RunContext, step: &Step) {
        for observer in self.observers.iter() {
            observer.on_step_skipped(run, step).await;
        }
    }

    async fn after_step(&self, run: &RunContext, step: &Step) {
        for observer in self.observers.iter() {
            observer.after_step(run, step).await;
        }
    }

    async fn after(&self, run: &RunContext) {
        for observer in self.observers.iter() {
            observer.after(run).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Settings;
    use crate::testing::RecordingObserver;
    use std::sync::Mutex;

    fn context() -> RunContext {
        RunContext {
            run_id: uuid::Uuid::new_v4(),
            iteration: 1,
            settings: Arc::new(Settings::default()),
            failed: false,
        }
    }

    /// Appends its tag to a shared journal and remembers what it saw there first.
    struct Journal {
        tag: &'static str,
        journal: Arc<Mutex<Vec<&'static str>>>,
        seen: Mutex<Vec<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Observer for Journal {
        async fn before_step(&self, _run: &RunContext, _step: &Step) {
            let mut journal = self.journal.lock().unwrap();
            self.seen.lock().unwrap().push(journal.clone());
            journal.push(self.tag);
        }
    }

    #[tokio::test]
    async fn delivers_in_registration_order() {
        let first = Arc::new(RecordingObserver::new());
        let second = Arc::new(RecordingObserver::new());
        let mut chain = ObserverChain::new();
        chain
            .register_shared(first.clone())
            .register_shared(second.clone());
        assert_eq!(chain.len(), 2);

        let step = Step::new("login", |_, _| async { Ok(()) });
        let run = context();
        chain.before(&run).await;
        chain.before_step(&run, &step).await;
        chain.after_step(&run, &step).await;

        let expected = vec!["before", "beforeStep(login)", "afterStep(login)"];
        assert_eq!(first.calls(), expected);
        assert_eq!(second.calls(), expected);
    }

    #[tokio::test]
    async fn later_observers_see_earlier_effects() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(Journal {
            tag: "first",
            journal: journal.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let second = Arc::new(Journal {
            tag: "second",
            journal: journal.clone(),
            seen: Mutex::new(Vec::new()),
        });

        let mut chain = ObserverChain::new();
        chain
            .register_shared(first.clone())
            .register_shared(second.clone());

        let step = Step::new("search", |_, _| async { Ok(()) });
        chain.before_step(&context(), &step).await;

        assert_eq!(*journal.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(second.seen.lock().unwrap()[0], vec!["first"]);
        assert!(first.seen.lock().unwrap()[0].is_empty());
    }

    #[tokio::test]
    async fn clones_keep_the_list_they_were_taken_with() {
        let mut chain = ObserverChain::new();
        chain.register(RecordingObserver::new());
        let snapshot = chain.clone();
        chain.register(RecordingObserver::new());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(chain.len(), 2);
        assert!(ObserverChain::new().is_empty());
    }
}
