pub mod core;
pub mod errors;
pub mod observer;
pub mod run;
pub mod testing;
pub mod types;

pub use crate::core::{DataSource, Driver, RecordFeed, Settings, SettingsOverride};
pub use errors::{assert_that, AssertionFailure, ErrorKind, RunnerError, StructuredError};
pub use observer::{Observer, ObserverChain, RunContext, StepTimer, TracingObserver};
pub use run::{CancelHandle, CancellationToken, RunOutcome, Step, StepDriver, StepKind, StepSequencer};
pub use types::*;
