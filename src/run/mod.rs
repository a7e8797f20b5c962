pub mod cancel;
pub mod overlay;
pub mod sequencer;
pub mod state;
pub mod step;

pub use cancel::{CancellationToken, Race};
pub use overlay::{merge, OverlayScope, SettingsOverlay};
pub use sequencer::{CancelHandle, StepSequencer};
pub use state::{RunOutcome, RunState};
pub use step::{Step, StepDriver, StepFuture, StepKind};
