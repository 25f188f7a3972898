//! Presentation binding: folds orchestrator events into view state and turns user actions back
//! into startup intents. Nothing here mutates orchestrator state directly.

pub mod events;
pub mod orchestration;
pub mod reducer;
pub mod session_list;
pub mod steps;

pub use events::{ErrorCategory, PresentationError};
pub use orchestration::{dispatch_intent, DispatchStatus};
pub use reducer::{StartupView, ViewOptions};
pub use session_list::SessionListMirror;
pub use steps::{StepIndicator, StepIndicators, StepState};
