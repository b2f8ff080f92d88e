//! Editor activity: the state machine and the host collaborators that feed it

mod detector;
mod state;

pub use detector::{ActivityDetector, ManualDetector, PresenceContext};
pub use state::{format_duration, ActivityState, StateInfo};
