use std::sync::{Arc, Mutex, MutexGuard};

use crate::activity::ActivityState;

/// Reads what the host editor is doing
///
/// Implemented by the host; the controller polls it on every detection pass.
pub trait ActivityDetector: Send {
    fn current_state(&self) -> ActivityState;

    fn is_playing(&self) -> bool;

    /// Forget any latched "upload in progress" signal
    fn reset_upload_detection(&mut self);
}

/// Host-provided labels that end up in the presence
pub trait PresenceContext: Send {
    /// Prefix for the details line, e.g. `Avatar`
    fn content_label(&self) -> &str;

    /// The thing being worked on, e.g. the avatar name
    fn content_name(&self) -> &str;

    fn project_name(&self) -> &str;

    /// Large image asset key
    fn theme_key(&self) -> &str;

    /// Persisted on/off toggle
    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);
}

#[derive(Debug)]
struct DetectorState {
    state: ActivityState,
    playing: bool,
    upload_resets: usize,
    sticky_upload: bool,
}

/// A detector whose answers are set by hand
///
/// Clones share state, so a test or a host adapter can keep one copy and hand
/// the other to the controller.
#[derive(Debug, Clone)]
pub struct ManualDetector {
    inner: Arc<Mutex<DetectorState>>,
}

impl ManualDetector {
    pub fn new(state: ActivityState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DetectorState {
                state,
                playing: state == ActivityState::PlayMode,
                upload_resets: 0,
                sticky_upload: false,
            })),
        }
    }

    pub fn set_state(&self, state: ActivityState) {
        self.lock().state = state;
    }

    pub fn set_playing(&self, playing: bool) {
        self.lock().playing = playing;
    }

    /// Keep reporting `UploadingAvatar` even after a reset
    pub fn set_sticky_upload(&self, sticky: bool) {
        self.lock().sticky_upload = sticky;
    }

    pub fn upload_resets(&self) -> usize {
        self.lock().upload_resets
    }

    fn lock(&self) -> MutexGuard<'_, DetectorState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualDetector {
    fn default() -> Self {
        Self::new(ActivityState::EditMode)
    }
}

impl ActivityDetector for ManualDetector {
    fn current_state(&self) -> ActivityState {
        self.lock().state
    }

    fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn reset_upload_detection(&mut self) {
        let mut inner = self.lock();
        inner.upload_resets += 1;
        if inner.state == ActivityState::UploadingAvatar && !inner.sticky_upload {
            inner.state = if inner.playing {
                ActivityState::PlayMode
            } else {
                ActivityState::EditMode
            };
        }
    }
}
