use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the editor is doing right now
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityState {
    #[default]
    EditMode,
    PlayMode,
    UploadingAvatar,
    Error,
}

/// Static description of an [`ActivityState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInfo {
    pub display_name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    /// Higher is more important
    pub priority: u8,
    pub is_active: bool,
    pub allows_interaction: bool,
    pub allowed_transitions: &'static [ActivityState],
}

const EDIT_MODE: StateInfo = StateInfo {
    display_name: "in Edit Mode",
    description: "Actively editing the project in the editor",
    icon: "✏️",
    priority: 1,
    is_active: true,
    allows_interaction: true,
    allowed_transitions: &[ActivityState::PlayMode, ActivityState::Error],
};

const PLAY_MODE: StateInfo = StateInfo {
    display_name: "in Play Mode",
    description: "Testing the project in Play Mode",
    icon: "▶️",
    priority: 2,
    is_active: true,
    allows_interaction: true,
    allowed_transitions: &[
        ActivityState::EditMode,
        ActivityState::UploadingAvatar,
        ActivityState::Error,
    ],
};

const UPLOADING_AVATAR: StateInfo = StateInfo {
    display_name: "Uploading Avatar",
    description: "Uploading an avatar to the content servers",
    icon: "📤",
    priority: 3,
    is_active: true,
    allows_interaction: false,
    allowed_transitions: &[
        ActivityState::EditMode,
        ActivityState::PlayMode,
        ActivityState::Error,
    ],
};

const ERROR: StateInfo = StateInfo {
    display_name: "Error State",
    description: "An error occurred in the RPC system",
    icon: "❌",
    priority: 10,
    is_active: false,
    allows_interaction: true,
    allowed_transitions: &[
        ActivityState::EditMode,
        ActivityState::PlayMode,
        ActivityState::UploadingAvatar,
    ],
};

impl ActivityState {
    pub const ALL: [ActivityState; 4] = [
        ActivityState::EditMode,
        ActivityState::PlayMode,
        ActivityState::UploadingAvatar,
        ActivityState::Error,
    ];

    pub const fn info(self) -> &'static StateInfo {
        match self {
            ActivityState::EditMode => &EDIT_MODE,
            ActivityState::PlayMode => &PLAY_MODE,
            ActivityState::UploadingAvatar => &UPLOADING_AVATAR,
            ActivityState::Error => &ERROR,
        }
    }

    pub fn display_name(self) -> &'static str {
        self.info().display_name
    }

    pub fn description(self) -> &'static str {
        self.info().description
    }

    pub fn icon(self) -> &'static str {
        self.info().icon
    }

    pub fn priority(self) -> u8 {
        self.info().priority
    }

    pub fn is_active(self) -> bool {
        self.info().is_active
    }

    pub fn allows_interaction(self) -> bool {
        self.info().allows_interaction
    }

    /// States reachable from this one without going through `Error`
    pub fn suggested_transitions(self) -> &'static [ActivityState] {
        self.info().allowed_transitions
    }

    /// Whether moving from `self` to `to` is allowed
    ///
    /// Anything into or out of `Error` is always allowed.
    pub fn can_transition_to(self, to: ActivityState) -> bool {
        if self == ActivityState::Error || to == ActivityState::Error {
            return true;
        }
        self.info().allowed_transitions.contains(&to)
    }

    /// Text shown as the presence `state` line
    pub fn presence_text(self) -> String {
        format!("Currently {}", self.display_name())
    }

    /// "icon name"
    pub fn display_text(self) -> String {
        format!("{} {}", self.icon(), self.display_name())
    }

    /// "icon name - description"
    pub fn status_text(self) -> String {
        format!("{} - {}", self.display_text(), self.description())
    }

    pub fn timed_text(self, duration: Duration) -> String {
        let elapsed = format_duration(duration);
        let verb = match self {
            ActivityState::EditMode => "Editing",
            ActivityState::PlayMode => "Testing",
            ActivityState::UploadingAvatar => "Uploading",
            ActivityState::Error => "Error state",
        };
        format!("{} {verb} for {elapsed}", self.icon())
    }

    /// All states, highest priority first
    pub fn by_priority() -> [ActivityState; 4] {
        let mut states = Self::ALL;
        states.sort_by(|a, b| b.priority().cmp(&a.priority()));
        states
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Compact duration for status lines: `42s`, `5m 3s`, `2h 15m`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if total < 60 {
        format!("{seconds}s")
    } else if hours == 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{hours}h {minutes}m")
    }
}
