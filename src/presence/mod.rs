//! Presence record and its native layout

mod raw;
mod record;

pub use raw::{DiscordRichPresence, PresenceFrame, TextField};
pub use record::{truncate_utf8, RichPresence};
