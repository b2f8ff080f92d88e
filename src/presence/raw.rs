use std::ffi::{c_char, CStr};
use std::marker::PhantomData;
use std::ptr;

use crate::pool::NativeBuffer;

/// Presence record laid out exactly like `DiscordRichPresence` in `discord_rpc.h`
///
/// Field order and sizes are part of the contract with the native library.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DiscordRichPresence {
    pub state: *const c_char,
    pub details: *const c_char,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub large_image_key: *const c_char,
    pub large_image_text: *const c_char,
    pub small_image_key: *const c_char,
    pub small_image_text: *const c_char,
    pub party_id: *const c_char,
    pub party_size: i32,
    pub party_max: i32,
    pub match_secret: *const c_char,
    pub join_secret: *const c_char,
    pub spectate_secret: *const c_char,
    /// `int8_t` in the C header
    pub instance: i8,
}

impl Default for DiscordRichPresence {
    fn default() -> Self {
        Self {
            state: ptr::null(),
            details: ptr::null(),
            start_timestamp: 0,
            end_timestamp: 0,
            large_image_key: ptr::null(),
            large_image_text: ptr::null(),
            small_image_key: ptr::null(),
            small_image_text: ptr::null(),
            party_id: ptr::null(),
            party_size: 0,
            party_max: 0,
            match_secret: ptr::null(),
            join_secret: ptr::null(),
            spectate_secret: ptr::null(),
            instance: 0,
        }
    }
}

/// String slots of a [`DiscordRichPresence`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    State,
    Details,
    LargeImageKey,
    LargeImageText,
    SmallImageKey,
    SmallImageText,
    PartyId,
    MatchSecret,
    JoinSecret,
    SpectateSecret,
}

impl TextField {
    pub const COUNT: usize = 10;

    /// All slots in wire order
    pub const ALL: [TextField; Self::COUNT] = [
        TextField::State,
        TextField::Details,
        TextField::LargeImageKey,
        TextField::LargeImageText,
        TextField::SmallImageKey,
        TextField::SmallImageText,
        TextField::PartyId,
        TextField::MatchSecret,
        TextField::JoinSecret,
        TextField::SpectateSecret,
    ];

    /// Maximum UTF-8 byte length Discord accepts for this slot
    pub const fn limit(self) -> usize {
        match self {
            TextField::LargeImageKey | TextField::SmallImageKey => 32,
            _ => 128,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TextField::State => "state",
            TextField::Details => "details",
            TextField::LargeImageKey => "largeImageKey",
            TextField::LargeImageText => "largeImageText",
            TextField::SmallImageKey => "smallImageKey",
            TextField::SmallImageText => "smallImageText",
            TextField::PartyId => "partyId",
            TextField::MatchSecret => "matchSecret",
            TextField::JoinSecret => "joinSecret",
            TextField::SpectateSecret => "spectateSecret",
        }
    }

    fn slot(self, raw: &DiscordRichPresence) -> *const c_char {
        match self {
            TextField::State => raw.state,
            TextField::Details => raw.details,
            TextField::LargeImageKey => raw.large_image_key,
            TextField::LargeImageText => raw.large_image_text,
            TextField::SmallImageKey => raw.small_image_key,
            TextField::SmallImageText => raw.small_image_text,
            TextField::PartyId => raw.party_id,
            TextField::MatchSecret => raw.match_secret,
            TextField::JoinSecret => raw.join_secret,
            TextField::SpectateSecret => raw.spectate_secret,
        }
    }

    pub(crate) fn slot_mut(self, raw: &mut DiscordRichPresence) -> &mut *const c_char {
        match self {
            TextField::State => &mut raw.state,
            TextField::Details => &mut raw.details,
            TextField::LargeImageKey => &mut raw.large_image_key,
            TextField::LargeImageText => &mut raw.large_image_text,
            TextField::SmallImageKey => &mut raw.small_image_key,
            TextField::SmallImageText => &mut raw.small_image_text,
            TextField::PartyId => &mut raw.party_id,
            TextField::MatchSecret => &mut raw.match_secret,
            TextField::JoinSecret => &mut raw.join_secret,
            TextField::SpectateSecret => &mut raw.spectate_secret,
        }
    }
}

/// A built presence record whose string pointers stay valid for `'a`
///
/// The frame borrows the buffers of the [`RichPresence`](super::RichPresence)
/// that built it, so the builder cannot rebuild or release them while the
/// frame is alive.
#[derive(Debug)]
pub struct PresenceFrame<'a> {
    raw: DiscordRichPresence,
    _buffers: PhantomData<&'a [NativeBuffer]>,
}

impl<'a> PresenceFrame<'a> {
    pub(crate) fn new(raw: DiscordRichPresence, _buffers: &'a [NativeBuffer]) -> Self {
        Self {
            raw,
            _buffers: PhantomData,
        }
    }

    /// The C layout to hand to `Discord_UpdatePresence`
    pub fn as_raw(&self) -> &DiscordRichPresence {
        &self.raw
    }

    /// Read back one string slot
    pub fn text(&self, field: TextField) -> Option<&'a str> {
        let ptr = field.slot(&self.raw);
        if ptr.is_null() {
            return None;
        }
        // SAFETY: every non-null slot points into a NUL-terminated NativeBuffer
        // that is borrowed for 'a and was filled from a &str.
        let text = unsafe { CStr::from_ptr(ptr) };
        text.to_str().ok()
    }

    pub fn start_timestamp(&self) -> i64 {
        self.raw.start_timestamp
    }

    pub fn end_timestamp(&self) -> i64 {
        self.raw.end_timestamp
    }

    pub fn party_size(&self) -> i32 {
        self.raw.party_size
    }

    pub fn party_max(&self) -> i32 {
        self.raw.party_max
    }

    pub fn instance(&self) -> bool {
        self.raw.instance != 0
    }
}
