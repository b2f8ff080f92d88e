//! Bindings to the `discord-rpc` C library
//!
//! The library takes bare function pointers with no user data, so the active
//! dispatcher lives in a process-wide slot that the trampolines read.

use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, Mutex};

use crate::dispatch::{CallbackDispatcher, DiscordUser};
use crate::error::{PresenceError, Result};
use crate::native::{NativeRpc, Reply};
use crate::presence::{DiscordRichPresence, PresenceFrame};

#[repr(C)]
struct RawDiscordUser {
    user_id: *const c_char,
    username: *const c_char,
    discriminator: *const c_char,
    avatar: *const c_char,
}

#[repr(C)]
struct DiscordEventHandlers {
    ready: Option<unsafe extern "C" fn(*const RawDiscordUser)>,
    disconnected: Option<unsafe extern "C" fn(c_int, *const c_char)>,
    errored: Option<unsafe extern "C" fn(c_int, *const c_char)>,
    join_game: Option<unsafe extern "C" fn(*const c_char)>,
    spectate_game: Option<unsafe extern "C" fn(*const c_char)>,
    join_request: Option<unsafe extern "C" fn(*const RawDiscordUser)>,
}

#[link(name = "discord-rpc")]
extern "C" {
    fn Discord_Initialize(
        application_id: *const c_char,
        handlers: *mut DiscordEventHandlers,
        auto_register: c_int,
        optional_steam_id: *const c_char,
    );
    fn Discord_Shutdown();
    fn Discord_RunCallbacks();
    fn Discord_UpdatePresence(presence: *const DiscordRichPresence);
    fn Discord_ClearPresence();
    fn Discord_Respond(user_id: *const c_char, reply: c_int);
}

static ACTIVE_DISPATCHER: Mutex<Option<Arc<CallbackDispatcher>>> = Mutex::new(None);

fn active_dispatcher() -> Option<Arc<CallbackDispatcher>> {
    ACTIVE_DISPATCHER
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn set_active_dispatcher(dispatcher: Option<Arc<CallbackDispatcher>>) {
    *ACTIVE_DISPATCHER
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = dispatcher;
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn owned_text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// # Safety
/// `user` must be null or point to a valid `DiscordUser` from the library.
unsafe fn owned_user(user: *const RawDiscordUser) -> DiscordUser {
    match user.as_ref() {
        Some(raw) => DiscordUser {
            user_id: owned_text(raw.user_id),
            username: owned_text(raw.username),
            discriminator: owned_text(raw.discriminator),
            avatar: owned_text(raw.avatar),
        },
        None => DiscordUser::default(),
    }
}

/// Run `f` with the active dispatcher, never letting a panic reach C
fn relay(f: impl FnOnce(&CallbackDispatcher)) {
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        if let Some(dispatcher) = active_dispatcher() {
            f(&dispatcher);
        }
    }));
}

unsafe extern "C" fn ready_trampoline(user: *const RawDiscordUser) {
    let user = owned_user(user);
    relay(|d| d.on_ready(&user));
}

unsafe extern "C" fn disconnected_trampoline(code: c_int, message: *const c_char) {
    let message = owned_text(message);
    relay(|d| d.on_disconnected(code, &message));
}

unsafe extern "C" fn errored_trampoline(code: c_int, message: *const c_char) {
    let message = owned_text(message);
    relay(|d| d.on_errored(code, &message));
}

unsafe extern "C" fn join_trampoline(secret: *const c_char) {
    let secret = owned_text(secret);
    relay(|d| d.on_join_game(&secret));
}

unsafe extern "C" fn spectate_trampoline(secret: *const c_char) {
    let secret = owned_text(secret);
    relay(|d| d.on_spectate_game(&secret));
}

unsafe extern "C" fn request_trampoline(user: *const RawDiscordUser) {
    let user = owned_user(user);
    relay(|d| d.on_join_request(&user));
}

fn c_string(value: &str, what: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| PresenceError::InvalidConfig(format!("{what} contains a NUL byte")))
}

/// [`NativeRpc`] backed by the linked `discord-rpc` library
///
/// The library keeps one global connection, so only one `LinkedRpc` should
/// be initialized at a time.
#[derive(Debug, Default)]
pub struct LinkedRpc {
    _private: (),
}

impl LinkedRpc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NativeRpc for LinkedRpc {
    fn initialize(
        &mut self,
        app_id: &str,
        dispatcher: Arc<CallbackDispatcher>,
        auto_register: bool,
        steam_id: Option<&str>,
    ) -> Result {
        let app_id = c_string(app_id, "application id")?;
        let steam_id = steam_id.map(|id| c_string(id, "steam id")).transpose()?;

        set_active_dispatcher(Some(dispatcher));

        let mut handlers = DiscordEventHandlers {
            ready: Some(ready_trampoline),
            disconnected: Some(disconnected_trampoline),
            errored: Some(errored_trampoline),
            join_game: Some(join_trampoline),
            spectate_game: Some(spectate_trampoline),
            join_request: Some(request_trampoline),
        };

        // SAFETY: all pointers are valid for the duration of the call; the
        // library copies the handler table and the strings.
        unsafe {
            Discord_Initialize(
                app_id.as_ptr(),
                &mut handlers,
                c_int::from(auto_register),
                steam_id.as_ref().map_or(ptr::null(), |id| id.as_ptr()),
            );
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result {
        // SAFETY: no arguments; safe to call after initialize
        unsafe { Discord_Shutdown() };
        set_active_dispatcher(None);
        Ok(())
    }

    fn run_callbacks(&mut self) -> Result {
        // SAFETY: no arguments
        unsafe { Discord_RunCallbacks() };
        Ok(())
    }

    fn update_presence(&mut self, presence: &PresenceFrame<'_>) -> Result {
        // SAFETY: the frame keeps every string pointer alive for this call and
        // the library serializes the record before returning.
        unsafe { Discord_UpdatePresence(presence.as_raw()) };
        Ok(())
    }

    fn clear_presence(&mut self) -> Result {
        // SAFETY: no arguments
        unsafe { Discord_ClearPresence() };
        Ok(())
    }

    fn respond(&mut self, user_id: &str, reply: Reply) -> Result {
        let user_id = c_string(user_id, "user id")?;
        // SAFETY: user_id outlives the call
        unsafe { Discord_Respond(user_id.as_ptr(), c_int::from(reply)) };
        Ok(())
    }
}
