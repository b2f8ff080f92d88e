//! Callback dispatch
//!
//! Native code reports connection events from its own thread. The
//! [`CallbackDispatcher`] is the only thing it talks to: every entry point
//! checks the shutdown gate, forwards to the registered handler under a single
//! lock, and logs after the lock is released. A panicking handler is caught
//! here and never unwinds back into native code.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::report::Reporter;

/// A Discord user as reported by the ready and join-request events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscordUser {
    pub user_id: String,
    pub username: String,
    pub discriminator: String,
    pub avatar: String,
}

type UserHandler = Box<dyn FnMut(&DiscordUser) + Send>;
type StatusHandler = Box<dyn FnMut(i32, &str) + Send>;
type SecretHandler = Box<dyn FnMut(&str) + Send>;

/// The six application handler slots
///
/// Replaced wholesale by each initialize and dropped by shutdown.
#[derive(Default)]
pub struct EventHandlers {
    pub(crate) ready: Option<UserHandler>,
    pub(crate) disconnected: Option<StatusHandler>,
    pub(crate) errored: Option<StatusHandler>,
    pub(crate) join_game: Option<SecretHandler>,
    pub(crate) spectate_game: Option<SecretHandler>,
    pub(crate) join_request: Option<UserHandler>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("ready", &self.ready.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .field("errored", &self.errored.is_some())
            .field("join_game", &self.join_game.is_some())
            .field("spectate_game", &self.spectate_game.is_some())
            .field("join_request", &self.join_request.is_some())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ready<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&DiscordUser) + Send + 'static,
    {
        self.ready = Some(Box::new(handler));
        self
    }

    pub fn on_disconnected<F>(mut self, handler: F) -> Self
    where
        F: FnMut(i32, &str) + Send + 'static,
    {
        self.disconnected = Some(Box::new(handler));
        self
    }

    pub fn on_errored<F>(mut self, handler: F) -> Self
    where
        F: FnMut(i32, &str) + Send + 'static,
    {
        self.errored = Some(Box::new(handler));
        self
    }

    pub fn on_join_game<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.join_game = Some(Box::new(handler));
        self
    }

    pub fn on_spectate_game<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.spectate_game = Some(Box::new(handler));
        self
    }

    pub fn on_join_request<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&DiscordUser) + Send + 'static,
    {
        self.join_request = Some(Box::new(handler));
        self
    }
}

/// Thread-safe relay from native events to [`EventHandlers`]
#[derive(Debug)]
pub struct CallbackDispatcher {
    handlers: Mutex<Option<EventHandlers>>,
    shutting_down: AtomicBool,
    reporter: Reporter,
}

impl CallbackDispatcher {
    pub fn new(reporter: Reporter) -> Self {
        Self {
            handlers: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            reporter,
        }
    }

    /// Replace the registered handlers
    pub fn install(&self, handlers: EventHandlers) {
        *self.lock() = Some(handlers);
    }

    /// Drop the registered handlers
    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn has_handlers(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn set_shutting_down(&self, value: bool) {
        self.shutting_down.store(value, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn on_ready(&self, user: &DiscordUser) {
        if self.is_shutting_down() {
            return;
        }
        match self.invoke(|h| h.ready.as_mut().map(|f| f(user))) {
            Ok(()) => self.reporter.info(format!(
                "Discord RPC connected for user: {}",
                user.username
            )),
            Err(msg) => self.reporter.error(format!("Error in ready callback: {msg}")),
        }
    }

    pub fn on_disconnected(&self, code: i32, message: &str) {
        if self.is_shutting_down() {
            return;
        }
        match self.invoke(|h| h.disconnected.as_mut().map(|f| f(code, message))) {
            Ok(()) => self.reporter.warn(format!(
                "Discord RPC disconnected. Error: {code}, Message: {message}"
            )),
            Err(msg) => self
                .reporter
                .error(format!("Error in disconnected callback: {msg}")),
        }
    }

    pub fn on_errored(&self, code: i32, message: &str) {
        if self.is_shutting_down() {
            return;
        }
        match self.invoke(|h| h.errored.as_mut().map(|f| f(code, message))) {
            Ok(()) => self.reporter.error(format!(
                "Discord RPC error: {code}, Message: {message}"
            )),
            Err(msg) => self.reporter.error(format!("Error in error callback: {msg}")),
        }
    }

    pub fn on_join_game(&self, secret: &str) {
        if self.is_shutting_down() {
            return;
        }
        match self.invoke(|h| h.join_game.as_mut().map(|f| f(secret))) {
            Ok(()) => self.reporter.info("Discord RPC join request received"),
            Err(msg) => self.reporter.error(format!("Error in join callback: {msg}")),
        }
    }

    pub fn on_spectate_game(&self, secret: &str) {
        if self.is_shutting_down() {
            return;
        }
        match self.invoke(|h| h.spectate_game.as_mut().map(|f| f(secret))) {
            Ok(()) => self.reporter.info("Discord RPC spectate request received"),
            Err(msg) => self
                .reporter
                .error(format!("Error in spectate callback: {msg}")),
        }
    }

    pub fn on_join_request(&self, user: &DiscordUser) {
        if self.is_shutting_down() {
            return;
        }
        match self.invoke(|h| h.join_request.as_mut().map(|f| f(user))) {
            Ok(()) => self.reporter.info(format!(
                "Discord RPC request from user: {}",
                user.username
            )),
            Err(msg) => self
                .reporter
                .error(format!("Error in join request callback: {msg}")),
        }
    }

    /// Run `call` against the installed handlers while holding the lock
    fn invoke<F>(&self, call: F) -> Result<(), String>
    where
        F: FnOnce(&mut EventHandlers) -> Option<()>,
    {
        let mut guard = self.lock();
        let Some(handlers) = guard.as_mut() else {
            return Ok(());
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(handlers)));
        drop(guard);
        outcome.map(|_| ()).map_err(panic_message)
    }

    fn lock(&self) -> MutexGuard<'_, Option<EventHandlers>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
