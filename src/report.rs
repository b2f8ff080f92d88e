//! Status reporting
//!
//! Everything the client wants the host to see goes through a [`Reporter`]:
//! the message is written to the `log` facade and then handed to any
//! subscribed listeners so an editor console or status panel can show it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

type Listener = Arc<dyn Fn(&str) + Send + Sync>;

const LOG_TARGET: &str = "editor_presence";

#[derive(Default)]
struct Listeners {
    log: Vec<Listener>,
    error: Vec<Listener>,
}

/// Cloneable handle to the log/error event streams
#[derive(Clone, Default)]
pub struct Reporter {
    listeners: Arc<Mutex<Listeners>>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.lock();
        f.debug_struct("Reporter")
            .field("log_listeners", &listeners.log.len())
            .field("error_listeners", &listeners.error.len())
            .finish()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to informational and warning messages
    pub fn on_log<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.lock().log.push(Arc::new(listener));
    }

    /// Subscribe to error messages
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.lock().error.push(Arc::new(listener));
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        log::debug!(target: LOG_TARGET, "{}", message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::info!(target: LOG_TARGET, "{}", message);
        self.emit_log(&format!("[DiscordRPC] {message}"));
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::warn!(target: LOG_TARGET, "{}", message);
        self.emit_log(&format!("[DiscordRPC] WARNING: {message}"));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::error!(target: LOG_TARGET, "{}", message);
        let listeners = self.lock().error.clone();
        for listener in listeners {
            listener(message);
        }
    }

    fn emit_log(&self, line: &str) {
        // Snapshot so a listener may report again without deadlocking
        let listeners = self.lock().log.clone();
        for listener in listeners {
            listener(line);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        // A listener that panicked must not silence every later report
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
