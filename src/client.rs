use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::dispatch::{panic_message, CallbackDispatcher, EventHandlers};
use crate::error::{PresenceError, Result};
use crate::native::{NativeRpc, Reply};
use crate::pool::NativeBufferPool;
use crate::presence::RichPresence;
use crate::report::Reporter;

/// Lifecycle of the connection owned by an [`RpcClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
}

/// Discord RPC client
///
/// Owns the single native connection, the callback dispatcher and the
/// native buffer pool. Every operation is fail-fast: nothing is retried here,
/// native errors and panics are logged, reported and returned as
/// [`PresenceError`]s.
pub struct RpcClient<N: NativeRpc> {
    native: N,
    state: ConnectionState,
    dispatcher: Arc<CallbackDispatcher>,
    pool: NativeBufferPool,
    reporter: Reporter,
}

impl<N: NativeRpc> RpcClient<N> {
    pub fn new(native: N) -> Self {
        Self::with_parts(native, Reporter::new(), NativeBufferPool::default())
    }

    /// Create a client reporting to `reporter` and staging strings in `pool`
    pub fn with_parts(native: N, reporter: Reporter, pool: NativeBufferPool) -> Self {
        Self {
            native,
            state: ConnectionState::Uninitialized,
            dispatcher: Arc::new(CallbackDispatcher::new(reporter.clone())),
            pool,
            reporter,
        }
    }

    /// Connect to Discord
    ///
    /// A no-op success when already `Ready`. An empty `app_id` is rejected
    /// before the native layer is touched; a native failure leaves the client
    /// `Uninitialized`.
    pub fn initialize(
        &mut self,
        app_id: &str,
        handlers: EventHandlers,
        auto_register: bool,
        steam_id: Option<&str>,
    ) -> Result {
        if self.state == ConnectionState::Ready {
            self.reporter.warn("Discord RPC already initialized");
            return Ok(());
        }

        if app_id.trim().is_empty() {
            return Err(self.fail(PresenceError::EmptyApplicationId));
        }

        self.state = ConnectionState::Initializing;
        self.dispatcher.set_shutting_down(false);
        self.dispatcher.install(handlers);

        let steam_id = steam_id.filter(|id| !id.is_empty());
        let dispatcher = Arc::clone(&self.dispatcher);
        let result = guarded("initialize", || {
            self.native
                .initialize(app_id, dispatcher, auto_register, steam_id)
        });

        match result {
            Ok(()) => {
                self.state = ConnectionState::Ready;
                self.reporter.info(format!(
                    "Discord RPC initialized with Application ID: {app_id}"
                ));
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Uninitialized;
                self.dispatcher.clear();
                self.reporter
                    .error(format!("Failed to initialize Discord RPC: {err}"));
                Err(err)
            }
        }
    }

    /// Tear the connection down
    ///
    /// Clears presence, shuts the native side, drops handlers, drains the
    /// buffer pool and resets state. Every step runs even if an earlier one
    /// failed. Safe to call when not initialized.
    pub fn shutdown(&mut self) {
        if self.state != ConnectionState::Ready {
            self.reporter
                .warn("Discord RPC not initialized, cannot shutdown");
            return;
        }

        self.state = ConnectionState::ShuttingDown;
        self.dispatcher.set_shutting_down(true);

        let mut clean = true;
        if let Err(err) = guarded("clear_presence", || self.native.clear_presence()) {
            self.reporter
                .error(format!("Error clearing Discord RPC presence: {err}"));
            clean = false;
        }
        if let Err(err) = guarded("shutdown", || self.native.shutdown()) {
            self.reporter
                .error(format!("Error during Discord RPC shutdown: {err}"));
            clean = false;
        }
        self.dispatcher.clear();
        let freed = self.pool.drain_and_free_all();
        self.reporter
            .debug(format!("Freed {freed} pooled native buffers"));

        self.state = ConnectionState::Uninitialized;
        self.dispatcher.set_shutting_down(false);

        if clean {
            self.reporter.info("Discord RPC shut down successfully");
        }
    }

    /// Let the native side deliver queued events
    pub fn run_callbacks(&mut self) {
        if self.state != ConnectionState::Ready || self.dispatcher.is_shutting_down() {
            return;
        }
        if let Err(err) = guarded("run_callbacks", || self.native.run_callbacks()) {
            self.reporter
                .error(format!("Error running Discord RPC callbacks: {err}"));
        }
    }

    /// Send `presence` to Discord
    ///
    /// The native buffers built for the call go back to the pool as soon as
    /// the native call returns, whatever the outcome.
    pub fn update_presence(&mut self, presence: &mut RichPresence) -> Result {
        self.ensure_ready()?;

        let result = match presence.build(&self.pool) {
            Ok(frame) => {
                let native = &mut self.native;
                guarded("update_presence", || native.update_presence(&frame))
            }
            Err(err) => Err(err),
        };
        presence.release(&self.pool);

        match result {
            Ok(()) => {
                self.reporter
                    .debug("Discord RPC presence updated successfully");
                Ok(())
            }
            Err(err) => {
                self.reporter
                    .error(format!("Failed to update Discord RPC presence: {err}"));
                Err(err)
            }
        }
    }

    /// Remove the presence shown on the user's profile
    pub fn clear_presence(&mut self) -> Result {
        self.ensure_ready()?;
        match guarded("clear_presence", || self.native.clear_presence()) {
            Ok(()) => {
                self.reporter.info("Discord RPC presence cleared");
                Ok(())
            }
            Err(err) => {
                self.reporter
                    .error(format!("Error clearing Discord RPC presence: {err}"));
                Err(err)
            }
        }
    }

    /// Answer a join request from `user_id`
    pub fn respond(&mut self, user_id: &str, reply: Reply) -> Result {
        if user_id.is_empty() {
            return Err(self.fail(PresenceError::EmptyUserId));
        }
        self.ensure_ready()?;
        match guarded("respond", || self.native.respond(user_id, reply)) {
            Ok(()) => {
                self.reporter.info(format!(
                    "Discord RPC response sent: {reply:?} to user {user_id}"
                ));
                Ok(())
            }
            Err(err) => {
                self.reporter.error(format!(
                    "Error responding to Discord RPC request: {err}"
                ));
                Err(err)
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn is_shutting_down(&self) -> bool {
        self.dispatcher.is_shutting_down()
    }

    pub fn pool(&self) -> &NativeBufferPool {
        &self.pool
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// The dispatcher native code reports into
    pub fn dispatcher(&self) -> &Arc<CallbackDispatcher> {
        &self.dispatcher
    }

    fn ensure_ready(&self) -> Result {
        if self.dispatcher.is_shutting_down() {
            self.reporter
                .warn("Cannot talk to Discord RPC during shutdown");
            return Err(PresenceError::ShuttingDown);
        }
        if self.state != ConnectionState::Ready {
            return Err(self.fail(PresenceError::NotInitialized));
        }
        Ok(())
    }

    fn fail(&self, err: PresenceError) -> PresenceError {
        self.reporter.error(err.to_string());
        err
    }
}

impl<N: NativeRpc> Drop for RpcClient<N> {
    fn drop(&mut self) {
        if self.state == ConnectionState::Ready {
            self.shutdown();
        }
    }
}

/// Run a native call, turning a panic into an error
fn guarded<T>(operation: &'static str, call: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(PresenceError::NativePanic {
            operation,
            message: panic_message(payload),
        })
    })
}
