//! Tick-driven presence lifecycle
//!
//! [`PresenceController`] is polled from the host's update loop. It keeps the
//! connection alive, pumps native callbacks, periodically rebuilds the presence
//! from the current [`ActivityState`] and escalates repeated failures into a
//! shutdown followed by a cooldown.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::activity::{ActivityDetector, ActivityState, PresenceContext};
use crate::client::RpcClient;
use crate::clock::{Clock, SystemClock};
use crate::config::RpcConfig;
use crate::dispatch::{DiscordUser, EventHandlers};
use crate::error::{PresenceError, Result};
use crate::native::{NativeRpc, Reply};
use crate::pool::NativeBufferPool;
use crate::presence::RichPresence;
use crate::report::Reporter;

/// Host play-mode transitions the controller reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayModeChange {
    EnteredEditMode,
    EnteredPlayMode,
}

/// Activity state notifications, delivered in the order listed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Exited(ActivityState),
    Changed {
        from: ActivityState,
        to: ActivityState,
    },
    Entered(ActivityState),
}

type StateListener = Box<dyn FnMut(&StateEvent) + Send>;
type HandlerFactory = Box<dyn FnMut() -> EventHandlers + Send>;

/// Written by dispatcher handlers on the native thread, read on tick
#[derive(Debug, Default)]
struct ConnectionSignals {
    ready: AtomicBool,
    failures: AtomicU32,
}

impl ConnectionSignals {
    fn ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    fn failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn take(&self) -> (bool, u32) {
        (
            self.ready.swap(false, Ordering::SeqCst),
            self.failures.swap(0, Ordering::SeqCst),
        )
    }
}

pub struct PresenceController<N, D, C>
where
    N: NativeRpc,
    D: ActivityDetector,
    C: PresenceContext,
{
    client: RpcClient<N>,
    detector: D,
    context: C,
    config: RpcConfig,
    clock: Arc<dyn Clock>,
    reporter: Reporter,
    presence: RichPresence,
    state: ActivityState,
    started_at: Instant,
    session_start: i64,
    last_pump: Option<Instant>,
    last_refresh: Option<Instant>,
    play_mode_lock_until: Option<Instant>,
    upload_started: Option<Instant>,
    error_at: Option<Instant>,
    failures: u32,
    signals: Arc<ConnectionSignals>,
    handler_factory: Option<HandlerFactory>,
    state_listeners: Vec<StateListener>,
}

impl<N, D, C> fmt::Debug for PresenceController<N, D, C>
where
    N: NativeRpc,
    D: ActivityDetector,
    C: PresenceContext,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceController")
            .field("state", &self.state)
            .field("connection", &self.client.state())
            .field("failures", &self.failures)
            .field("has_error", &self.has_error())
            .finish_non_exhaustive()
    }
}

impl<N, D, C> PresenceController<N, D, C>
where
    N: NativeRpc,
    D: ActivityDetector,
    C: PresenceContext,
{
    pub fn new(native: N, detector: D, context: C, config: RpcConfig) -> Result<Self> {
        Self::with_clock(native, detector, context, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        native: N,
        detector: D,
        context: C,
        config: RpcConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let reporter = Reporter::new();
        let pool = NativeBufferPool::with_capacity(config.pool_capacity);
        let client = RpcClient::with_parts(native, reporter.clone(), pool);
        let state = detector.current_state();
        let now = clock.now();

        Ok(Self {
            client,
            detector,
            context,
            presence: RichPresence::with_reporter(reporter.clone()),
            state,
            started_at: now,
            session_start: clock.unix_timestamp(),
            last_pump: None,
            last_refresh: None,
            play_mode_lock_until: None,
            upload_started: (state == ActivityState::UploadingAvatar).then_some(now),
            error_at: None,
            failures: 0,
            signals: Arc::new(ConnectionSignals::default()),
            handler_factory: None,
            state_listeners: Vec::new(),
            config,
            clock,
            reporter,
        })
    }

    /// Application handlers to install on every (re)initialize
    ///
    /// The controller wraps the ready, disconnected and errored slots to track
    /// connection health; the host's handlers still run.
    pub fn set_event_handlers<F>(&mut self, factory: F)
    where
        F: FnMut() -> EventHandlers + Send + 'static,
    {
        self.handler_factory = Some(Box::new(factory));
    }

    /// Subscribe to state exit/change/enter notifications
    pub fn on_state_event<F>(&mut self, listener: F)
    where
        F: FnMut(&StateEvent) + Send + 'static,
    {
        self.state_listeners.push(Box::new(listener));
    }

    /// Subscribe to `(from, to)` state changes only
    pub fn on_state_changed<F>(&mut self, mut listener: F)
    where
        F: FnMut(ActivityState, ActivityState) + Send + 'static,
    {
        self.on_state_event(move |event| {
            if let StateEvent::Changed { from, to } = *event {
                listener(from, to);
            }
        });
    }

    /// Drive one poll step
    pub fn tick(&mut self) {
        if !self.context.is_enabled() {
            return;
        }
        let now = self.clock.now();
        self.check_upload_watchdog(now);

        if !self.client.is_initialized() {
            self.try_initialize(now);
            if !self.client.is_initialized() {
                return;
            }
        }

        if due(self.last_pump, self.config.pump_interval(), now) {
            self.last_pump = Some(now);
            self.client.run_callbacks();
            self.apply_signals();
            if !self.client.is_initialized() {
                return;
            }
        }

        if due(self.last_refresh, self.config.refresh_interval(), now) {
            // failures are already recorded by refresh
            let _ = self.refresh(now);
        }
    }

    /// Turn the integration on or off, persisting the choice
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.context.is_enabled() == enabled {
            return;
        }
        self.context.set_enabled(enabled);
        if enabled {
            self.reporter.info("Discord RPC enabled");
        } else {
            self.reporter.info("Discord RPC disabled");
            if self.client.is_initialized() {
                self.client.shutdown();
            }
        }
    }

    /// Rebuild and send the presence now
    pub fn force_refresh(&mut self) -> Result {
        if let Some(remaining) = self.cooldown_remaining() {
            return Err(PresenceError::CoolingDown {
                remaining_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            });
        }
        if !self.client.is_initialized() {
            self.reporter
                .warn("Cannot refresh presence: Discord RPC not initialized");
            return Err(PresenceError::NotInitialized);
        }
        let now = self.clock.now();
        self.refresh(now)
    }

    /// Leave the error state early and allow initialization right away
    pub fn clear_error_state(&mut self) {
        self.error_at = None;
        self.failures = 0;
        self.signals.take();
        if self.state == ActivityState::Error {
            let detected = self.detected_state();
            self.set_state(detected);
        }
        self.reporter.info("Discord RPC error state cleared");
    }

    /// Move to `state` if the transition is allowed
    ///
    /// Returns whether the state was applied. The presence is resent
    /// immediately when connected.
    pub fn update_state(&mut self, state: ActivityState) -> bool {
        if !self.state.can_transition_to(state) {
            self.reporter.warn(format!(
                "Invalid state transition from {:?} to {:?}",
                self.state, state
            ));
            return false;
        }
        self.set_state(state);
        if self.client.is_initialized() {
            let now = self.clock.now();
            let _ = self.refresh(now);
        }
        true
    }

    /// Restart the elapsed-time counter shown on the profile
    pub fn reset_time(&mut self) {
        self.session_start = self.clock.unix_timestamp();
        self.last_refresh = None;
    }

    pub fn on_play_mode_changed(&mut self, change: PlayModeChange) {
        let target = match change {
            PlayModeChange::EnteredEditMode => ActivityState::EditMode,
            PlayModeChange::EnteredPlayMode => {
                if self.detector.current_state() == ActivityState::UploadingAvatar {
                    ActivityState::UploadingAvatar
                } else {
                    ActivityState::PlayMode
                }
            }
        };
        self.play_mode_lock_until = Some(self.clock.now() + self.config.play_mode_lock());
        // the host's own mode switch is authoritative, skip the allow-list
        self.set_state(target);
        self.reset_time();
        if self.client.is_initialized() {
            let now = self.clock.now();
            let _ = self.refresh(now);
        }
    }

    /// Re-detect after the scene hierarchy changed
    ///
    /// Ignored while a recent play-mode change is still settling.
    pub fn on_hierarchy_changed(&mut self) {
        let now = self.clock.now();
        if self.play_mode_lock_until.is_some_and(|until| now < until) {
            self.reporter
                .debug("Hierarchy change ignored during play mode transition");
            return;
        }
        self.play_mode_lock_until = None;

        let detected = self.detector.current_state();
        if detected != self.state {
            self.update_state(detected);
        }
    }

    /// Answer a join request through the live connection
    pub fn respond(&mut self, user_id: &str, reply: Reply) -> Result {
        self.client.respond(user_id, reply)
    }

    pub fn shutdown(&mut self) {
        self.client.shutdown();
        self.last_pump = None;
        self.last_refresh = None;
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    /// Whether the controller is in its post-failure cooldown
    pub fn has_error(&self) -> bool {
        self.error_at.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.client.is_initialized()
    }

    pub fn is_enabled(&self) -> bool {
        self.context.is_enabled()
    }

    /// Time since the controller was created
    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    /// Consecutive failures since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let error_at = self.error_at?;
        let elapsed = self.clock.now().saturating_duration_since(error_at);
        self.config.error_cooldown().checked_sub(elapsed)
    }

    /// Unix time shown as the activity start
    pub fn session_start(&self) -> i64 {
        self.session_start
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn client(&self) -> &RpcClient<N> {
        &self.client
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    fn try_initialize(&mut self, now: Instant) {
        if let Some(error_at) = self.error_at {
            if now.saturating_duration_since(error_at) < self.config.error_cooldown() {
                return;
            }
            self.error_at = None;
            self.reporter
                .info("Discord RPC cooldown elapsed, retrying initialization");
        }

        let handlers = self.wired_handlers();
        let result = self.client.initialize(
            &self.config.application_id,
            handlers,
            self.config.auto_register,
            self.config.steam_id.as_deref(),
        );

        match result {
            Ok(()) => {
                self.signals.take();
                self.last_pump = None;
                self.last_refresh = None;
                if self.state == ActivityState::Error {
                    let detected = self.detected_state();
                    self.set_state(detected);
                }
            }
            Err(_) => self.record_failure(now),
        }
    }

    fn wired_handlers(&mut self) -> EventHandlers {
        let mut handlers = self
            .handler_factory
            .as_mut()
            .map(|factory| factory())
            .unwrap_or_default();

        let signals = Arc::clone(&self.signals);
        let mut host = handlers.ready.take();
        handlers.ready = Some(Box::new(move |user: &DiscordUser| {
            signals.ready();
            if let Some(handler) = host.as_mut() {
                handler(user);
            }
        }));

        let signals = Arc::clone(&self.signals);
        let mut host = handlers.disconnected.take();
        handlers.disconnected = Some(Box::new(move |code: i32, message: &str| {
            signals.failure();
            if let Some(handler) = host.as_mut() {
                handler(code, message);
            }
        }));

        let signals = Arc::clone(&self.signals);
        let mut host = handlers.errored.take();
        handlers.errored = Some(Box::new(move |code: i32, message: &str| {
            signals.failure();
            if let Some(handler) = host.as_mut() {
                handler(code, message);
            }
        }));

        handlers
    }

    fn apply_signals(&mut self) {
        let (ready, failures) = self.signals.take();
        if ready {
            self.failures = 0;
            // push the presence as soon as Discord is listening
            self.last_refresh = None;
        }
        let now = self.clock.now();
        for _ in 0..failures {
            self.record_failure(now);
            if self.has_error() {
                break;
            }
        }
    }

    fn record_failure(&mut self, now: Instant) {
        self.failures += 1;
        if self.failures < self.config.failure_threshold {
            return;
        }

        self.reporter.error(format!(
            "Too many consecutive Discord RPC failures ({}), shutting down for {}s",
            self.failures,
            self.config.error_cooldown().as_secs()
        ));
        if self.client.is_initialized() {
            self.client.shutdown();
        }
        self.signals.take();
        self.failures = 0;
        self.error_at = Some(now);
        self.last_pump = None;
        self.last_refresh = None;
        self.set_state(ActivityState::Error);
    }

    fn check_upload_watchdog(&mut self, now: Instant) {
        if self.state != ActivityState::UploadingAvatar {
            return;
        }
        let Some(started) = self.upload_started else {
            return;
        };
        if now.saturating_duration_since(started) < self.config.upload_timeout() {
            return;
        }

        self.reporter.warn(format!(
            "Avatar upload still in progress after {}, re-detecting state",
            crate::activity::format_duration(self.config.upload_timeout())
        ));
        self.detector.reset_upload_detection();
        let detected = match self.detector.current_state() {
            ActivityState::UploadingAvatar if self.detector.is_playing() => ActivityState::PlayMode,
            ActivityState::UploadingAvatar => ActivityState::EditMode,
            other => other,
        };
        self.set_state(detected);
        self.last_refresh = None;
    }

    fn refresh(&mut self, now: Instant) -> Result {
        self.last_refresh = Some(now);
        self.compose_presence();

        match self.client.update_presence(&mut self.presence) {
            Ok(()) => {
                self.failures = 0;
                Ok(())
            }
            Err(err) => {
                self.record_failure(now);
                Err(err)
            }
        }
    }

    fn compose_presence(&mut self) {
        let details = match self.context.content_name() {
            "" => String::new(),
            name => format!("{}: {}", self.context.content_label(), name),
        };

        self.presence
            .set_state(self.state.presence_text())
            .set_details(details)
            .set_large_image(self.context.theme_key())
            .set_large_text(self.context.project_name())
            .set_start_timestamp(self.session_start);
    }

    fn detected_state(&self) -> ActivityState {
        match self.detector.current_state() {
            ActivityState::Error => ActivityState::EditMode,
            state => state,
        }
    }

    fn set_state(&mut self, state: ActivityState) {
        if state == self.state {
            return;
        }
        let from = std::mem::replace(&mut self.state, state);
        self.upload_started =
            (state == ActivityState::UploadingAvatar).then(|| self.clock.now());

        self.reporter
            .debug(format!("Activity state {:?} -> {:?}", from, state));
        let events = [
            StateEvent::Exited(from),
            StateEvent::Changed { from, to: state },
            StateEvent::Entered(state),
        ];
        for listener in &mut self.state_listeners {
            for event in &events {
                listener(event);
            }
        }
    }
}

fn due(last: Option<Instant>, interval: Duration, now: Instant) -> bool {
    last.map_or(true, |last| now.saturating_duration_since(last) >= interval)
}
