use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dispatch::{CallbackDispatcher, DiscordUser};
use crate::error::{PresenceError, Result};
use crate::native::{NativeRpc, Reply};
use crate::presence::{PresenceFrame, TextField};

/// Owned copy of a presence frame as the native side received it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    texts: [Option<String>; TextField::COUNT],
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub party_size: i32,
    pub party_max: i32,
    pub instance: bool,
}

impl PresenceSnapshot {
    fn from_frame(frame: &PresenceFrame<'_>) -> Self {
        let mut texts: [Option<String>; TextField::COUNT] = Default::default();
        for field in TextField::ALL {
            texts[field as usize] = frame.text(field).map(str::to_string);
        }
        Self {
            texts,
            start_timestamp: frame.start_timestamp(),
            end_timestamp: frame.end_timestamp(),
            party_size: frame.party_size(),
            party_max: frame.party_max(),
            instance: frame.instance(),
        }
    }

    pub fn text(&self, field: TextField) -> Option<&str> {
        self.texts[field as usize].as_deref()
    }

    pub fn state(&self) -> Option<&str> {
        self.text(TextField::State)
    }

    pub fn details(&self) -> Option<&str> {
        self.text(TextField::Details)
    }
}

/// One recorded native call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopbackCall {
    Initialize {
        app_id: String,
        auto_register: bool,
        steam_id: Option<String>,
    },
    Shutdown,
    RunCallbacks,
    UpdatePresence(PresenceSnapshot),
    ClearPresence,
    Respond {
        user_id: String,
        reply: Reply,
    },
}

#[derive(Debug)]
enum QueuedEvent {
    Ready(DiscordUser),
    Disconnected(i32, String),
    Errored(i32, String),
    JoinGame(String),
    SpectateGame(String),
    JoinRequest(DiscordUser),
}

#[derive(Debug, Default)]
struct LoopbackState {
    calls: Vec<LoopbackCall>,
    dispatcher: Option<Arc<CallbackDispatcher>>,
    queued: VecDeque<QueuedEvent>,
    ready_on_initialize: Option<DiscordUser>,
    failing_initializes: u32,
    failing_updates: u32,
    panicking_updates: u32,
}

/// In-process stand-in for the native library
///
/// Records every call, can be told to fail or panic, and delivers queued
/// events on `run_callbacks` the way the real library does. Control it
/// through the [`LoopbackHandle`] returned by [`LoopbackRpc::new`].
#[derive(Debug)]
pub struct LoopbackRpc {
    state: Arc<Mutex<LoopbackState>>,
}

/// Test-side view of a [`LoopbackRpc`]
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackRpc {
    pub fn new() -> (Self, LoopbackHandle) {
        let state = Arc::new(Mutex::new(LoopbackState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            LoopbackHandle { state },
        )
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<LoopbackState>) -> MutexGuard<'_, LoopbackState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl NativeRpc for LoopbackRpc {
    fn initialize(
        &mut self,
        app_id: &str,
        dispatcher: Arc<CallbackDispatcher>,
        auto_register: bool,
        steam_id: Option<&str>,
    ) -> Result {
        let mut state = self.lock();
        state.calls.push(LoopbackCall::Initialize {
            app_id: app_id.to_string(),
            auto_register,
            steam_id: steam_id.map(str::to_string),
        });
        if state.failing_initializes > 0 {
            state.failing_initializes -= 1;
            return Err(PresenceError::native("initialize", "scripted failure"));
        }
        state.dispatcher = Some(dispatcher);
        if let Some(user) = state.ready_on_initialize.clone() {
            state.queued.push_back(QueuedEvent::Ready(user));
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result {
        self.lock().calls.push(LoopbackCall::Shutdown);
        Ok(())
    }

    fn run_callbacks(&mut self) -> Result {
        let (dispatcher, events) = {
            let mut state = self.lock();
            state.calls.push(LoopbackCall::RunCallbacks);
            let events: Vec<QueuedEvent> = state.queued.drain(..).collect();
            (state.dispatcher.clone(), events)
        };
        // Dispatch without holding our own lock; handlers may call back in
        if let Some(dispatcher) = dispatcher {
            for event in events {
                deliver(&dispatcher, event);
            }
        }
        Ok(())
    }

    fn update_presence(&mut self, presence: &PresenceFrame<'_>) -> Result {
        let mut state = self.lock();
        state
            .calls
            .push(LoopbackCall::UpdatePresence(PresenceSnapshot::from_frame(
                presence,
            )));
        if state.panicking_updates > 0 {
            state.panicking_updates -= 1;
            drop(state);
            panic!("scripted native panic");
        }
        if state.failing_updates > 0 {
            state.failing_updates -= 1;
            return Err(PresenceError::native("update_presence", "scripted failure"));
        }
        Ok(())
    }

    fn clear_presence(&mut self) -> Result {
        self.lock().calls.push(LoopbackCall::ClearPresence);
        Ok(())
    }

    fn respond(&mut self, user_id: &str, reply: Reply) -> Result {
        self.lock().calls.push(LoopbackCall::Respond {
            user_id: user_id.to_string(),
            reply,
        });
        Ok(())
    }
}

fn deliver(dispatcher: &CallbackDispatcher, event: QueuedEvent) {
    match event {
        QueuedEvent::Ready(user) => dispatcher.on_ready(&user),
        QueuedEvent::Disconnected(code, message) => dispatcher.on_disconnected(code, &message),
        QueuedEvent::Errored(code, message) => dispatcher.on_errored(code, &message),
        QueuedEvent::JoinGame(secret) => dispatcher.on_join_game(&secret),
        QueuedEvent::SpectateGame(secret) => dispatcher.on_spectate_game(&secret),
        QueuedEvent::JoinRequest(user) => dispatcher.on_join_request(&user),
    }
}

impl LoopbackHandle {
    /// Every call made so far, oldest first
    pub fn calls(&self) -> Vec<LoopbackCall> {
        lock(&self.state).calls.clone()
    }

    pub fn initialize_count(&self) -> usize {
        self.count(|call| matches!(call, LoopbackCall::Initialize { .. }))
    }

    pub fn update_count(&self) -> usize {
        self.count(|call| matches!(call, LoopbackCall::UpdatePresence(_)))
    }

    pub fn count(&self, predicate: impl Fn(&LoopbackCall) -> bool) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    /// The most recent presence passed to `update_presence`
    pub fn last_presence(&self) -> Option<PresenceSnapshot> {
        lock(&self.state).calls.iter().rev().find_map(|call| match call {
            LoopbackCall::UpdatePresence(snapshot) => Some(snapshot.clone()),
            _ => None,
        })
    }

    /// Queue a ready event each time `initialize` succeeds
    pub fn ready_on_initialize(&self, user: DiscordUser) {
        lock(&self.state).ready_on_initialize = Some(user);
    }

    pub fn fail_initializes(&self, times: u32) {
        lock(&self.state).failing_initializes = times;
    }

    pub fn fail_updates(&self, times: u32) {
        lock(&self.state).failing_updates = times;
    }

    pub fn panic_on_updates(&self, times: u32) {
        lock(&self.state).panicking_updates = times;
    }

    pub fn queue_ready(&self, user: DiscordUser) {
        lock(&self.state).queued.push_back(QueuedEvent::Ready(user));
    }

    pub fn queue_disconnected(&self, code: i32, message: &str) {
        lock(&self.state)
            .queued
            .push_back(QueuedEvent::Disconnected(code, message.to_string()));
    }

    pub fn queue_errored(&self, code: i32, message: &str) {
        lock(&self.state)
            .queued
            .push_back(QueuedEvent::Errored(code, message.to_string()));
    }

    pub fn queue_join_game(&self, secret: &str) {
        lock(&self.state)
            .queued
            .push_back(QueuedEvent::JoinGame(secret.to_string()));
    }

    pub fn queue_spectate_game(&self, secret: &str) {
        lock(&self.state)
            .queued
            .push_back(QueuedEvent::SpectateGame(secret.to_string()));
    }

    pub fn queue_join_request(&self, user: DiscordUser) {
        lock(&self.state)
            .queued
            .push_back(QueuedEvent::JoinRequest(user));
    }

    /// Fire a ready event right now, as a native thread would
    ///
    /// Uses the dispatcher from the last successful initialize, even after
    /// shutdown, to simulate late callbacks.
    pub fn emit_ready(&self, user: &DiscordUser) {
        if let Some(dispatcher) = self.dispatcher() {
            dispatcher.on_ready(user);
        }
    }

    pub fn emit_disconnected(&self, code: i32, message: &str) {
        if let Some(dispatcher) = self.dispatcher() {
            dispatcher.on_disconnected(code, message);
        }
    }

    pub fn emit_errored(&self, code: i32, message: &str) {
        if let Some(dispatcher) = self.dispatcher() {
            dispatcher.on_errored(code, message);
        }
    }

    pub fn emit_join_game(&self, secret: &str) {
        if let Some(dispatcher) = self.dispatcher() {
            dispatcher.on_join_game(secret);
        }
    }

    fn dispatcher(&self) -> Option<Arc<CallbackDispatcher>> {
        lock(&self.state).dispatcher.clone()
    }
}
