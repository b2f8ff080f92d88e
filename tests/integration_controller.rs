use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use editor_presence::native::LoopbackCall;
use editor_presence::{
    ActivityState, DiscordUser, EventHandlers, LoopbackHandle, LoopbackRpc, ManualClock,
    ManualDetector, PlayModeChange, PresenceController, PresenceSettings, RpcConfig,
};

type Controller = PresenceController<LoopbackRpc, ManualDetector, PresenceSettings>;

struct Harness {
    controller: Controller,
    native: LoopbackHandle,
    detector: ManualDetector,
    clock: Arc<ManualClock>,
}

fn harness_with(detector: ManualDetector) -> Harness {
    let (native, handle) = LoopbackRpc::new();
    let clock = Arc::new(ManualClock::default());
    let settings = PresenceSettings {
        content_name: "Kitsune".into(),
        project_name: "Shrine".into(),
        theme_key: "gold".into(),
        ..Default::default()
    };
    let controller = PresenceController::with_clock(
        native,
        detector.clone(),
        settings,
        RpcConfig::default(),
        clock.clone(),
    )
    .unwrap();

    Harness {
        controller,
        native: handle,
        detector,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(ManualDetector::default())
}

impl Harness {
    fn tick_after(&mut self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
        self.controller.tick();
    }

    fn shown_state(&self) -> Option<String> {
        self.native
            .last_presence()
            .and_then(|presence| presence.state().map(str::to_string))
    }
}

#[test]
fn repeated_update_failures_trigger_cooldown() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut h = harness();
    h.native.fail_updates(3);

    h.controller.tick();
    assert_eq!(h.controller.failures(), 1);
    h.tick_after(5);
    assert_eq!(h.controller.failures(), 2);
    h.tick_after(5);

    assert!(h.controller.has_error());
    assert_eq!(h.controller.state(), ActivityState::Error);
    assert!(!h.controller.is_initialized());
    assert_eq!(
        h.native.count(|call| matches!(call, LoopbackCall::Shutdown)),
        1
    );

    // suppressed for the whole cooldown
    h.tick_after(5);
    h.tick_after(20);
    assert_eq!(h.native.initialize_count(), 1);
    assert!(h.controller.cooldown_remaining().is_some());

    h.tick_after(5);
    assert_eq!(h.native.initialize_count(), 2);
    assert!(h.controller.is_initialized());
    assert!(!h.controller.has_error());
    assert_eq!(h.controller.state(), ActivityState::EditMode);
    assert_eq!(h.shown_state().as_deref(), Some("Currently in Edit Mode"));
}

#[test]
fn initialize_failures_count_toward_threshold() {
    let mut h = harness();
    h.native.fail_initializes(3);

    h.controller.tick();
    h.tick_after(1);
    assert!(!h.controller.has_error());
    h.tick_after(1);

    assert!(h.controller.has_error());
    assert_eq!(h.native.initialize_count(), 3);
    assert!(h.native.calls().iter().all(|call| !matches!(call, LoopbackCall::Shutdown)));
}

#[test]
fn state_sequence_is_reflected_in_presence() {
    let mut h = harness();
    h.controller.tick();
    assert_eq!(h.shown_state().as_deref(), Some("Currently in Edit Mode"));

    let expected = [
        (ActivityState::PlayMode, "Currently in Play Mode"),
        (ActivityState::UploadingAvatar, "Currently Uploading Avatar"),
        (ActivityState::EditMode, "Currently in Edit Mode"),
    ];
    for (state, text) in expected {
        assert!(h.controller.update_state(state));
        assert_eq!(h.shown_state().as_deref(), Some(text));
    }

    let presence = h.native.last_presence().unwrap();
    assert_eq!(presence.details(), Some("Avatar: Kitsune"));
    assert_eq!(
        presence.text(editor_presence::TextField::LargeImageKey),
        Some("gold")
    );
    assert_eq!(
        presence.text(editor_presence::TextField::LargeImageText),
        Some("Shrine")
    );
}

#[test]
fn state_listeners_see_every_change() {
    let mut h = harness();
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    h.controller
        .on_state_changed(move |from, to| sink.lock().unwrap().push((from, to)));

    h.controller.update_state(ActivityState::PlayMode);
    assert!(!h.controller.update_state(ActivityState::PlayMode));
    h.controller.update_state(ActivityState::EditMode);

    assert_eq!(
        *changes.lock().unwrap(),
        [
            (ActivityState::EditMode, ActivityState::PlayMode),
            (ActivityState::PlayMode, ActivityState::EditMode),
        ]
    );
}

#[test]
fn stuck_upload_is_redetected_after_timeout() {
    let mut h = harness();
    h.controller.tick();
    h.controller.update_state(ActivityState::PlayMode);
    h.detector.set_state(ActivityState::UploadingAvatar);
    h.controller.update_state(ActivityState::UploadingAvatar);

    h.tick_after(9 * 60);
    assert_eq!(h.controller.state(), ActivityState::UploadingAvatar);
    assert_eq!(h.detector.upload_resets(), 0);

    h.tick_after(60);
    assert_eq!(h.detector.upload_resets(), 1);
    assert_eq!(h.controller.state(), ActivityState::EditMode);
    assert_eq!(h.shown_state().as_deref(), Some("Currently in Edit Mode"));
}

#[test]
fn sticky_upload_falls_back_to_play_mode() {
    let mut h = harness();
    h.controller.tick();
    h.controller.update_state(ActivityState::PlayMode);
    h.detector.set_state(ActivityState::UploadingAvatar);
    h.detector.set_playing(true);
    h.detector.set_sticky_upload(true);
    h.controller.update_state(ActivityState::UploadingAvatar);

    h.tick_after(10 * 60);

    assert_eq!(h.detector.upload_resets(), 1);
    assert_eq!(h.controller.state(), ActivityState::PlayMode);
}

#[test]
fn upload_watchdog_runs_before_connecting() {
    let mut h = harness_with(ManualDetector::new(ActivityState::UploadingAvatar));
    h.native.fail_initializes(1);

    h.tick_after(10 * 60);

    assert_eq!(h.detector.upload_resets(), 1);
    assert_eq!(h.controller.state(), ActivityState::EditMode);
    assert!(!h.controller.is_initialized());
}

#[test]
fn connection_callbacks_feed_failure_count() {
    let mut h = harness();
    let disconnects = Arc::new(AtomicUsize::new(0));
    let readies = Arc::new(AtomicUsize::new(0));
    let (d, r) = (Arc::clone(&disconnects), Arc::clone(&readies));
    h.controller.set_event_handlers(move || {
        let d = Arc::clone(&d);
        let r = Arc::clone(&r);
        EventHandlers::new()
            .on_disconnected(move |_, _| {
                d.fetch_add(1, Ordering::SeqCst);
            })
            .on_ready(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            })
    });

    h.controller.tick();
    h.native.queue_disconnected(1000, "pipe closed");
    h.native.queue_errored(4000, "bad payload");
    h.tick_after(1);

    assert_eq!(h.controller.failures(), 2);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert!(h.controller.is_initialized());

    let updates = h.native.update_count();
    h.native.queue_ready(DiscordUser {
        username: "kit".into(),
        ..Default::default()
    });
    h.tick_after(1);

    assert_eq!(h.controller.failures(), 0);
    assert_eq!(readies.load(Ordering::SeqCst), 1);
    // ready pushes the presence without waiting for the refresh timer
    assert_eq!(h.native.update_count(), updates + 1);
}

#[test]
fn burst_of_disconnects_enters_error_state() {
    let mut h = harness();
    h.controller.tick();
    for _ in 0..3 {
        h.native.queue_disconnected(1000, "pipe closed");
    }
    h.tick_after(1);

    assert!(h.controller.has_error());
    assert_eq!(h.controller.state(), ActivityState::Error);
    assert!(!h.controller.is_initialized());
}

#[test]
fn clearing_error_state_allows_immediate_retry() {
    let mut h = harness();
    h.native.fail_initializes(3);
    h.controller.tick();
    h.tick_after(1);
    h.tick_after(1);
    assert!(h.controller.has_error());

    h.controller.clear_error_state();
    assert!(!h.controller.has_error());
    assert_eq!(h.controller.state(), ActivityState::EditMode);

    h.tick_after(1);
    assert!(h.controller.is_initialized());
    assert_eq!(h.native.initialize_count(), 4);
}

#[test]
fn disabling_shuts_down_and_enabling_reconnects() {
    let mut h = harness();
    h.controller.tick();
    assert!(h.controller.is_initialized());

    h.controller.set_enabled(false);
    assert!(!h.controller.is_initialized());
    assert!(!h.controller.context().enabled);

    h.tick_after(10);
    assert_eq!(h.native.initialize_count(), 1);

    h.controller.set_enabled(true);
    h.tick_after(1);
    assert_eq!(h.native.initialize_count(), 2);
    assert!(h.controller.is_initialized());
}

#[test]
fn entering_play_mode_resets_elapsed_time() {
    let mut h = harness();
    h.controller.tick();
    let first_start = h.controller.session_start();

    h.clock.advance(Duration::from_secs(90));
    h.controller
        .on_play_mode_changed(PlayModeChange::EnteredPlayMode);

    assert_eq!(h.controller.state(), ActivityState::PlayMode);
    assert_eq!(h.controller.session_start(), first_start + 90);

    h.controller.tick();
    let presence = h.native.last_presence().unwrap();
    assert_eq!(presence.start_timestamp, first_start + 90);
}

#[test]
fn empty_content_name_clears_details() {
    let mut h = harness();
    h.controller.context_mut().content_name.clear();
    h.controller.tick();

    let presence = h.native.last_presence().unwrap();
    assert_eq!(presence.details(), None);
    assert_eq!(presence.state(), Some("Currently in Edit Mode"));
}

#[test]
fn force_refresh_requires_connection() {
    let mut h = harness();
    assert!(h.controller.force_refresh().is_err());

    h.controller.tick();
    let updates = h.native.update_count();
    h.controller.force_refresh().unwrap();
    assert_eq!(h.native.update_count(), updates + 1);
}

#[test]
fn force_refresh_reports_cooldown() {
    let mut h = harness();
    h.native.fail_initializes(3);
    h.controller.tick();
    h.tick_after(1);
    h.tick_after(1);
    h.clock.advance(Duration::from_secs(10));

    match h.controller.force_refresh() {
        Err(editor_presence::PresenceError::CoolingDown { remaining_ms }) => {
            assert_eq!(remaining_ms, 20_000)
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn play_mode_entry_during_upload_shows_upload() {
    let mut h = harness();
    h.controller.tick();
    assert_eq!(h.controller.state(), ActivityState::EditMode);

    h.detector.set_state(ActivityState::UploadingAvatar);
    h.controller
        .on_play_mode_changed(PlayModeChange::EnteredPlayMode);

    assert_eq!(h.controller.state(), ActivityState::UploadingAvatar);
    assert_eq!(
        h.shown_state().as_deref(),
        Some("Currently Uploading Avatar")
    );

    // leaving play mode goes straight back to editing
    h.detector.set_state(ActivityState::EditMode);
    h.controller
        .on_play_mode_changed(PlayModeChange::EnteredEditMode);
    assert_eq!(h.controller.state(), ActivityState::EditMode);
    assert_eq!(h.shown_state().as_deref(), Some("Currently in Edit Mode"));
}
