use clap::Parser;
use editor_presence::config::DEFAULT_APPLICATION_ID;
use editor_presence::{
    ActivityState, EventHandlers, IpcRpc, LoopbackRpc, ManualDetector, NativeRpc, PlayModeChange,
    PresenceController, PresenceSettings, Result, RpcConfig,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Simulated editor session: edit, test in play mode, upload, back to editing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Discord Application Client ID
    #[arg(short, long)]
    client_id: Option<String>,

    /// Presence settings file (created with defaults if missing)
    #[arg(short, long, default_value = "presence.json")]
    settings: PathBuf,

    /// Name shown on the details line
    #[arg(short, long)]
    avatar: Option<String>,

    /// Seconds spent in each phase
    #[arg(long, default_value_t = 15)]
    phase_secs: u64,

    /// Record calls in-process instead of talking to Discord
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result {
    // Load .env file if it exists (optional)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let client_id = args
        .client_id
        .clone()
        .or_else(|| std::env::var("DISCORD_CLIENT_ID").ok())
        .unwrap_or_else(|| DEFAULT_APPLICATION_ID.to_string());

    let mut settings = PresenceSettings::load(&args.settings)?;
    if let Some(avatar) = &args.avatar {
        settings.content_name = avatar.clone();
    }
    settings.save(&args.settings)?;

    let config = RpcConfig::new().with_application_id(client_id);

    if args.dry_run {
        let (native, handle) = LoopbackRpc::new();
        run(native, settings, config, &args)?;
        println!(" Dry run sent {} presence updates", handle.update_count());
        Ok(())
    } else {
        run(IpcRpc::new(), settings, config, &args)
    }
}

fn run<N: NativeRpc>(
    native: N,
    settings: PresenceSettings,
    config: RpcConfig,
    args: &Args,
) -> Result {
    let detector = ManualDetector::default();
    let mut controller = PresenceController::new(native, detector.clone(), settings, config)?;

    controller.reporter().on_log(|line| println!("{line}"));
    controller.reporter().on_error(|msg| eprintln!("[DiscordRPC] ERROR: {msg}"));
    controller.on_state_changed(|from, to| println!(" {} -> {}", from.display_text(), to.display_text()));
    controller.set_event_handlers(|| {
        EventHandlers::new()
            .on_ready(|user| println!(" Connected as {}", user.username))
            .on_join_request(|user| println!(" {} wants to join", user.username))
    });

    let phase = Duration::from_secs(args.phase_secs);
    println!(" Starting editor session ({}s per phase)", args.phase_secs);
    tick_for(&mut controller, phase);

    detector.set_state(ActivityState::PlayMode);
    detector.set_playing(true);
    controller.on_play_mode_changed(PlayModeChange::EnteredPlayMode);
    tick_for(&mut controller, phase);

    detector.set_state(ActivityState::UploadingAvatar);
    controller.update_state(ActivityState::UploadingAvatar);
    println!(" {}", controller.state().timed_text(controller.uptime()));
    tick_for(&mut controller, phase);

    detector.set_state(ActivityState::EditMode);
    detector.set_playing(false);
    controller.on_play_mode_changed(PlayModeChange::EnteredEditMode);
    tick_for(&mut controller, phase);

    controller.shutdown();
    println!(" Session finished after {:?}", controller.uptime());
    Ok(())
}

fn tick_for<N: NativeRpc>(
    controller: &mut PresenceController<N, ManualDetector, PresenceSettings>,
    duration: Duration,
) {
    let until = Instant::now() + duration;
    while Instant::now() < until {
        controller.tick();
        std::thread::sleep(Duration::from_millis(250));
    }
}
