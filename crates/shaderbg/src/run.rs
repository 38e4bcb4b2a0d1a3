use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use pacing::{NullProbe, PacingConfig, PacingPolicy, SystemProbe};
use parking_lot::Mutex;
use renderer::{
    layout_fingerprint, DisplayEvent, DisplayManager, EffectRegistry, GpuContext, InputHub,
    ManagerOptions, PaceCell, WgpuSurface, WinitPlatform, WinitWallpaperWindow,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use wallconfig::WallConfig;
use winit::event::{Event, StartCause, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};

use crate::catalog::{build_registry, render_catalog, startup_default};
use crate::cli::{Cli, Command, RunArgs};
use crate::paths::AppPaths;
use crate::state::AppState;

/// Wake-ups delivered to the event loop from other threads.
#[derive(Debug, Clone, Copy)]
enum DaemonEvent {
    SelectionChanged,
    ForegroundChanged,
    Session(DisplayEvent),
}

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing(cli.run.log_level.as_deref());

    let paths = AppPaths::discover()?;
    match cli.command {
        Some(Command::List) => list(&cli.run, &paths),
        Some(Command::Where) => {
            println!("config: {}", paths.config_file().display());
            println!("state:  {}", paths.state_file().display());
            println!("socket: {}", paths.socket_path().display());
            Ok(())
        }
        Some(Command::Select { effect }) => remote(&paths, &remote_select_line(&effect)),
        Some(Command::Current) => remote(&paths, "current"),
        None => daemon(cli.run, paths),
    }
}

fn initialise_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &RunArgs, paths: &AppPaths) -> Result<WallConfig> {
    let path = args.config.clone().unwrap_or_else(|| paths.config_file());
    let mut config = WallConfig::load_or_default(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    if let Some(rate) = args.high_rate {
        config.pacing.high_rate = rate;
    }
    if let Some(rate) = args.low_rate {
        config.pacing.low_rate = rate;
    }
    config
        .validate()
        .context("command-line rates conflict with configuration")?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

fn load_state(path: &Path) -> AppState {
    AppState::load_or_default(path).unwrap_or_else(|err| {
        warn!(error = %err, "ignoring unreadable state file");
        AppState::default()
    })
}

fn list(args: &RunArgs, paths: &AppPaths) -> Result<()> {
    let config = load_config(args, paths)?;
    let state = load_state(&paths.state_file());
    let registry = build_registry(&config, Arc::new(InputHub::new()))?;
    let default = startup_default(&registry, &config, &state);
    let selected = registry.resolve_hint(args.effect.as_deref(), default);
    print!("{}", render_catalog(&registry, selected));
    Ok(())
}

#[cfg(unix)]
fn remote_select_line(effect: &str) -> String {
    crate::control::select_line(effect)
}

#[cfg(unix)]
fn remote(paths: &AppPaths, line: &str) -> Result<()> {
    let reply = crate::control::send_request(&paths.socket_path(), line)?;
    print!("{reply}");
    Ok(())
}

#[cfg(not(unix))]
fn remote_select_line(effect: &str) -> String {
    effect.to_string()
}

#[cfg(not(unix))]
fn remote(_paths: &AppPaths, _line: &str) -> Result<()> {
    Err(anyhow!("the control socket is only available on Unix platforms"))
}

#[cfg(target_os = "linux")]
fn input_hub() -> InputHub {
    InputHub::with_listener(Box::new(crate::x11::X11InputListener))
}

#[cfg(not(target_os = "linux"))]
fn input_hub() -> InputHub {
    InputHub::new()
}

fn system_probe(enabled: bool) -> Box<dyn SystemProbe> {
    if !enabled {
        info!("system probe disabled; rendering at the high rate");
        return Box::new(NullProbe);
    }
    #[cfg(target_os = "linux")]
    {
        match crate::x11::X11Probe::connect() {
            Ok(probe) => return Box::new(probe),
            Err(err) => {
                warn!(error = %err, "occlusion probe unavailable; assuming wallpaper visible")
            }
        }
    }
    Box::new(NullProbe)
}

#[cfg(target_os = "linux")]
fn watch_foreground(proxy: EventLoopProxy<DaemonEvent>) {
    let proxy = Mutex::new(proxy);
    let result = crate::x11::watch_activation(move || {
        let _ = proxy.lock().send_event(DaemonEvent::ForegroundChanged);
    });
    if let Err(err) = result {
        debug!(error = %err, "foreground tracking unavailable");
    }
}

#[cfg(not(target_os = "linux"))]
fn watch_foreground(_proxy: EventLoopProxy<DaemonEvent>) {}

#[cfg(target_os = "linux")]
fn watch_session(proxy: EventLoopProxy<DaemonEvent>) {
    let proxy = Mutex::new(proxy);
    let result = crate::x11::watch_session(move |event| {
        let _ = proxy.lock().send_event(DaemonEvent::Session(event));
    });
    if let Err(err) = result {
        warn!(error = %err, "screen lock tracking unavailable; wallpapers keep rendering while locked");
    }
}

#[cfg(not(target_os = "linux"))]
fn watch_session(_proxy: EventLoopProxy<DaemonEvent>) {}

/// Persists every user-driven selection and wakes the event loop so the
/// display manager applies it promptly.
fn observe_selection(
    registry: &EffectRegistry<WgpuSurface>,
    state_path: &Path,
    state: AppState,
    proxy: EventLoopProxy<DaemonEvent>,
) {
    let names: Vec<&'static str> = registry
        .descriptors()
        .iter()
        .map(|descriptor| descriptor.stable_name)
        .collect();
    let state_path = state_path.to_path_buf();
    let state = Mutex::new(state);
    let proxy = Mutex::new(proxy);
    registry.selection().subscribe(move |index| {
        if let Some(name) = names.get(index) {
            let mut state = state.lock();
            state.last_effect = Some(name.to_string());
            if let Err(err) = state.persist(&state_path) {
                warn!(error = %err, "failed to remember effect selection");
            }
        }
        let _ = proxy.lock().send_event(DaemonEvent::SelectionChanged);
    });
}

fn daemon(args: RunArgs, paths: AppPaths) -> Result<()> {
    let config = load_config(&args, &paths)?;
    let state_path = paths.state_file();
    let state = load_state(&state_path);

    let hub = Arc::new(input_hub());
    let registry = Arc::new(build_registry(&config, Arc::clone(&hub))?);
    let default = startup_default(&registry, &config, &state);
    registry.apply_startup_hint(args.effect.as_deref(), default);
    info!(
        effect = registry.selected_descriptor().stable_name,
        "bootstrapping shader-bg wallpaper daemon"
    );

    let mut policy = PacingPolicy::new(PacingConfig::from(&config.pacing));
    let pace = Arc::new(PaceCell::new(policy.current()));
    let mut probe = system_probe(!args.no_probe);

    let mut builder = EventLoopBuilder::<DaemonEvent>::with_user_event();
    let event_loop = builder
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let proxy = event_loop.create_proxy();
    observe_selection(&registry, &state_path, state, proxy.clone());
    watch_foreground(proxy.clone());
    watch_session(proxy);

    #[cfg(unix)]
    let _control = match crate::control::ControlServer::spawn(
        &paths.socket_path(),
        Arc::clone(&registry),
    ) {
        Ok(server) => Some(server),
        Err(err) => {
            warn!(error = %err, "control socket unavailable; remote selection disabled");
            None
        }
    };

    let mut manager: DisplayManager<WgpuSurface, WinitWallpaperWindow> = DisplayManager::new(
        Arc::clone(&registry),
        Arc::clone(&pace),
        ManagerOptions::from(&config.surfaces),
    );
    {
        let hub = Arc::clone(&hub);
        manager.on_layout_change(move |displays| hub.set_layout(displays));
    }

    let mut gpu = GpuContext::new();
    let layout_interval = config.surfaces.display_poll_interval;
    let mut layout = Vec::new();
    let mut next_layout_check = Instant::now() + layout_interval;
    let mut suspended = false;

    let run_result = event_loop.run(move |event, elwt| {
        let now = Instant::now();
        match event {
            Event::NewEvents(StartCause::Init) => {
                let mut platform = WinitPlatform::new(elwt, &mut gpu);
                match manager.start(&mut platform) {
                    Ok(surfaces) => info!(surfaces, "wallpaper started"),
                    Err(err) => {
                        error!(error = %err, "no display could host a wallpaper");
                        elwt.exit();
                        return;
                    }
                }
                layout = layout_fingerprint(elwt);
            }
            Event::UserEvent(DaemonEvent::SelectionChanged) => {
                debug!("selection change received");
            }
            Event::UserEvent(DaemonEvent::ForegroundChanged) => {
                policy.nudge(now);
            }
            Event::UserEvent(DaemonEvent::Session(session)) => {
                let mut platform = WinitPlatform::new(elwt, &mut gpu);
                manager.handle_event(&mut platform, session, now);
            }
            Event::Suspended => {
                suspended = true;
                let mut platform = WinitPlatform::new(elwt, &mut gpu);
                manager.handle_event(&mut platform, DisplayEvent::SessionLocked, now);
            }
            Event::Resumed if suspended => {
                suspended = false;
                let mut platform = WinitPlatform::new(elwt, &mut gpu);
                manager.handle_event(&mut platform, DisplayEvent::SessionResumed, now);
            }
            Event::WindowEvent {
                window_id,
                event: WindowEvent::Resized(size),
            } => {
                for coordinator in manager.coordinators() {
                    if coordinator.surface().window().id() == window_id {
                        coordinator.surface().note_resized(size.into());
                    }
                }
            }
            Event::AboutToWait => {
                if now >= next_layout_check {
                    next_layout_check = now + layout_interval;
                    let current = layout_fingerprint(elwt);
                    if current != layout {
                        layout = current;
                        let mut platform = WinitPlatform::new(elwt, &mut gpu);
                        manager.handle_event(
                            &mut platform,
                            DisplayEvent::ConfigurationChanged,
                            now,
                        );
                    }
                }
                if let Some(next) = policy.poll(probe.as_mut(), now) {
                    pace.set(next);
                }
                let mut platform = WinitPlatform::new(elwt, &mut gpu);
                manager.poll(&mut platform, now);

                let deadline = [
                    Some(next_layout_check),
                    policy.next_deadline(),
                    manager.next_deadline(),
                ]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(next_layout_check);
                elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
            Event::LoopExiting => {
                manager.teardown_all();
            }
            _ => {}
        }
    });

    run_result.map_err(|err| anyhow!("event loop error: {err}"))
}
