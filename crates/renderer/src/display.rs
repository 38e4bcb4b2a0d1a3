//! Display topology and session handling.
//!
//! The [`DisplayManager`] keeps one `(display, window, coordinator, driver)`
//! binding per active display. Every topology change is handled the same
//! way: tear everything down, then rebuild from a fresh enumeration. Session
//! lock halts everything; resume rebuilds after a debounce so displays that
//! are still waking up are not enumerated half-initialised.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use tracing::{debug, info, warn};

use crate::cell::{ObserverId, PaceCell};
use crate::coordinator::{CoordinatorOptions, SurfaceCoordinator, SwitchOutcome};
use crate::driver::FrameDriver;
use crate::effect::RenderSurface;
use crate::registry::EffectRegistry;
use crate::types::{Display, DisplayId, NativeWindowId};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to enumerate displays: {0}")]
    Enumerate(String),
    #[error("failed to create wallpaper window: {0}")]
    Window(String),
    #[error("failed to create render surface: {0}")]
    Surface(String),
    #[error("failed to start frame driver: {0}")]
    Driver(#[from] std::io::Error),
}

/// Borderless, non-activating window pinned behind desktop content.
pub trait WallpaperWindow {
    fn native_id(&self) -> NativeWindowId;

    /// Hides and destroys the window.
    fn close(self);
}

/// Window-system seam used by the [`DisplayManager`].
pub trait DisplayPlatform {
    type Surface: RenderSurface;
    type Window: WallpaperWindow;

    fn active_displays(&mut self) -> Result<Vec<Display>, PlatformError>;

    /// Opens a wallpaper window covering `display` together with its render
    /// surface.
    fn open_wallpaper(
        &mut self,
        display: &Display,
    ) -> Result<(Self::Window, Arc<Self::Surface>), PlatformError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// Display added, removed or rearranged.
    ConfigurationChanged,
    /// Screen locked or displays went to sleep.
    SessionLocked,
    SessionResumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Locked,
    /// Resumed; rebuild once the deadline passes.
    Resuming { rebuild_at: Instant },
}

#[derive(Debug, Clone, Copy)]
pub struct ManagerOptions {
    pub coordinator: CoordinatorOptions,
    pub resume_debounce: Duration,
    /// Spawn a frame driver per binding. Tests turn this off and tick by hand.
    pub drive_frames: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorOptions::default(),
            resume_debounce: Duration::from_secs(1),
            drive_frames: true,
        }
    }
}

impl From<&wallconfig::SurfaceSection> for ManagerOptions {
    fn from(section: &wallconfig::SurfaceSection) -> Self {
        Self {
            coordinator: CoordinatorOptions::from(section),
            resume_debounce: section.resume_debounce,
            drive_frames: true,
        }
    }
}

struct DisplayBinding<S: RenderSurface, W: WallpaperWindow> {
    display: Display,
    window: Option<W>,
    native_id: NativeWindowId,
    coordinator: Arc<SurfaceCoordinator<S>>,
    driver: Option<FrameDriver>,
}

type LayoutObserver = Box<dyn Fn(&[Display]) + Send>;

pub struct DisplayManager<S: RenderSurface, W: WallpaperWindow> {
    registry: Arc<EffectRegistry<S>>,
    pace: Arc<PaceCell>,
    options: ManagerOptions,
    bindings: Vec<DisplayBinding<S, W>>,
    session: SessionState,
    selection_rx: Receiver<usize>,
    selection_observer: ObserverId,
    layout_observer: Option<LayoutObserver>,
}

impl<S: RenderSurface, W: WallpaperWindow> DisplayManager<S, W> {
    pub fn new(
        registry: Arc<EffectRegistry<S>>,
        pace: Arc<PaceCell>,
        options: ManagerOptions,
    ) -> Self {
        let (selection_tx, selection_rx) = unbounded();
        let selection_observer = registry.selection().subscribe(move |index| {
            let _ = selection_tx.send(index);
        });
        Self {
            registry,
            pace,
            options,
            bindings: Vec::new(),
            session: SessionState::Running,
            selection_rx,
            selection_observer,
            layout_observer: None,
        }
    }

    /// Called with the new display list after every rebuild.
    pub fn on_layout_change(&mut self, observer: impl Fn(&[Display]) + Send + 'static) {
        self.layout_observer = Some(Box::new(observer));
    }

    pub fn registry(&self) -> &Arc<EffectRegistry<S>> {
        &self.registry
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn displays(&self) -> Vec<Display> {
        self.bindings
            .iter()
            .map(|binding| binding.display.clone())
            .collect()
    }

    pub fn coordinators(&self) -> Vec<Arc<SurfaceCoordinator<S>>> {
        self.bindings
            .iter()
            .map(|binding| Arc::clone(&binding.coordinator))
            .collect()
    }

    pub fn coordinator(&self, display: DisplayId) -> Option<&Arc<SurfaceCoordinator<S>>> {
        self.bindings
            .iter()
            .find(|binding| binding.display.id == display)
            .map(|binding| &binding.coordinator)
    }

    /// Window handle per display, for screenshot tooling.
    pub fn window_associations(&self) -> Vec<(DisplayId, NativeWindowId)> {
        self.bindings
            .iter()
            .map(|binding| (binding.display.id, binding.native_id))
            .collect()
    }

    /// Builds the initial bindings.
    pub fn start<P>(&mut self, platform: &mut P) -> Result<usize, PlatformError>
    where
        P: DisplayPlatform<Surface = S, Window = W>,
    {
        self.rebuild(platform)
    }

    pub fn handle_event<P>(&mut self, platform: &mut P, event: DisplayEvent, now: Instant)
    where
        P: DisplayPlatform<Surface = S, Window = W>,
    {
        match event {
            DisplayEvent::ConfigurationChanged => {
                if self.session != SessionState::Running {
                    debug!(session = ?self.session, "display change while halted; rebuild deferred to resume");
                    return;
                }
                info!("display configuration changed; rebuilding wallpaper windows");
                if let Err(err) = self.rebuild(platform) {
                    warn!(error = %err, "rebuild failed; keeping previous wallpaper windows");
                }
            }
            DisplayEvent::SessionLocked => {
                info!("session locked; halting all wallpaper surfaces");
                self.teardown_all();
                self.session = SessionState::Locked;
            }
            DisplayEvent::SessionResumed => {
                if self.session == SessionState::Running {
                    return;
                }
                let rebuild_at = now + self.options.resume_debounce;
                debug!(debounce = ?self.options.resume_debounce, "session resumed; scheduling rebuild");
                self.session = SessionState::Resuming { rebuild_at };
            }
        }
    }

    /// Completes a debounced resume and applies selection changes. Call from
    /// the control loop on every wake-up.
    pub fn poll<P>(&mut self, platform: &mut P, now: Instant)
    where
        P: DisplayPlatform<Surface = S, Window = W>,
    {
        if let SessionState::Resuming { rebuild_at } = self.session {
            if now >= rebuild_at {
                self.session = SessionState::Running;
                info!("resume debounce elapsed; rebuilding wallpaper windows");
                if let Err(err) = self.rebuild(platform) {
                    warn!(error = %err, "rebuild after resume failed");
                }
            }
        }
        self.apply_selection_changes();
    }

    /// Next instant [`DisplayManager::poll`] has work scheduled for.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.session {
            SessionState::Resuming { rebuild_at } => Some(rebuild_at),
            _ => None,
        }
    }

    /// Tears down every binding and recreates one per active display.
    ///
    /// Enumeration happens first; when it fails the current bindings are
    /// left untouched.
    pub fn rebuild<P>(&mut self, platform: &mut P) -> Result<usize, PlatformError>
    where
        P: DisplayPlatform<Surface = S, Window = W>,
    {
        let displays = platform.active_displays()?;
        self.teardown_all();
        // selection changes made before the rebuild are already reflected in
        // the registry, so fresh coordinators pick them up directly
        while self.selection_rx.try_recv().is_ok() {}

        for display in displays.into_iter().filter(Display::is_active) {
            match self.bind(platform, &display) {
                Ok(binding) => self.bindings.push(binding),
                Err(err) => {
                    let (display_id, display_name) = (display.id, &display.name);
                    warn!(
                        display = %display_id,
                        name = %display_name,
                        error = %err,
                        "skipping display"
                    )
                }
            }
        }
        info!(
            surfaces = self.bindings.len(),
            effect = self.registry.selected_descriptor().stable_name,
            "wallpaper surfaces ready"
        );
        if let Some(observer) = &self.layout_observer {
            observer(&self.displays());
        }
        Ok(self.bindings.len())
    }

    /// Releases every binding: coordinator, then driver, then window.
    pub fn teardown_all(&mut self) {
        for binding in self.bindings.drain(..) {
            release_binding(binding);
        }
    }

    fn bind<P>(
        &self,
        platform: &mut P,
        display: &Display,
    ) -> Result<DisplayBinding<S, W>, PlatformError>
    where
        P: DisplayPlatform<Surface = S, Window = W>,
    {
        let (window, surface) = platform.open_wallpaper(display)?;
        let native_id = window.native_id();
        let coordinator = Arc::new(SurfaceCoordinator::new(
            display.id,
            surface,
            Arc::clone(&self.registry),
            Arc::clone(&self.pace),
            self.options.coordinator,
        ));
        let driver = if self.options.drive_frames {
            match FrameDriver::spawn(Arc::clone(&coordinator)) {
                Ok(driver) => Some(driver),
                Err(err) => {
                    coordinator.teardown();
                    window.close();
                    return Err(err.into());
                }
            }
        } else {
            None
        };
        let (display_id, size) = (display.id, display.size);
        debug!(display = %display_id, window = %native_id, size = %size, "wallpaper window bound");
        Ok(DisplayBinding {
            display: display.clone(),
            window: Some(window),
            native_id,
            coordinator,
            driver,
        })
    }

    fn apply_selection_changes(&mut self) {
        let Some(index) = self.selection_rx.try_iter().last() else {
            return;
        };
        if self.bindings.is_empty() {
            return;
        }
        let name = self
            .registry
            .descriptor(index)
            .map_or("<unknown>", |descriptor| descriptor.stable_name);
        info!(index, effect = name, "switching effect on all displays");
        for binding in &self.bindings {
            let outcome = binding.coordinator.switch_to(index);
            if outcome != SwitchOutcome::Switched {
                debug!(display = %binding.display.id, ?outcome, "effect switch not immediate");
            }
        }
    }
}

impl<S: RenderSurface, W: WallpaperWindow> Drop for DisplayManager<S, W> {
    fn drop(&mut self) {
        self.registry
            .selection()
            .unsubscribe(self.selection_observer);
        self.teardown_all();
    }
}

fn release_binding<S: RenderSurface, W: WallpaperWindow>(mut binding: DisplayBinding<S, W>) {
    binding.coordinator.teardown();
    if let Some(driver) = binding.driver.take() {
        driver.stop();
    }
    if let Some(window) = binding.window.take() {
        window.close();
    }
    debug!(display = %binding.display.id, "wallpaper window released");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{CoordinatorPhase, TickOutcome};
    use crate::testing::{
        behaving_descriptor, counting_descriptor, descriptors, display, draw_gate, EffectEvent,
        FakePlatform, FakeSurface, FakeWindow, InstanceCounter, PlatformEvent, SetupBehaviour,
    };
    use crate::types::ViewportSize;
    use pacing::{Pace, PacingTier};
    use std::thread;

    type Manager = DisplayManager<FakeSurface, FakeWindow>;

    fn manager(registry: EffectRegistry<FakeSurface>) -> Manager {
        DisplayManager::new(
            Arc::new(registry),
            Arc::new(PaceCell::new(Pace {
                rate: 30.0,
                tier: PacingTier::Visible,
            })),
            ManagerOptions {
                coordinator: CoordinatorOptions {
                    guard_timeout: Duration::from_millis(20),
                    ..CoordinatorOptions::default()
                },
                resume_debounce: Duration::from_secs(1),
                drive_frames: false,
            },
        )
    }

    fn tick_all(manager: &Manager) -> Vec<TickOutcome> {
        manager
            .coordinators()
            .iter()
            .map(|coordinator| coordinator.tick(Instant::now()))
            .collect()
    }

    #[test]
    fn two_displays_start_with_the_default_effect() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(6, &counter)).unwrap();
        let mut platform =
            FakePlatform::with_displays(vec![display(1, 1920, 1080), display(2, 2560, 1440)]);
        let mut manager = manager(registry);

        assert_eq!(manager.start(&mut platform).unwrap(), 2);
        assert_eq!(tick_all(&manager), vec![TickOutcome::Rendered; 2]);
        for coordinator in manager.coordinators() {
            assert_eq!(coordinator.active_index(), Some(2));
        }
        assert_eq!(counter.live(), 2);

        let associations = manager.window_associations();
        assert_eq!(associations.len(), 2);
        assert_eq!(associations[0].0, DisplayId(1));
        assert_eq!(associations[1].0, DisplayId(2));
    }

    #[test]
    fn reconfiguration_waits_for_a_switch_in_progress() {
        let counter = InstanceCounter::default();
        let (gate, handle) = draw_gate();
        let list = vec![
            counting_descriptor("plain", None, &counter),
            behaving_descriptor("slow_setup", None, &counter, SetupBehaviour::Gate, Some(gate)),
        ];
        let registry = EffectRegistry::register(list).unwrap();
        registry.select(0);
        let mut platform = FakePlatform::with_displays(vec![display(1, 1920, 1080)]);
        let mut manager = manager(registry);
        manager.start(&mut platform).unwrap();
        let old = manager.coordinators().remove(0);
        let old_window = manager.window_associations()[0].1;
        assert_eq!(old.tick(Instant::now()), TickOutcome::Rendered);

        let switcher = {
            let old = Arc::clone(&old);
            thread::spawn(move || old.switch_to(1))
        };
        handle.entered.recv().unwrap();
        assert_eq!(old.phase(), CoordinatorPhase::Constructing);

        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let releaser = {
            let released = Arc::clone(&released);
            let release = handle.release.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                released.store(true, std::sync::atomic::Ordering::SeqCst);
                release.send(()).unwrap();
            })
        };
        platform.displays.push(display(2, 1280, 720));
        manager.handle_event(&mut platform, DisplayEvent::ConfigurationChanged, Instant::now());

        // teardown could only take the guard once setup returned
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
        assert!(platform.events().contains(&PlatformEvent::Closed(old_window)));
        assert_eq!(switcher.join().unwrap(), SwitchOutcome::Switched);
        releaser.join().unwrap();

        assert_eq!(old.phase(), CoordinatorPhase::TornDown);
        assert_eq!(counter.live(), 0);
        assert_eq!(counter.peak(), 1);
        let events = counter.events();
        let built = events
            .iter()
            .position(|event| {
                *event == EffectEvent::Setup("slow_setup", ViewportSize::new(1920, 1080))
            })
            .unwrap();
        let dropped = events
            .iter()
            .position(|event| *event == EffectEvent::Dropped("slow_setup"))
            .unwrap();
        assert!(built < dropped);
        assert_eq!(manager.coordinators().len(), 2);
    }

    #[test]
    fn inactive_displays_get_no_window() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let mut asleep = display(2, 1280, 720);
        asleep.power = crate::types::DisplayPower::Asleep;
        let mut platform = FakePlatform::with_displays(vec![display(1, 1920, 1080), asleep]);
        let mut manager = manager(registry);
        assert_eq!(manager.start(&mut platform).unwrap(), 1);
    }

    #[test]
    fn selection_change_hot_swaps_every_display() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(4, &counter)).unwrap();
        let mut platform =
            FakePlatform::with_displays(vec![display(1, 1920, 1080), display(2, 1920, 1080)]);
        let mut manager = manager(registry);
        manager.start(&mut platform).unwrap();
        tick_all(&manager);

        assert!(manager.registry().select(0));
        manager.poll(&mut platform, Instant::now());
        for coordinator in manager.coordinators() {
            assert_eq!(coordinator.active_index(), Some(0));
        }
        assert_eq!(counter.live(), 2);
        assert_eq!(counter.peak(), 2);
    }

    #[test]
    fn out_of_range_selection_changes_nothing() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let mut platform = FakePlatform::with_displays(vec![display(1, 1920, 1080)]);
        let mut manager = manager(registry);
        manager.start(&mut platform).unwrap();
        tick_all(&manager);
        let created = counter.created();

        assert!(!manager.registry().select(3));
        manager.poll(&mut platform, Instant::now());
        assert_eq!(manager.registry().selected(), 2);
        assert_eq!(counter.created(), created);
        assert_eq!(manager.coordinators()[0].active_index(), Some(2));
    }

    #[test]
    fn configuration_change_rebuilds_in_release_order() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let mut platform = FakePlatform::with_displays(vec![display(1, 1920, 1080)]);
        let mut manager = manager(registry);
        manager.start(&mut platform).unwrap();
        let first = manager.coordinators()[0].clone();
        tick_all(&manager);

        platform.displays.push(display(2, 1280, 1024));
        manager.handle_event(&mut platform, DisplayEvent::ConfigurationChanged, Instant::now());

        assert_eq!(first.phase(), CoordinatorPhase::TornDown);
        assert_eq!(manager.coordinators().len(), 2);
        assert_eq!(
            platform.events(),
            vec![
                PlatformEvent::Opened(DisplayId(1), NativeWindowId(0x1001)),
                PlatformEvent::Closed(NativeWindowId(0x1001)),
                PlatformEvent::Opened(DisplayId(1), NativeWindowId(0x1002)),
                PlatformEvent::Opened(DisplayId(2), NativeWindowId(0x1003)),
            ]
        );
        tick_all(&manager);
        assert_eq!(counter.live(), 2);
    }

    #[test]
    fn enumeration_failure_keeps_existing_bindings() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let mut platform = FakePlatform::with_displays(vec![display(1, 1920, 1080)]);
        let mut manager = manager(registry);
        manager.start(&mut platform).unwrap();
        tick_all(&manager);

        platform.fail_enumeration = true;
        manager.handle_event(&mut platform, DisplayEvent::ConfigurationChanged, Instant::now());
        assert_eq!(manager.coordinators().len(), 1);
        assert_eq!(tick_all(&manager), vec![TickOutcome::Rendered]);
    }

    #[test]
    fn lock_halts_everything_until_resume_debounce_elapses() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let mut platform =
            FakePlatform::with_displays(vec![display(1, 1920, 1080), display(2, 1920, 1080)]);
        let mut manager = manager(registry);
        manager.start(&mut platform).unwrap();
        let before = manager.coordinators();
        tick_all(&manager);

        let start = Instant::now();
        manager.handle_event(&mut platform, DisplayEvent::SessionLocked, start);
        assert_eq!(manager.session(), SessionState::Locked);
        assert!(manager.coordinators().is_empty());
        assert_eq!(counter.live(), 0);
        for coordinator in &before {
            assert_eq!(coordinator.phase(), CoordinatorPhase::TornDown);
            assert_eq!(coordinator.tick(start), TickOutcome::Inactive);
        }

        // topology churn while locked is ignored
        manager.handle_event(&mut platform, DisplayEvent::ConfigurationChanged, start);
        assert!(manager.coordinators().is_empty());

        manager.handle_event(&mut platform, DisplayEvent::SessionResumed, start);
        manager.poll(&mut platform, start + Duration::from_millis(500));
        assert!(manager.coordinators().is_empty());
        assert_eq!(manager.next_deadline(), Some(start + Duration::from_secs(1)));

        manager.poll(&mut platform, start + Duration::from_secs(1));
        assert_eq!(manager.session(), SessionState::Running);
        assert_eq!(manager.coordinators().len(), 2);
        assert_eq!(tick_all(&manager), vec![TickOutcome::Rendered; 2]);
        assert_eq!(counter.created(), 4);
    }

    #[test]
    fn failing_selection_falls_back_on_every_display() {
        let counter = InstanceCounter::default();
        let list = vec![
            counting_descriptor("safe", None, &counter),
            counting_descriptor("other", None, &counter),
            behaving_descriptor("broken", None, &counter, SetupBehaviour::Fail, None),
        ];
        let registry = EffectRegistry::register(list).unwrap();
        let mut platform =
            FakePlatform::with_displays(vec![display(1, 800, 600), display(2, 800, 600)]);
        let mut manager = manager(registry);
        manager.start(&mut platform).unwrap();

        assert_eq!(tick_all(&manager), vec![TickOutcome::Rendered; 2]);
        for coordinator in manager.coordinators() {
            assert_eq!(coordinator.active_index(), Some(0));
            assert_eq!(coordinator.stats().fallbacks, 1);
        }
    }

    #[test]
    fn rebuild_waits_for_in_flight_frame() {
        let counter = InstanceCounter::default();
        let (gate, handle) = draw_gate();
        let list = vec![
            counting_descriptor("plain", None, &counter),
            behaving_descriptor("slow", None, &counter, SetupBehaviour::Succeed, Some(gate)),
        ];
        let registry = EffectRegistry::register(list).unwrap();
        let mut platform = FakePlatform::with_displays(vec![display(1, 1920, 1080)]);
        let mut manager = manager(registry);
        manager.start(&mut platform).unwrap();
        let coordinator = manager.coordinators()[0].clone();

        let worker = thread::spawn(move || coordinator.tick(Instant::now()));
        handle.entered.recv().unwrap();
        let release = handle.release.clone();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release.send(()).unwrap();
        });

        manager.handle_event(&mut platform, DisplayEvent::ConfigurationChanged, Instant::now());
        assert_eq!(worker.join().unwrap(), TickOutcome::Rendered);
        releaser.join().unwrap();
        // the old instance was released before the replacement window opened
        assert_eq!(counter.live(), 0);
        assert_eq!(manager.coordinators().len(), 1);
        assert_eq!(
            platform.events()[1],
            PlatformEvent::Closed(NativeWindowId(0x1001))
        );
        // the new coordinator picks up where the old one left off
        let replacement = platform.surface_for(DisplayId(1)).unwrap();
        assert_eq!(replacement.drawable_size(), ViewportSize::new(1920, 1080));
        handle.release.send(()).unwrap();
        assert_eq!(tick_all(&manager), vec![TickOutcome::Rendered]);
        assert_eq!(counter.peak(), 1);
    }

    #[test]
    fn layout_observer_sees_each_rebuild() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let mut platform = FakePlatform::with_displays(vec![display(1, 1920, 1080)]);
        let mut manager = manager(registry);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.on_layout_change(move |displays| sink.lock().push(displays.len()));

        manager.start(&mut platform).unwrap();
        platform.displays.push(display(2, 1920, 1080));
        manager.handle_event(&mut platform, DisplayEvent::ConfigurationChanged, Instant::now());
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn dropping_the_manager_releases_everything() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let mut platform = FakePlatform::with_displays(vec![display(1, 1920, 1080)]);
        let mut manager = manager(registry);
        manager.start(&mut platform).unwrap();
        tick_all(&manager);
        drop(manager);
        assert_eq!(counter.live(), 0);
        assert!(platform
            .events()
            .contains(&PlatformEvent::Closed(NativeWindowId(0x1001))));
    }
}
