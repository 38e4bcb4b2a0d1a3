//! In-process stand-ins for surfaces, effects and platforms used by the unit
//! tests. Nothing here touches a GPU or a window system.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::display::{DisplayPlatform, PlatformError, WallpaperWindow};
use crate::effect::{Effect, EffectDescriptor, EffectError, RenderSurface};
use crate::types::{Display, DisplayId, DisplayPower, NativeWindowId, ViewportSize};

const NAMES: [&str; 8] = [
    "effect_0", "effect_1", "effect_2", "effect_3", "effect_4", "effect_5", "effect_6",
    "effect_7",
];
const ALIASES: [&str; 8] = ["e0", "e1", "e2", "e3", "e4", "e5", "e6", "e7"];

#[derive(Default)]
pub struct FakeDevice;

pub struct FakeSurface {
    device: FakeDevice,
    size: Mutex<ViewportSize>,
    pub reconfigured: AtomicUsize,
}

impl FakeSurface {
    pub fn new(size: ViewportSize) -> Arc<Self> {
        Arc::new(Self {
            device: FakeDevice,
            size: Mutex::new(size),
            reconfigured: AtomicUsize::new(0),
        })
    }

    pub fn set_size(&self, size: ViewportSize) {
        *self.size.lock() = size;
    }
}

impl RenderSurface for FakeSurface {
    type Device = FakeDevice;

    fn device(&self) -> &FakeDevice {
        &self.device
    }

    fn drawable_size(&self) -> ViewportSize {
        *self.size.lock()
    }

    fn reconfigure(&self, _size: ViewportSize) {
        self.reconfigured.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tracks how many effect instances exist across every coordinator.
#[derive(Clone, Default)]
pub struct InstanceCounter {
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
    pub events: Arc<Mutex<Vec<EffectEvent>>>,
}

impl InstanceCounter {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<EffectEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: EffectEvent) {
        self.events.lock().push(event);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EffectEvent {
    Setup(&'static str, ViewportSize),
    Minor(&'static str, ViewportSize),
    Significant(&'static str, ViewportSize),
    Rate(&'static str, f64),
    Draw(&'static str),
    Dropped(&'static str),
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SetupBehaviour {
    Succeed,
    Fail,
    Panic,
    /// Park inside `setup` on the descriptor's gate instead of in `draw`.
    Gate,
}

/// Lets a test park an effect inside `draw` (or `setup`, with
/// [`SetupBehaviour::Gate`]) while the coordinator holds its guard.
#[derive(Clone)]
pub struct DrawGate {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl DrawGate {
    fn pass(&self) {
        let _ = self.entered.send(());
        let _ = self.release.recv();
    }
}

pub struct GateHandle {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

pub fn draw_gate() -> (DrawGate, GateHandle) {
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let (release_tx, release_rx) = crossbeam_channel::unbounded();
    (
        DrawGate {
            entered: entered_tx,
            release: release_rx,
        },
        GateHandle {
            entered: entered_rx,
            release: release_tx,
        },
    )
}

pub struct FakeEffect {
    name: &'static str,
    counter: InstanceCounter,
    behaviour: SetupBehaviour,
    gate: Option<DrawGate>,
}

impl FakeEffect {
    fn new(
        name: &'static str,
        counter: InstanceCounter,
        behaviour: SetupBehaviour,
        gate: Option<DrawGate>,
    ) -> Self {
        let live = counter.live.fetch_add(1, Ordering::SeqCst) + 1;
        counter.peak.fetch_max(live, Ordering::SeqCst);
        counter.created.fetch_add(1, Ordering::SeqCst);
        Self {
            name,
            counter,
            behaviour,
            gate,
        }
    }
}

impl Drop for FakeEffect {
    fn drop(&mut self) {
        self.counter.live.fetch_sub(1, Ordering::SeqCst);
        self.counter.record(EffectEvent::Dropped(self.name));
    }
}

impl Effect<FakeSurface> for FakeEffect {
    fn name(&self) -> &'static str {
        self.name
    }

    fn setup(&mut self, _device: &FakeDevice, size: ViewportSize) -> Result<(), EffectError> {
        match self.behaviour {
            SetupBehaviour::Succeed => {
                self.counter.record(EffectEvent::Setup(self.name, size));
                Ok(())
            }
            SetupBehaviour::Fail => Err(EffectError::Setup(format!("{} refused", self.name))),
            SetupBehaviour::Panic => panic!("{} exploded during setup", self.name),
            SetupBehaviour::Gate => {
                if let Some(gate) = &self.gate {
                    gate.pass();
                }
                self.counter.record(EffectEvent::Setup(self.name, size));
                Ok(())
            }
        }
    }

    fn update_viewport_size(&mut self, size: ViewportSize) {
        self.counter.record(EffectEvent::Minor(self.name, size));
    }

    fn handle_significant_resize(&mut self, size: ViewportSize) {
        self.counter.record(EffectEvent::Significant(self.name, size));
    }

    fn update(&mut self, _now: Instant) {}

    fn draw(&mut self, _surface: &FakeSurface) {
        self.counter.record(EffectEvent::Draw(self.name));
        if self.behaviour != SetupBehaviour::Gate {
            if let Some(gate) = &self.gate {
                gate.pass();
            }
        }
    }

    fn set_update_rate(&mut self, rate: f64) {
        self.counter.record(EffectEvent::Rate(self.name, rate));
    }
}

pub fn counting_descriptor(
    name: &'static str,
    alias: Option<&'static str>,
    counter: &InstanceCounter,
) -> EffectDescriptor<FakeSurface> {
    behaving_descriptor(name, alias, counter, SetupBehaviour::Succeed, None)
}

pub fn behaving_descriptor(
    name: &'static str,
    alias: Option<&'static str>,
    counter: &InstanceCounter,
    behaviour: SetupBehaviour,
    gate: Option<DrawGate>,
) -> EffectDescriptor<FakeSurface> {
    let counter = counter.clone();
    let descriptor = EffectDescriptor::new(name, name, move || {
        Box::new(FakeEffect::new(name, counter.clone(), behaviour, gate.clone()))
            as Box<dyn Effect<FakeSurface>>
    });
    match alias {
        Some(alias) => descriptor.with_alias(alias),
        None => descriptor,
    }
}

/// `count` well-behaved descriptors named `effect_N` with aliases `eN`.
pub fn descriptors(count: usize, counter: &InstanceCounter) -> Vec<EffectDescriptor<FakeSurface>> {
    (0..count.min(NAMES.len()))
        .map(|index| counting_descriptor(NAMES[index], Some(ALIASES[index]), counter))
        .collect()
}

pub fn display(id: u64, width: u32, height: u32) -> Display {
    Display {
        id: DisplayId(id),
        name: format!("FAKE-{id}"),
        origin: ((id as i32) * width as i32, 0),
        size: ViewportSize::new(width, height),
        scale_factor: 1.0,
        power: DisplayPower::Active,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    Opened(DisplayId, NativeWindowId),
    Closed(NativeWindowId),
}

pub struct FakeWindow {
    id: NativeWindowId,
    log: Arc<Mutex<Vec<PlatformEvent>>>,
}

impl WallpaperWindow for FakeWindow {
    fn native_id(&self) -> NativeWindowId {
        self.id
    }

    fn close(self) {
        self.log.lock().push(PlatformEvent::Closed(self.id));
    }
}

#[derive(Default)]
pub struct FakePlatform {
    pub displays: Vec<Display>,
    pub fail_enumeration: bool,
    pub log: Arc<Mutex<Vec<PlatformEvent>>>,
    pub surfaces: Vec<(DisplayId, Arc<FakeSurface>)>,
    next_window: u64,
}

impl FakePlatform {
    pub fn with_displays(displays: Vec<Display>) -> Self {
        Self {
            displays,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        self.log.lock().clone()
    }

    pub fn surface_for(&self, id: DisplayId) -> Option<Arc<FakeSurface>> {
        self.surfaces
            .iter()
            .rev()
            .find(|(display, _)| *display == id)
            .map(|(_, surface)| Arc::clone(surface))
    }
}

impl DisplayPlatform for FakePlatform {
    type Surface = FakeSurface;
    type Window = FakeWindow;

    fn active_displays(&mut self) -> Result<Vec<Display>, PlatformError> {
        if self.fail_enumeration {
            return Err(PlatformError::Enumerate("scripted failure".into()));
        }
        Ok(self.displays.clone())
    }

    fn open_wallpaper(
        &mut self,
        display: &Display,
    ) -> Result<(FakeWindow, Arc<FakeSurface>), PlatformError> {
        self.next_window += 1;
        let id = NativeWindowId(0x1000 + self.next_window);
        self.log.lock().push(PlatformEvent::Opened(display.id, id));
        let surface = FakeSurface::new(display.size);
        self.surfaces.push((display.id, Arc::clone(&surface)));
        Ok((
            FakeWindow {
                id,
                log: Arc::clone(&self.log),
            },
            surface,
        ))
    }
}
