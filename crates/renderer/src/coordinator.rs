//! Per-surface effect lifecycle.
//!
//! A [`SurfaceCoordinator`] owns at most one live effect instance for one
//! wallpaper surface and serialises every lifecycle transition behind a
//! single guard:
//!
//! ```text
//!             tick (lazy build)            switch_to
//!   Empty ───────────────▶ Constructing ──▶ Active ◀──────▶ Switching
//!     ▲                        │ setup failed    │
//!     └────────────────────────┘ (no fallback)   │ teardown
//!                                                ▼
//!                                    TearingDown ──▶ TornDown
//! ```
//!
//! Frame ticks only ever `try_lock` the guard and drop the frame when a
//! lifecycle transition is in flight. Switches and teardown wait a bounded
//! time for an in-progress frame to finish.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pacing::PacingTier;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use crate::cell::PaceCell;
use crate::effect::{Effect, EffectError, RenderSurface};
use crate::registry::EffectRegistry;
use crate::resize::{ResizeKind, ResizePolicy};
use crate::types::{DisplayId, ViewportSize};

const NO_INDEX: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoordinatorPhase {
    Empty = 0,
    Constructing = 1,
    Active = 2,
    Switching = 3,
    TearingDown = 4,
    TornDown = 5,
}

impl CoordinatorPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Constructing,
            2 => Self::Active,
            3 => Self::Switching,
            4 => Self::TearingDown,
            5 => Self::TornDown,
            _ => Self::Empty,
        }
    }
}

/// What happened to a single frame tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    /// A lifecycle transition held the guard; the frame was dropped.
    Contended,
    /// The coordinator was torn down.
    Inactive,
    /// The surface has no drawable area yet.
    NoDrawable,
    /// Neither the selected effect nor the fallback could be built.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    /// The guard stayed busy past the timeout; the switch runs on the next
    /// frame tick instead.
    Deferred,
    /// No drawable yet; the new effect is built lazily on the first tick.
    Pending,
    /// Out-of-range index or the coordinator is no longer active.
    Ignored,
    Unavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub rendered: u64,
    pub contended: u64,
    pub constructions: u64,
    pub construction_failures: u64,
    pub fallbacks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorOptions {
    pub resize: ResizePolicy,
    /// Upper bound on how long a switch or teardown waits for a frame in
    /// flight.
    pub guard_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            resize: ResizePolicy::default(),
            guard_timeout: Duration::from_millis(40),
        }
    }
}

impl From<&wallconfig::SurfaceSection> for CoordinatorOptions {
    fn from(section: &wallconfig::SurfaceSection) -> Self {
        Self {
            resize: ResizePolicy::from(section),
            guard_timeout: section.guard_timeout,
        }
    }
}

struct LiveEffect<S: RenderSurface> {
    index: usize,
    instance: Box<dyn Effect<S>>,
}

struct EffectSlot<S: RenderSurface> {
    live: Option<LiveEffect<S>>,
    last_size: ViewportSize,
    /// Pace generation last forwarded to the live instance.
    pace_generation: Option<u64>,
    /// Index to build on the next tick instead of the registry selection.
    pending_index: Option<usize>,
    /// Last selection that could not be built, even with the fallback.
    /// Ticks leave the slot empty until the selection changes or the
    /// surface is resized significantly.
    failed: Option<FailedBuild>,
}

#[derive(Debug, Clone, Copy)]
struct FailedBuild {
    index: usize,
    size: ViewportSize,
}

#[derive(Default)]
struct Counters {
    rendered: AtomicU64,
    contended: AtomicU64,
    constructions: AtomicU64,
    construction_failures: AtomicU64,
    fallbacks: AtomicU64,
}

pub struct SurfaceCoordinator<S: RenderSurface> {
    display: DisplayId,
    surface: Arc<S>,
    registry: Arc<EffectRegistry<S>>,
    pace: Arc<PaceCell>,
    options: CoordinatorOptions,
    slot: Mutex<EffectSlot<S>>,
    active: AtomicBool,
    phase: AtomicU8,
    active_index: AtomicUsize,
    deferred_switch: AtomicUsize,
    preferred_visible: AtomicU32,
    preferred_occluded: AtomicU32,
    counters: Counters,
}

impl<S: RenderSurface> SurfaceCoordinator<S> {
    pub fn new(
        display: DisplayId,
        surface: Arc<S>,
        registry: Arc<EffectRegistry<S>>,
        pace: Arc<PaceCell>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            display,
            surface,
            registry,
            pace,
            options,
            slot: Mutex::new(EffectSlot {
                live: None,
                last_size: ViewportSize::default(),
                pace_generation: None,
                pending_index: None,
                failed: None,
            }),
            active: AtomicBool::new(true),
            phase: AtomicU8::new(CoordinatorPhase::Empty as u8),
            active_index: AtomicUsize::new(NO_INDEX),
            deferred_switch: AtomicUsize::new(NO_INDEX),
            preferred_visible: AtomicU32::new(60),
            preferred_occluded: AtomicU32::new(30),
            counters: Counters::default(),
        }
    }

    pub fn display(&self) -> DisplayId {
        self.display
    }

    pub fn surface(&self) -> &Arc<S> {
        &self.surface
    }

    pub fn phase(&self) -> CoordinatorPhase {
        CoordinatorPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Registry index of the live instance, if any.
    pub fn active_index(&self) -> Option<usize> {
        match self.active_index.load(Ordering::Acquire) {
            NO_INDEX => None,
            index => Some(index),
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            rendered: self.counters.rendered.load(Ordering::Relaxed),
            contended: self.counters.contended.load(Ordering::Relaxed),
            constructions: self.counters.constructions.load(Ordering::Relaxed),
            construction_failures: self.counters.construction_failures.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Interval the frame driver should sleep between ticks, derived from the
    /// live effect's preferred rates and the current pacing tier.
    pub fn frame_interval(&self) -> Duration {
        let fps = match self.pace.get().tier {
            PacingTier::Visible => self.preferred_visible.load(Ordering::Relaxed),
            PacingTier::Occluded => self.preferred_occluded.load(Ordering::Relaxed),
        };
        Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
    }

    /// Runs one frame: builds the effect if needed, applies resizes and pace
    /// changes, then updates and draws. Never blocks on the guard.
    pub fn tick(&self, now: Instant) -> TickOutcome {
        if !self.is_active() {
            return TickOutcome::Inactive;
        }
        let Some(mut slot) = self.slot.try_lock() else {
            self.counters.contended.fetch_add(1, Ordering::Relaxed);
            trace!(display = %self.display, "frame dropped; lifecycle transition in progress");
            return TickOutcome::Contended;
        };
        // teardown may have flipped the flag while we raced for the guard
        if !self.is_active() {
            return TickOutcome::Inactive;
        }

        let size = self.surface.drawable_size();
        if size.is_empty() {
            return TickOutcome::NoDrawable;
        }

        let deferred = self.deferred_switch.swap(NO_INDEX, Ordering::AcqRel);
        if deferred != NO_INDEX {
            debug!(display = %self.display, index = deferred, "applying deferred effect switch");
            self.set_phase(CoordinatorPhase::Switching);
            self.release_locked(&mut slot);
            slot.pending_index = Some(deferred);
        }

        if slot.live.is_none() {
            let index = match slot.pending_index.take() {
                Some(index) => index,
                None => {
                    let selected = self.registry.selected();
                    if self.retry_suppressed(&slot, selected, size) {
                        return TickOutcome::Unavailable;
                    }
                    selected
                }
            };
            self.construct_locked(&mut slot, index, size);
        } else if size != slot.last_size {
            self.resize_locked(&mut slot, size);
        }

        self.sync_pace_locked(&mut slot);
        let Some(live) = slot.live.as_mut() else {
            return TickOutcome::Unavailable;
        };
        live.instance.update(now);
        live.instance.draw(&self.surface);
        self.counters.rendered.fetch_add(1, Ordering::Relaxed);
        TickOutcome::Rendered
    }

    /// Replaces the live effect with the registry entry at `index`.
    ///
    /// The old instance is dropped before the new one is constructed. When a
    /// frame holds the guard past the timeout the switch is handed to the
    /// next tick.
    pub fn switch_to(&self, index: usize) -> SwitchOutcome {
        if index >= self.registry.len() || !self.is_active() {
            return SwitchOutcome::Ignored;
        }
        let Some(mut slot) = self.slot.try_lock_for(self.options.guard_timeout) else {
            self.deferred_switch.store(index, Ordering::Release);
            warn!(
                display = %self.display,
                index,
                timeout = ?self.options.guard_timeout,
                "frame still in flight; effect switch deferred to next tick"
            );
            return SwitchOutcome::Deferred;
        };
        if !self.is_active() {
            return SwitchOutcome::Ignored;
        }
        self.deferred_switch.store(NO_INDEX, Ordering::Release);

        self.set_phase(CoordinatorPhase::Switching);
        self.release_locked(&mut slot);

        let size = self.surface.drawable_size();
        if size.is_empty() {
            slot.pending_index = Some(index);
            self.set_phase(CoordinatorPhase::Empty);
            debug!(display = %self.display, index, "no drawable yet; switch completes on first frame");
            return SwitchOutcome::Pending;
        }

        self.construct_locked(&mut slot, index, size);
        if slot.live.is_some() {
            SwitchOutcome::Switched
        } else {
            SwitchOutcome::Unavailable
        }
    }

    /// Stops the coordinator and releases its effect. Idempotent.
    ///
    /// Ticks observe the cleared flag immediately; the guard is then taken
    /// with a bounded wait so an in-flight frame can finish. If that frame
    /// overruns the bound we log and wait it out, since releasing GPU
    /// resources under a running draw is never allowed.
    pub fn teardown(&self) {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        if !was_active && self.phase() == CoordinatorPhase::TornDown {
            return;
        }
        let mut slot = match self.slot.try_lock_for(self.options.guard_timeout) {
            Some(slot) => slot,
            None => {
                warn!(
                    display = %self.display,
                    timeout = ?self.options.guard_timeout,
                    "teardown waiting for an overrunning frame"
                );
                self.slot.lock()
            }
        };
        self.set_phase(CoordinatorPhase::TearingDown);
        self.release_locked(&mut slot);
        slot.pending_index = None;
        slot.pace_generation = None;
        slot.failed = None;
        self.deferred_switch.store(NO_INDEX, Ordering::Release);
        self.set_phase(CoordinatorPhase::TornDown);
        info!(display = %self.display, "surface coordinator torn down");
    }

    fn retry_suppressed(&self, slot: &EffectSlot<S>, index: usize, size: ViewportSize) -> bool {
        match slot.failed {
            Some(failed) if failed.index == index => {
                self.options.resize.classify(failed.size, size) != ResizeKind::Significant
            }
            _ => false,
        }
    }

    fn set_phase(&self, phase: CoordinatorPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn release_locked(&self, slot: &mut MutexGuard<'_, EffectSlot<S>>) {
        if let Some(old) = slot.live.take() {
            debug!(
                display = %self.display,
                effect = old.instance.name(),
                index = old.index,
                "releasing effect instance"
            );
            drop(old);
        }
        self.active_index.store(NO_INDEX, Ordering::Release);
    }

    fn construct_locked(
        &self,
        slot: &mut MutexGuard<'_, EffectSlot<S>>,
        index: usize,
        size: ViewportSize,
    ) {
        debug_assert!(slot.live.is_none());
        self.set_phase(CoordinatorPhase::Constructing);
        self.surface.reconfigure(size);

        let fallback = self.registry.fallback_index();
        let built = match self.build(index, size) {
            Ok(instance) => Some((index, instance)),
            Err(err) => {
                self.counters
                    .construction_failures
                    .fetch_add(1, Ordering::Relaxed);
                error!(
                    display = %self.display,
                    effect = self.effect_name(index),
                    error = %err,
                    "effect construction failed"
                );
                if index == fallback {
                    None
                } else {
                    match self.build(fallback, size) {
                        Ok(instance) => {
                            self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                display = %self.display,
                                fallback = self.effect_name(fallback),
                                "using fallback effect"
                            );
                            Some((fallback, instance))
                        }
                        Err(err) => {
                            self.counters
                                .construction_failures
                                .fetch_add(1, Ordering::Relaxed);
                            error!(
                                display = %self.display,
                                effect = self.effect_name(fallback),
                                error = %err,
                                "fallback effect construction failed"
                            );
                            None
                        }
                    }
                }
            }
        };

        match built {
            Some((index, instance)) => {
                self.preferred_visible
                    .store(instance.preferred_rate_when_visible(), Ordering::Relaxed);
                self.preferred_occluded
                    .store(instance.preferred_rate_when_occluded(), Ordering::Relaxed);
                info!(
                    display = %self.display,
                    effect = instance.name(),
                    size = %size,
                    "effect active"
                );
                slot.live = Some(LiveEffect { index, instance });
                slot.failed = None;
                slot.last_size = size;
                slot.pace_generation = None;
                self.active_index.store(index, Ordering::Release);
                self.counters.constructions.fetch_add(1, Ordering::Relaxed);
                self.set_phase(CoordinatorPhase::Active);
            }
            None => {
                slot.failed = Some(FailedBuild { index, size });
                self.active_index.store(NO_INDEX, Ordering::Release);
                self.set_phase(CoordinatorPhase::Empty);
            }
        }
    }

    /// Instantiates and sets up one effect. Panics from effect code are
    /// contained and reported as errors.
    fn build(&self, index: usize, size: ViewportSize) -> Result<Box<dyn Effect<S>>, EffectError> {
        let descriptor = self
            .registry
            .descriptor(index)
            .ok_or_else(|| EffectError::Setup(format!("no effect registered at index {index}")))?;
        let device = self.surface.device();
        let display = self.display;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut instance = descriptor.instantiate();
            instance.bind_display(display);
            instance.setup(device, size).map(|()| instance)
        }));
        match outcome {
            Ok(result) => result,
            Err(payload) => Err(EffectError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn resize_locked(&self, slot: &mut MutexGuard<'_, EffectSlot<S>>, size: ViewportSize) {
        let kind = self.options.resize.classify(slot.last_size, size);
        let previous = slot.last_size;
        slot.last_size = size;
        let Some(live) = slot.live.as_mut() else {
            return;
        };
        match kind {
            ResizeKind::Unchanged => {}
            ResizeKind::Minor => {
                self.surface.reconfigure(size);
                live.instance.update_viewport_size(size);
            }
            ResizeKind::Significant => {
                debug!(
                    display = %self.display,
                    from = %previous,
                    to = %size,
                    "significant resize"
                );
                self.surface.reconfigure(size);
                live.instance.handle_significant_resize(size);
            }
        }
    }

    fn sync_pace_locked(&self, slot: &mut MutexGuard<'_, EffectSlot<S>>) {
        let (pace, generation) = self.pace.load();
        if slot.pace_generation == Some(generation) {
            return;
        }
        slot.pace_generation = Some(generation);
        if let Some(live) = slot.live.as_mut() {
            trace!(display = %self.display, rate = pace.rate, tier = ?pace.tier, "forwarding update rate");
            live.instance.set_update_rate(pace.rate);
        }
    }

    fn effect_name(&self, index: usize) -> &'static str {
        self.registry
            .descriptor(index)
            .map_or("<unknown>", |descriptor| descriptor.stable_name)
    }
}

impl<S: RenderSurface> Drop for SurfaceCoordinator<S> {
    fn drop(&mut self) {
        if self.phase() != CoordinatorPhase::TornDown {
            self.teardown();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EffectRegistry;
    use crate::testing::{
        behaving_descriptor, counting_descriptor, descriptors, draw_gate, EffectEvent,
        FakeSurface, InstanceCounter, SetupBehaviour,
    };
    use pacing::Pace;
    use std::thread;

    const FULL_HD: ViewportSize = ViewportSize::new(1920, 1080);

    fn visible(rate: f64) -> Pace {
        Pace {
            rate,
            tier: PacingTier::Visible,
        }
    }

    fn coordinator(
        registry: EffectRegistry<FakeSurface>,
        surface: Arc<FakeSurface>,
    ) -> SurfaceCoordinator<FakeSurface> {
        SurfaceCoordinator::new(
            DisplayId(1),
            surface,
            Arc::new(registry),
            Arc::new(PaceCell::new(visible(30.0))),
            CoordinatorOptions {
                guard_timeout: Duration::from_millis(20),
                ..CoordinatorOptions::default()
            },
        )
    }

    #[test]
    fn first_tick_builds_selected_effect() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(4, &counter)).unwrap();
        let coordinator = coordinator(registry, FakeSurface::new(FULL_HD));

        assert_eq!(coordinator.phase(), CoordinatorPhase::Empty);
        assert_eq!(counter.created(), 0);
        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Rendered);
        assert_eq!(coordinator.phase(), CoordinatorPhase::Active);
        assert_eq!(coordinator.active_index(), Some(2));
        assert_eq!(counter.live(), 1);
        assert_eq!(coordinator.stats().constructions, 1);
        assert_eq!(
            counter.events()[..3],
            [
                EffectEvent::Setup("effect_2", FULL_HD),
                EffectEvent::Rate("effect_2", 30.0),
                EffectEvent::Draw("effect_2"),
            ]
        );
    }

    #[test]
    fn zero_sized_surface_defers_construction() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let surface = FakeSurface::new(ViewportSize::new(0, 0));
        let coordinator = coordinator(registry, Arc::clone(&surface));

        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::NoDrawable);
        assert_eq!(counter.created(), 0);
        surface.set_size(FULL_HD);
        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Rendered);
    }

    #[test]
    fn switch_releases_old_instance_before_building_new_one() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(4, &counter)).unwrap();
        let coordinator = coordinator(registry, FakeSurface::new(FULL_HD));
        coordinator.tick(Instant::now());

        assert_eq!(coordinator.switch_to(0), SwitchOutcome::Switched);
        assert_eq!(coordinator.active_index(), Some(0));
        assert_eq!(counter.live(), 1);
        assert_eq!(counter.peak(), 1);
        let events = counter.events();
        let dropped = events
            .iter()
            .position(|event| *event == EffectEvent::Dropped("effect_2"))
            .unwrap();
        let built = events
            .iter()
            .position(|event| *event == EffectEvent::Setup("effect_0", FULL_HD))
            .unwrap();
        assert!(dropped < built);
    }

    #[test]
    fn switch_out_of_range_is_ignored() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let coordinator = coordinator(registry, FakeSurface::new(FULL_HD));
        coordinator.tick(Instant::now());
        assert_eq!(coordinator.switch_to(3), SwitchOutcome::Ignored);
        assert_eq!(coordinator.active_index(), Some(2));
    }

    #[test]
    fn switch_without_drawable_completes_on_first_frame() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let surface = FakeSurface::new(FULL_HD);
        let coordinator = coordinator(registry, Arc::clone(&surface));
        coordinator.tick(Instant::now());

        surface.set_size(ViewportSize::new(0, 0));
        assert_eq!(coordinator.switch_to(1), SwitchOutcome::Pending);
        assert_eq!(counter.live(), 0);
        assert_eq!(coordinator.phase(), CoordinatorPhase::Empty);

        surface.set_size(FULL_HD);
        coordinator.tick(Instant::now());
        assert_eq!(coordinator.active_index(), Some(1));
    }

    #[test]
    fn failing_setup_falls_back_to_first_effect() {
        let counter = InstanceCounter::default();
        let list = vec![
            counting_descriptor("safe", None, &counter),
            counting_descriptor("other", None, &counter),
            behaving_descriptor("broken", None, &counter, SetupBehaviour::Fail, None),
        ];
        let registry = EffectRegistry::register(list).unwrap();
        let coordinator = coordinator(registry, FakeSurface::new(FULL_HD));

        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Rendered);
        assert_eq!(coordinator.active_index(), Some(0));
        assert_eq!(counter.live(), 1);
        let stats = coordinator.stats();
        assert_eq!(stats.construction_failures, 1);
        assert_eq!(stats.fallbacks, 1);
    }

    #[test]
    fn panicking_setup_is_contained() {
        let counter = InstanceCounter::default();
        let list = vec![
            counting_descriptor("safe", None, &counter),
            behaving_descriptor("explodes", None, &counter, SetupBehaviour::Panic, None),
        ];
        let registry = EffectRegistry::register(list).unwrap();
        registry.select(1);
        let coordinator = coordinator(registry, FakeSurface::new(FULL_HD));

        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Rendered);
        assert_eq!(coordinator.active_index(), Some(0));
        assert_eq!(counter.live(), 1);
    }

    #[test]
    fn failing_fallback_leaves_coordinator_empty() {
        let counter = InstanceCounter::default();
        let list = vec![
            behaving_descriptor("broken_a", None, &counter, SetupBehaviour::Fail, None),
            behaving_descriptor("broken_b", None, &counter, SetupBehaviour::Fail, None),
        ];
        let registry = EffectRegistry::register(list).unwrap();
        let coordinator = coordinator(registry, FakeSurface::new(FULL_HD));

        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Unavailable);
        assert_eq!(coordinator.phase(), CoordinatorPhase::Empty);
        assert_eq!(coordinator.active_index(), None);
        assert_eq!(counter.live(), 0);
        assert_eq!(coordinator.stats().construction_failures, 2);
    }

    #[test]
    fn unbuildable_selection_is_not_retried_every_frame() {
        let counter = InstanceCounter::default();
        let list = vec![
            behaving_descriptor("broken_a", None, &counter, SetupBehaviour::Fail, None),
            behaving_descriptor("broken_b", None, &counter, SetupBehaviour::Fail, None),
            counting_descriptor("healthy", None, &counter),
        ];
        let registry = EffectRegistry::register(list).unwrap();
        registry.select(1);
        let registry = Arc::new(registry);
        let surface = FakeSurface::new(FULL_HD);
        let coordinator = SurfaceCoordinator::new(
            DisplayId(1),
            Arc::clone(&surface),
            Arc::clone(&registry),
            Arc::new(PaceCell::new(visible(30.0))),
            CoordinatorOptions::default(),
        );

        for _ in 0..60 {
            assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Unavailable);
        }
        assert_eq!(coordinator.stats().construction_failures, 2);
        assert_eq!(counter.created(), 2);

        // a minor resize keeps the backoff, a significant one retries
        surface.set_size(ViewportSize::new(1921, 1080));
        coordinator.tick(Instant::now());
        assert_eq!(counter.created(), 2);
        surface.set_size(ViewportSize::new(2560, 1440));
        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Unavailable);
        assert_eq!(coordinator.stats().construction_failures, 4);

        registry.select(2);
        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Rendered);
        assert_eq!(coordinator.active_index(), Some(2));
    }

    #[test]
    fn resizes_are_classified_before_reaching_the_effect() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let surface = FakeSurface::new(FULL_HD);
        let coordinator = coordinator(registry, Arc::clone(&surface));
        coordinator.tick(Instant::now());

        surface.set_size(ViewportSize::new(1921, 1080));
        coordinator.tick(Instant::now());
        surface.set_size(ViewportSize::new(2560, 1440));
        coordinator.tick(Instant::now());
        coordinator.tick(Instant::now());

        let resizes: Vec<_> = counter
            .events()
            .into_iter()
            .filter(|event| {
                matches!(event, EffectEvent::Minor(..) | EffectEvent::Significant(..))
            })
            .collect();
        assert_eq!(
            resizes,
            vec![
                EffectEvent::Minor("effect_2", ViewportSize::new(1921, 1080)),
                EffectEvent::Significant("effect_2", ViewportSize::new(2560, 1440)),
            ]
        );
    }

    #[test]
    fn pace_changes_reach_the_effect_once() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let pace = Arc::new(PaceCell::new(visible(30.0)));
        let coordinator = SurfaceCoordinator::new(
            DisplayId(7),
            FakeSurface::new(FULL_HD),
            Arc::new(registry),
            Arc::clone(&pace),
            CoordinatorOptions::default(),
        );
        coordinator.tick(Instant::now());
        pace.set(Pace {
            rate: 10.0,
            tier: PacingTier::Occluded,
        });
        coordinator.tick(Instant::now());
        coordinator.tick(Instant::now());

        let rates: Vec<_> = counter
            .events()
            .into_iter()
            .filter(|event| matches!(event, EffectEvent::Rate(..)))
            .collect();
        assert_eq!(
            rates,
            vec![
                EffectEvent::Rate("effect_2", 30.0),
                EffectEvent::Rate("effect_2", 10.0)
            ]
        );
        assert_eq!(coordinator.frame_interval(), Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn contended_tick_drops_the_frame_and_switch_is_deferred() {
        let counter = InstanceCounter::default();
        let (gate, handle) = draw_gate();
        let list = vec![
            counting_descriptor("plain", None, &counter),
            behaving_descriptor("slow", None, &counter, SetupBehaviour::Succeed, Some(gate)),
        ];
        let registry = EffectRegistry::register(list).unwrap();
        registry.select(1);
        let coordinator = Arc::new(coordinator(registry, FakeSurface::new(FULL_HD)));

        let worker = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.tick(Instant::now()))
        };
        handle.entered.recv().unwrap();

        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Contended);
        assert_eq!(coordinator.stats().contended, 1);
        assert_eq!(coordinator.switch_to(0), SwitchOutcome::Deferred);
        assert_eq!(coordinator.active_index(), Some(1));

        handle.release.send(()).unwrap();
        assert_eq!(worker.join().unwrap(), TickOutcome::Rendered);

        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Rendered);
        assert_eq!(coordinator.active_index(), Some(0));
        assert_eq!(counter.peak(), 1);
    }

    #[test]
    fn teardown_waits_for_in_flight_frame() {
        let counter = InstanceCounter::default();
        let (gate, handle) = draw_gate();
        let list = vec![behaving_descriptor(
            "slow",
            None,
            &counter,
            SetupBehaviour::Succeed,
            Some(gate),
        )];
        let registry = EffectRegistry::register(list).unwrap();
        let coordinator = Arc::new(coordinator(registry, FakeSurface::new(FULL_HD)));

        let worker = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.tick(Instant::now()))
        };
        handle.entered.recv().unwrap();

        let releaser = {
            let release = handle.release.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                release.send(()).unwrap();
            })
        };
        coordinator.teardown();
        // the instance is only released once the draw returned
        assert_eq!(counter.live(), 0);
        assert_eq!(coordinator.phase(), CoordinatorPhase::TornDown);
        assert_eq!(worker.join().unwrap(), TickOutcome::Rendered);
        releaser.join().unwrap();

        assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Inactive);
        assert_eq!(coordinator.switch_to(0), SwitchOutcome::Ignored);
        coordinator.teardown();
        assert_eq!(counter.created(), 1);
    }

    #[test]
    fn ticks_after_teardown_never_build() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(3, &counter)).unwrap();
        let coordinator = coordinator(registry, FakeSurface::new(FULL_HD));
        coordinator.teardown();
        for _ in 0..5 {
            assert_eq!(coordinator.tick(Instant::now()), TickOutcome::Inactive);
        }
        assert_eq!(counter.created(), 0);
    }

    #[test]
    fn concurrent_ticks_and_switches_keep_one_instance() {
        let counter = InstanceCounter::default();
        let registry = EffectRegistry::register(descriptors(5, &counter)).unwrap();
        let coordinator = Arc::new(coordinator(registry, FakeSurface::new(FULL_HD)));

        let ticker = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                for _ in 0..500 {
                    coordinator.tick(Instant::now());
                }
            })
        };
        for round in 0..200 {
            coordinator.switch_to(round % 5);
        }
        ticker.join().unwrap();
        coordinator.teardown();

        assert_eq!(counter.peak(), 1);
        assert_eq!(counter.live(), 0);
    }
}
