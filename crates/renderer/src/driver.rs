use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::coordinator::{SurfaceCoordinator, TickOutcome};
use crate::effect::RenderSurface;
use crate::types::DisplayId;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Dedicated thread ticking one coordinator at its frame interval.
pub struct FrameDriver {
    display: DisplayId,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FrameDriver {
    pub fn spawn<S: RenderSurface>(coordinator: Arc<SurfaceCoordinator<S>>) -> io::Result<Self> {
        let display = coordinator.display();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(format!("frames-{display}"))
            .spawn(move || {
                let mut next = Instant::now();
                let mut report = FrameReport::new(next);
                loop {
                    match stop_rx.recv_deadline(next) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    let now = Instant::now();
                    let outcome = coordinator.tick(now);
                    if outcome == TickOutcome::Inactive {
                        break;
                    }
                    report.record(&coordinator, outcome, now);

                    let interval = coordinator.frame_interval();
                    next += interval;
                    if next < now {
                        // skip missed frames instead of bursting to catch up
                        next = now + interval;
                    }
                }
                debug!(display = %coordinator.display(), "frame driver exited");
            })?;
        Ok(Self {
            display,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn display(&self) -> DisplayId {
        self.display
    }

    /// Signals the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(display = %self.display, "frame driver thread panicked");
            }
        }
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct FrameReport {
    since: Instant,
    rendered: u64,
    dropped: u64,
}

impl FrameReport {
    fn new(now: Instant) -> Self {
        Self {
            since: now,
            rendered: 0,
            dropped: 0,
        }
    }

    fn record<S: RenderSurface>(
        &mut self,
        coordinator: &SurfaceCoordinator<S>,
        outcome: TickOutcome,
        now: Instant,
    ) {
        match outcome {
            TickOutcome::Rendered => self.rendered += 1,
            TickOutcome::Contended => self.dropped += 1,
            _ => {}
        }
        let elapsed = now.saturating_duration_since(self.since);
        if elapsed < STATS_INTERVAL {
            return;
        }
        debug!(
            display = %coordinator.display(),
            fps = (self.rendered as f64 / elapsed.as_secs_f64()).round(),
            dropped = self.dropped,
            phase = ?coordinator.phase(),
            "render stats"
        );
        *self = Self::new(now);
    }
}
