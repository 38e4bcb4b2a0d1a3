//! Observable shared values.
//!
//! A [`WatchCell`] holds a small `Copy` value that many threads read on their
//! hot path and that occasionally changes. Readers either poll the value
//! together with its generation counter (cheap, lock-free after the read
//! lock) or subscribe a callback that runs on the writer's thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pacing::Pace;
use parking_lot::{Mutex, RwLock};

pub type ObserverId = u64;

type Observer<T> = Arc<dyn Fn(T) + Send + Sync>;

pub struct WatchCell<T> {
    value: RwLock<T>,
    generation: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Observer<T>)>>,
    next_observer: AtomicU64,
}

/// Currently selected index into the effect registry.
pub type SelectionCell = WatchCell<usize>;

/// Pace published by the frame-pacing policy.
pub type PaceCell = WatchCell<Pace>;

impl<T: Copy + Send + Sync + 'static> WatchCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            generation: AtomicU64::new(0),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    pub fn get(&self) -> T {
        *self.value.read()
    }

    /// Number of writes since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Value and generation read atomically with respect to [`WatchCell::set`].
    pub fn load(&self) -> (T, u64) {
        let guard = self.value.read();
        (*guard, self.generation.load(Ordering::Acquire))
    }

    /// Stores `value`, bumps the generation and notifies every observer.
    ///
    /// Observers run on the calling thread after the value lock is released,
    /// so they may read the cell or subscribe further observers.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.value.write();
            *guard = value;
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        let observers: Vec<Observer<T>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(value);
        }
    }

    pub fn subscribe(&self, observer: impl Fn(T) + Send + Sync + 'static) -> ObserverId {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }
}

impl<T: Copy + Default + Send + Sync + 'static> Default for WatchCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
