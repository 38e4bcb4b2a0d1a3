use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cell::SelectionCell;
use crate::effect::{EffectDescriptor, RenderSurface};

/// Index selected at startup when neither the environment nor the config
/// names an effect.
pub const DEFAULT_EFFECT_INDEX: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("effect registry requires at least one descriptor")]
    Empty,
    #[error("duplicate effect name '{0}'")]
    DuplicateName(String),
}

/// Ordered, immutable list of effect descriptors plus the process-wide
/// selection.
///
/// The selection lives in a [`SelectionCell`]; display managers subscribe to
/// it to hot-swap their coordinators when it changes.
pub struct EffectRegistry<S: RenderSurface> {
    descriptors: Vec<EffectDescriptor<S>>,
    selection: Arc<SelectionCell>,
    fallback: usize,
}

impl<S: RenderSurface> fmt::Debug for EffectRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("descriptors", &self.descriptors)
            .field("selected", &self.selection.get())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl<S: RenderSurface> EffectRegistry<S> {
    /// Builds the registry. The selection starts at the default index,
    /// clamped to the last descriptor; the fallback is the first descriptor.
    pub fn register(descriptors: Vec<EffectDescriptor<S>>) -> Result<Self, RegistryError> {
        if descriptors.is_empty() {
            return Err(RegistryError::Empty);
        }
        for (index, descriptor) in descriptors.iter().enumerate() {
            let clash = descriptors[..index].iter().any(|earlier| {
                earlier.matches(descriptor.stable_name)
                    || descriptor.alias.is_some_and(|alias| earlier.matches(alias))
            });
            if clash {
                return Err(RegistryError::DuplicateName(
                    descriptor.stable_name.to_string(),
                ));
            }
        }
        let initial = DEFAULT_EFFECT_INDEX.min(descriptors.len() - 1);
        Ok(Self {
            descriptors,
            selection: Arc::new(SelectionCell::new(initial)),
            fallback: 0,
        })
    }

    /// Overrides the effect constructed when the selected one fails setup.
    pub fn with_fallback(mut self, index: usize) -> Self {
        self.fallback = index.min(self.descriptors.len() - 1);
        self
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[EffectDescriptor<S>] {
        &self.descriptors
    }

    pub fn descriptor(&self, index: usize) -> Option<&EffectDescriptor<S>> {
        self.descriptors.get(index)
    }

    /// Position of the descriptor whose stable name or alias matches `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|descriptor| descriptor.matches(name))
    }

    pub fn selection(&self) -> &Arc<SelectionCell> {
        &self.selection
    }

    pub fn selected(&self) -> usize {
        self.selection.get()
    }

    pub fn selected_descriptor(&self) -> &EffectDescriptor<S> {
        &self.descriptors[self.selected()]
    }

    pub fn fallback_index(&self) -> usize {
        self.fallback
    }

    /// Updates the selection and notifies observers. Out-of-range indices are
    /// ignored without notification.
    pub fn select(&self, index: usize) -> bool {
        let Some(descriptor) = self.descriptors.get(index) else {
            warn!(
                index,
                available = self.descriptors.len(),
                "ignoring out-of-range effect selection"
            );
            return false;
        };
        info!(index, effect = descriptor.stable_name, "effect selected");
        self.selection.set(index);
        true
    }

    pub fn select_by_name(&self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => self.select(index),
            None => {
                warn!(name, "ignoring selection of unknown effect");
                false
            }
        }
    }

    /// Resolves a startup hint (stable name, alias or index) without touching
    /// the selection. Unknown hints are logged and `default_index` is used,
    /// clamped into range.
    pub fn resolve_hint(&self, hint: Option<&str>, default_index: usize) -> usize {
        let fallback = default_index.min(self.descriptors.len() - 1);
        let Some(hint) = hint.map(str::trim).filter(|hint| !hint.is_empty()) else {
            return fallback;
        };
        if let Some(index) = self.position(hint) {
            return index;
        }
        if let Ok(index) = hint.parse::<usize>() {
            if index < self.descriptors.len() {
                return index;
            }
        }
        let known: Vec<&str> = self
            .descriptors
            .iter()
            .map(|descriptor| descriptor.alias.unwrap_or(descriptor.stable_name))
            .collect();
        warn!(
            hint,
            known = %known.join(", "),
            default = self.descriptors[fallback].stable_name,
            "unknown effect requested; using default"
        );
        fallback
    }

    /// Resolves `hint` and stores the result as the current selection.
    pub fn apply_startup_hint(&self, hint: Option<&str>, default_index: usize) -> usize {
        let index = self.resolve_hint(hint, default_index);
        debug!(
            index,
            effect = self.descriptors[index].stable_name,
            "initial effect resolved"
        );
        self.selection.set(index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{counting_descriptor, descriptors, FakeSurface, InstanceCounter};
    use parking_lot::Mutex;

    fn registry(count: usize) -> EffectRegistry<FakeSurface> {
        EffectRegistry::register(descriptors(count, &InstanceCounter::default())).unwrap()
    }

    #[test]
    fn empty_registry_is_rejected() {
        let err = EffectRegistry::<FakeSurface>::register(Vec::new()).unwrap_err();
        assert!(matches!(err, RegistryError::Empty));
    }

    #[test]
    fn debug_lists_descriptors_and_selection() {
        let rendered = format!("{:?}", registry(3));
        assert!(rendered.contains("effect_0"));
        assert!(rendered.contains("selected: 2"));
        assert!(rendered.contains("fallback: 0"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let counter = InstanceCounter::default();
        let list = vec![
            counting_descriptor("plasma", Some("p"), &counter),
            counting_descriptor("pulse", Some("P"), &counter),
        ];
        let err = EffectRegistry::register(list).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "pulse"));
    }

    #[test]
    fn default_selection_is_clamped() {
        assert_eq!(registry(6).selected(), DEFAULT_EFFECT_INDEX);
        assert_eq!(registry(2).selected(), 1);
        assert_eq!(registry(1).selected(), 0);
    }

    #[test]
    fn out_of_range_select_is_a_silent_no_op() {
        let registry = registry(3);
        let notified = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notified);
        registry.selection().subscribe(move |index| sink.lock().push(index));

        assert!(!registry.select(3));
        assert!(!registry.select(usize::MAX));
        assert_eq!(registry.selected(), 2);
        assert!(notified.lock().is_empty());

        assert!(registry.select(0));
        assert_eq!(*notified.lock(), vec![0]);
    }

    #[test]
    fn reselecting_the_same_index_still_notifies() {
        let registry = registry(3);
        let generation = registry.selection().generation();
        assert!(registry.select(2));
        assert_eq!(registry.selection().generation(), generation + 1);
    }

    #[test]
    fn select_by_name_accepts_aliases_case_insensitively() {
        let registry = registry(4);
        assert!(registry.select_by_name("EFFECT_1"));
        assert_eq!(registry.selected(), 1);
        assert!(registry.select_by_name("e3"));
        assert_eq!(registry.selected(), 3);
        assert!(!registry.select_by_name("missing"));
        assert_eq!(registry.selected(), 3);
    }

    #[test]
    fn startup_hint_resolution() {
        let registry = registry(4);
        assert_eq!(registry.resolve_hint(None, DEFAULT_EFFECT_INDEX), 2);
        assert_eq!(registry.resolve_hint(Some("  "), 1), 1);
        assert_eq!(registry.resolve_hint(Some("e0"), 2), 0);
        assert_eq!(registry.resolve_hint(Some("3"), 2), 3);
        assert_eq!(registry.resolve_hint(Some("nonsense"), 2), 2);
        assert_eq!(registry.resolve_hint(Some("nonsense"), 99), 3);
        assert_eq!(registry.resolve_hint(Some("17"), 0), 0);

        assert_eq!(registry.apply_startup_hint(Some("effect_1"), 2), 1);
        assert_eq!(registry.selected(), 1);
    }

    #[test]
    fn fallback_is_clamped() {
        let registry = registry(3).with_fallback(10);
        assert_eq!(registry.fallback_index(), 2);
    }
}
