//! Live-adjustable parameters shared between the preview producer and the
//! HTTP handlers.

use std::sync::{PoisonError, RwLock};

use crate::config::{validate_brightness, validate_contrast, Adjustment};
use crate::error::Result;

/// Lock-guarded [`Adjustment`] with validated setters.
#[derive(Debug, Default)]
pub struct ParameterStore {
    inner: RwLock<Adjustment>,
}

impl ParameterStore {
    /// Store seeded with `initial`.
    pub fn new(initial: Adjustment) -> Result<Self> {
        initial.validate()?;
        Ok(Self {
            inner: RwLock::new(initial),
        })
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> Adjustment {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settings the producer should apply: the night preset replaces the
    /// sliders while night mode is on.
    pub fn effective(&self) -> Adjustment {
        let current = self.snapshot();
        if current.night_mode {
            Adjustment::NIGHT_PRESET
        } else {
            current
        }
    }

    /// Update brightness. Out-of-range values are rejected.
    pub fn set_brightness(&self, brightness: i32) -> Result<Adjustment> {
        validate_brightness(brightness)?;
        Ok(self.update(|adj| adj.brightness = brightness))
    }

    /// Update contrast. Out-of-range values are rejected.
    pub fn set_contrast(&self, contrast: f32) -> Result<Adjustment> {
        validate_contrast(contrast)?;
        Ok(self.update(|adj| adj.contrast = contrast))
    }

    /// Toggle night mode.
    pub fn set_night_mode(&self, enabled: bool) -> Adjustment {
        self.update(|adj| adj.night_mode = enabled)
    }

    fn update(&self, apply: impl FnOnce(&mut Adjustment)) -> Adjustment {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut *guard);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_setters_validate() {
        let store = ParameterStore::default();
        assert_eq!(store.set_brightness(25).expect("valid").brightness, 25);
        assert!(store.set_brightness(75).is_err());
        assert!(store.set_contrast(3.0).is_err());
        assert_eq!(store.snapshot().brightness, 25);
        assert!((store.snapshot().contrast - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_effective_uses_night_preset() {
        let store = ParameterStore::default();
        store.set_brightness(10).expect("valid");
        assert_eq!(store.effective().brightness, 10);
        store.set_night_mode(true);
        assert_eq!(store.effective(), Adjustment::NIGHT_PRESET);
        store.set_night_mode(false);
        assert_eq!(store.effective().brightness, 10);
    }

    #[test]
    fn test_concurrent_updates_are_never_torn() {
        let store = Arc::new(ParameterStore::default());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for step in 0..100 {
                        let _ = store.set_brightness((i * 10 + step) % 50);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().expect("writer thread");
        }
        assert!(store.snapshot().validate().is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_seed() {
        assert!(ParameterStore::new(Adjustment {
            brightness: 99,
            ..Adjustment::IDENTITY
        })
        .is_err());
    }
}
