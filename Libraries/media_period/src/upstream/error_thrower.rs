use parking_lot::Mutex;
use tracing::warn;

use crate::error::LoadError;

/// Surfaces an error captured earlier by an asynchronous loader, without blocking.
pub trait LoaderErrorThrower: Send + Sync {
    fn maybe_throw_error(&self) -> Result<(), LoadError>;
}

/// A loader that never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoErrors;

impl LoaderErrorThrower for NoErrors {
    fn maybe_throw_error(&self) -> Result<(), LoadError> {
        Ok(())
    }
}

/// Holds the most recent manifest loading error until the manifest loader clears it.
///
/// The manifest fetcher writes into the slot from its own task; the period
/// only relays what is in it.
#[derive(Debug, Default)]
pub struct ManifestErrorSlot {
    pending: Mutex<Option<LoadError>>,
}

impl ManifestErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, error: LoadError) {
        warn!("Manifest loader reported: {}", error);
        *self.pending.lock() = Some(error);
    }

    /// Clears the pending error, e.g. after a successful retry.
    pub fn clear(&self) {
        self.pending.lock().take();
    }
}

impl LoaderErrorThrower for ManifestErrorSlot {
    fn maybe_throw_error(&self) -> Result<(), LoadError> {
        match self.pending.lock().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
