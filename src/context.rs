//! Shared application context.
//!
//! The error slot and the progress registry are created once per process and
//! handed to every component at construction.

use std::sync::{Arc, Mutex};

use crate::error::{DataError, Result};
use crate::progress::ProgressRegistry;

/// Single current-error slot, overwritten by each new error.
#[derive(Debug, Clone, Default)]
pub struct ErrorChannel {
    current: Arc<Mutex<Option<String>>>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(error = %message, "Error published");
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
    }

    /// Publish `err` and hand it back, for use in `map_err`.
    pub fn report(&self, err: DataError) -> DataError {
        self.set(err.to_string());
        err
    }

    /// Mirror transport-class failures of `result` into the channel; other
    /// errors go back to the caller untouched.
    pub fn track<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| if e.is_transport() { self.report(e) } else { e })
    }

    pub fn current(&self) -> Option<String> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Take the current error, leaving the slot empty.
    pub fn take(&self) -> Option<String> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppContext {
    pub errors: ErrorChannel,
    pub progress: ProgressRegistry,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }
}
