//! Core Components
//!
//! Infrastructure shared by the flows: HTTP transport, state generation and
//! browser launch.

pub mod browser;
pub mod state;
pub mod transport;

pub use browser::*;
pub use state::*;
pub use transport::*;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mock's bookkeeping, ignoring poisoning from a panicked test thread.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
