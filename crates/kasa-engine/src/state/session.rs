//! # Session State
//!
//! The terminal's [`CartSessionManager`] behind a mutex.
//!
//! Ledger reads happen outside the lock; the closure passed to
//! [`SessionState::with_mut`] only applies the already-fetched answer, so
//! the lock is never held across an `.await`.

use std::sync::{Arc, Mutex, PoisonError};

use kasa_core::CartSessionManager;

#[derive(Debug, Clone)]
pub struct SessionState {
    sessions: Arc<Mutex<CartSessionManager>>,
}

impl SessionState {
    pub fn new(manager: CartSessionManager) -> Self {
        SessionState {
            sessions: Arc::new(Mutex::new(manager)),
        }
    }

    /// Executes a function with read access to the session.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let tab_id = state.with(|s| s.active_tab_id().to_string());
    /// ```
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&CartSessionManager) -> R,
    {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        f(&sessions)
    }

    /// Executes a function with write access to the session.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// state.with_mut(|s| s.park(Some("customer fetching cash")))?;
    /// ```
    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut CartSessionManager) -> R,
    {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut sessions)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::new(CartSessionManager::new())
    }
}
