//! Filter-change debouncer.
//!
//! A synchronous state machine: callers pass the current [`Instant`] in and
//! drive the timer themselves (the service sleeps until
//! [`Debouncer::next_deadline`]). Keeping time out of the struct lets tests
//! step through a burst of edits without a runtime.
//!
//! Rules:
//! - A fingerprint equal to the committed one never fires, and cancels any
//!   pending timer.
//! - The first submission (nothing committed yet) fires immediately.
//! - An `immediate` submission fires now and cancels the pending timer.
//! - Anything else (re)arms the timer; only the last payload of a burst
//!   survives to the deadline.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use tally_core::{defaults, Fingerprint};

/// Outcome of [`Debouncer::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceDecision<T> {
    /// Fingerprint already committed; nothing to do.
    Skip,
    /// Fire now. The fingerprint has been committed.
    Fire(Fingerprint, T),
    /// Timer (re)armed for `deadline`.
    Armed { deadline: Instant },
}

#[derive(Debug, Clone)]
struct PendingFire<T> {
    fingerprint: Fingerprint,
    payload: T,
    deadline: Instant,
}

/// Trailing-edge debouncer keyed by filter fingerprint.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    committed: Option<Fingerprint>,
    pending: Option<PendingFire<T>>,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(Duration::from_millis(defaults::FILTER_DEBOUNCE_MS))
    }
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            committed: None,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Fingerprint of the last fetch that fired.
    pub fn committed(&self) -> Option<&Fingerprint> {
        self.committed.as_ref()
    }

    /// Fingerprint waiting on the timer, if any.
    pub fn pending(&self) -> Option<&Fingerprint> {
        self.pending.as_ref().map(|p| &p.fingerprint)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Offer a new filter state.
    pub fn submit(
        &mut self,
        fingerprint: Fingerprint,
        payload: T,
        now: Instant,
        immediate: bool,
    ) -> DebounceDecision<T> {
        if self.committed.as_ref() == Some(&fingerprint) {
            if self.pending.take().is_some() {
                trace!(
                    fingerprint = %fingerprint.short(),
                    "Returned to committed filter, timer cancelled"
                );
            }
            return DebounceDecision::Skip;
        }

        if self.committed.is_none() || immediate {
            self.pending = None;
            self.committed = Some(fingerprint.clone());
            return DebounceDecision::Fire(fingerprint, payload);
        }

        let deadline = now + self.window;
        trace!(fingerprint = %fingerprint.short(), "Debounce timer armed");
        self.pending = Some(PendingFire {
            fingerprint,
            payload,
            deadline,
        });
        DebounceDecision::Armed { deadline }
    }

    /// Fire the pending payload if its deadline has passed.
    pub fn poll_due(&mut self, now: Instant) -> Option<(Fingerprint, T)> {
        match &self.pending {
            Some(p) if p.deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Fire the pending payload now, regardless of its deadline.
    pub fn flush(&mut self) -> Option<(Fingerprint, T)> {
        let pending = self.pending.take()?;
        self.committed = Some(pending.fingerprint.clone());
        Some((pending.fingerprint, pending.payload))
    }

    /// Commit `fingerprint` unconditionally, dropping any pending timer.
    ///
    /// Used for explicit refetches, which bypass the debounce window.
    pub fn force(&mut self, fingerprint: Fingerprint) {
        self.pending = None;
        self.committed = Some(fingerprint);
    }

    /// Drop the pending timer without firing.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Forget everything; the next submission fires immediately.
    pub fn reset(&mut self) {
        self.pending = None;
        self.committed = None;
    }
}
