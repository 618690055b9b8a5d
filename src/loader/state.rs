//! Loader lifecycle state
//!
//! `Uninitialized -> Initializing -> Initialized -> (Registering -> Registered) -> Destroyed`
//!
//! Ordinary transitions are compare-and-set against an expected phase. Only
//! retry resets and destruction use [`LoadingState::force_transition`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{MetaDataError, Result};
use crate::sync;

/// Lifecycle phase of a loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Uninitialized,
    Initializing,
    Initialized,
    Registering,
    Registered,
    Destroyed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Uninitialized => "UNINITIALIZED",
            Phase::Initializing => "INITIALIZING",
            Phase::Initialized => "INITIALIZED",
            Phase::Registering => "REGISTERING",
            Phase::Registered => "REGISTERED",
            Phase::Destroyed => "DESTROYED",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Phase::Uninitialized => "Loader created but not initialized",
            Phase::Initializing => "Loader initialization in progress",
            Phase::Initialized => "Loader initialized but not registered",
            Phase::Registering => "Loader registration in progress",
            Phase::Registered => "Loader fully initialized and registered",
            Phase::Destroyed => "Loader has been destroyed",
        }
    }

    /// Phases in which the metadata graph may be queried
    pub fn is_usable(&self) -> bool {
        matches!(self, Phase::Initialized | Phase::Registered)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Phase::Initializing | Phase::Registering)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    last_error: Option<Arc<MetaDataError>>,
    error_phase: Option<Phase>,
    last_transition_at: DateTime<Utc>,
}

/// Phase, last error and timing of one loader
#[derive(Debug)]
pub struct LoadingState {
    subject: String,
    inner: Mutex<Inner>,
    version: AtomicU64,
    created_at: DateTime<Utc>,
    started: Instant,
}

/// Serializable point-in-time view of a [`LoadingState`]
#[derive(Debug, Clone, Serialize)]
pub struct LoadingSnapshot {
    pub phase: Phase,
    pub last_error: Option<String>,
    pub error_phase: Option<Phase>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
    pub elapsed_ms: u128,
}

impl LoadingState {
    pub fn new(subject: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            subject: subject.into(),
            inner: Mutex::new(Inner {
                phase: Phase::Uninitialized,
                last_error: None,
                error_phase: None,
                last_transition_at: now,
            }),
            version: AtomicU64::new(0),
            created_at: now,
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        sync::lock(&self.inner).phase
    }

    /// Atomically move `expected -> next`; clears the last error on success
    pub fn try_transition(&self, expected: Phase, next: Phase) -> bool {
        self.transition(expected, next).is_ok()
    }

    /// Compare-and-set that reports the phase actually found
    pub fn transition(&self, expected: Phase, next: Phase) -> Result<()> {
        let mut inner = sync::lock(&self.inner);
        if inner.phase != expected {
            return Err(MetaDataError::IllegalTransition {
                subject: self.subject.clone(),
                expected,
                current: inner.phase,
                requested: next,
            });
        }
        inner.phase = next;
        inner.last_error = None;
        inner.error_phase = None;
        inner.last_transition_at = Utc::now();
        self.version.fetch_add(1, Ordering::SeqCst);
        debug!("[{}] {} -> {}", self.subject, expected, next);
        Ok(())
    }

    /// Unconditional move; used for retry resets and destruction
    pub fn force_transition(&self, next: Phase) {
        let mut inner = sync::lock(&self.inner);
        debug!("[{}] forced {} -> {}", self.subject, inner.phase, next);
        inner.phase = next;
        inner.last_transition_at = Utc::now();
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Set `next` and return the phase that was replaced
    pub fn swap(&self, next: Phase) -> Phase {
        let mut inner = sync::lock(&self.inner);
        let previous = inner.phase;
        inner.phase = next;
        inner.last_transition_at = Utc::now();
        self.version.fetch_add(1, Ordering::SeqCst);
        previous
    }

    /// Record a failure observed during the current phase, then move to
    /// `fallback`. A destroyed state stays destroyed.
    pub fn set_error(&self, error: Arc<MetaDataError>, fallback: Phase) {
        let mut inner = sync::lock(&self.inner);
        inner.error_phase = Some(inner.phase);
        inner.last_error = Some(error);
        if inner.phase != Phase::Destroyed {
            inner.phase = fallback;
        }
        inner.last_transition_at = Utc::now();
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a failure without changing phase
    pub fn record_error(&self, error: Arc<MetaDataError>) {
        let mut inner = sync::lock(&self.inner);
        inner.error_phase = Some(inner.phase);
        inner.last_error = Some(error);
    }

    pub fn clear_error(&self) {
        let mut inner = sync::lock(&self.inner);
        inner.last_error = None;
        inner.error_phase = None;
    }

    pub fn last_error(&self) -> Option<Arc<MetaDataError>> {
        sync::lock(&self.inner).last_error.clone()
    }

    /// Phase in which the last error occurred
    pub fn error_phase(&self) -> Option<Phase> {
        sync::lock(&self.inner).error_phase
    }

    pub fn has_error(&self) -> bool {
        sync::lock(&self.inner).last_error.is_some()
    }

    /// Fail with `IllegalState` unless the phase is `expected`
    pub fn require_phase(&self, expected: Phase) -> Result<()> {
        let inner = sync::lock(&self.inner);
        if inner.phase == expected {
            return Ok(());
        }
        let mut message = format!("Expected phase {} but was {}", expected, inner.phase);
        if let Some(err) = &inner.last_error {
            message.push_str(&format!(" (last error: {})", err));
        }
        Err(MetaDataError::IllegalState(message))
    }

    /// Fail with `IllegalState` unless the graph may be queried
    pub fn require_usable(&self) -> Result<()> {
        let phase = self.phase();
        if phase.is_usable() {
            Ok(())
        } else {
            Err(MetaDataError::IllegalState(format!(
                "Loader [{}] is not usable in phase {}",
                self.subject, phase
            )))
        }
    }

    pub fn is_usable(&self) -> bool {
        self.phase().is_usable()
    }

    pub fn is_loading_in_progress(&self) -> bool {
        self.phase().is_transient()
    }

    pub fn is_loading_complete(&self) -> bool {
        self.phase() == Phase::Registered
    }

    pub fn is_destroyed(&self) -> bool {
        self.phase() == Phase::Destroyed
    }

    /// Bumped on every phase change
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> LoadingSnapshot {
        let inner = sync::lock(&self.inner);
        LoadingSnapshot {
            phase: inner.phase,
            last_error: inner.last_error.as_ref().map(|e| e.to_string()),
            error_phase: inner.error_phase,
            version: self.version(),
            created_at: self.created_at,
            last_transition_at: inner.last_transition_at,
            elapsed_ms: self.elapsed().as_millis(),
        }
    }

    /// `Phase: ..., Error: ..., Elapsed: ...ms, Version: ...`
    pub fn status_description(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "Phase: {}, Error: {}, Elapsed: {}ms, Version: {}",
            snapshot.phase,
            snapshot.last_error.as_deref().unwrap_or("none"),
            snapshot.elapsed_ms,
            snapshot.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cas_transition() {
        let state = LoadingState::new("test");
        assert!(state.try_transition(Phase::Uninitialized, Phase::Initializing));
        assert!(!state.try_transition(Phase::Uninitialized, Phase::Initializing));
        assert!(state.is_loading_in_progress());
        assert_eq!(state.version(), 1);
    }

    #[test]
    fn test_transition_error_names_phases() {
        let state = LoadingState::new("test");
        let err = state.transition(Phase::Initialized, Phase::Registering).unwrap_err();
        assert!(err.is_illegal_state());
        assert_eq!(
            err.to_string(),
            "Illegal transition for [test]: expected INITIALIZED but was UNINITIALIZED, requested REGISTERING"
        );
    }

    #[test]
    fn test_set_error_records_phase_and_falls_back() {
        let state = LoadingState::new("test");
        state.force_transition(Phase::Initializing);
        state.set_error(
            Arc::new(MetaDataError::IllegalState("boom".into())),
            Phase::Uninitialized,
        );

        assert_eq!(state.phase(), Phase::Uninitialized);
        assert_eq!(state.error_phase(), Some(Phase::Initializing));
        let err = state.require_phase(Phase::Initialized).unwrap_err();
        assert!(err.to_string().contains("last error: Illegal state: boom"));

        // a successful transition clears the error
        assert!(state.try_transition(Phase::Uninitialized, Phase::Initializing));
        assert!(!state.has_error());
    }

    #[test]
    fn test_usable_phases() {
        let state = LoadingState::new("test");
        assert!(state.require_usable().is_err());
        state.force_transition(Phase::Initialized);
        assert!(state.is_usable());
        state.force_transition(Phase::Registered);
        assert!(state.is_loading_complete());
        assert!(state.status_description().starts_with("Phase: REGISTERED, Error: none"));
    }
}
