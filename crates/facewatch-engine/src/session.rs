//! Enrollment session state machine.
//!
//! One session at a time captures face samples for a single person, in
//! either manual mode (each capture explicitly triggered) or auto mode
//! (captures fire on a cooldown whenever the scene is bright enough).
//! Capture is two-phase: [`SessionManager::maybe_capture`] decides,
//! the caller persists the sample, then [`SessionManager::commit_capture`]
//! advances the count. Sequence numbers therefore never skip over a
//! failed write.

use facewatch_core::{PersonIdentity, PersonRegistry, RegistryError};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Minimum average luminosity for a manually triggered capture.
pub const MANUAL_MIN_LUMINOSITY: u8 = 60;
/// Minimum average luminosity for an automatic capture.
pub const AUTO_MIN_LUMINOSITY: u8 = 80;
/// Minimum spacing between automatic captures.
pub const AUTO_CAPTURE_COOLDOWN: Duration = Duration::from_millis(500);
/// Sample count ceiling when the caller does not specify one.
pub const DEFAULT_MAX_SAMPLES: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Manual,
    Auto,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no active enrollment session")]
    NoActiveSession,
    #[error("person registry: {0}")]
    Registry(#[from] RegistryError),
}

/// What [`SessionManager::maybe_capture`] decided for the current frame.
#[derive(Debug, PartialEq, Eq)]
pub enum CaptureDecision {
    /// Persist this frame's face crop as `person.{person_id}.{sequence}.jpg`.
    Capture { person_id: i32, sequence: u32 },
    Skip,
}

/// Point-in-time view of the session, serialized for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub person_id: i32,
    pub person_name: String,
    pub captured: u32,
    pub max_samples: u32,
    pub mode: Option<CaptureMode>,
}

#[derive(Debug)]
struct SessionState {
    active: bool,
    person_id: i32,
    person_name: String,
    captured: u32,
    max_samples: u32,
    mode: Option<CaptureMode>,
    pending_trigger: bool,
    min_luminosity: u8,
    cooldown: Duration,
    last_capture: Option<Instant>,
}

impl SessionState {
    fn idle() -> Self {
        Self {
            active: false,
            person_id: 0,
            person_name: String::new(),
            captured: 0,
            max_samples: DEFAULT_MAX_SAMPLES,
            mode: None,
            pending_trigger: false,
            min_luminosity: MANUAL_MIN_LUMINOSITY,
            cooldown: AUTO_CAPTURE_COOLDOWN,
            last_capture: None,
        }
    }
}

/// Shared handle to the single enrollment session. Cheap to clone; all
/// clones observe the same state. Starting a new session while one is
/// active overwrites it — last writer wins.
#[derive(Clone)]
pub struct SessionManager {
    state: Arc<Mutex<SessionState>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::idle())),
        }
    }

    /// Begin a manual session. Captures fire only on [`Self::request_capture`].
    pub fn start_manual(&self, person_id: i32, person_name: &str, max_samples: u32) {
        self.start(person_id, person_name, max_samples, CaptureMode::Manual);
    }

    /// Begin an auto session. Captures fire on the cooldown whenever the
    /// frame is bright enough.
    pub fn start_auto(&self, person_id: i32, person_name: &str, max_samples: u32) {
        self.start(person_id, person_name, max_samples, CaptureMode::Auto);
    }

    fn start(&self, person_id: i32, person_name: &str, max_samples: u32, mode: CaptureMode) {
        let mut state = self.lock();
        if state.active {
            tracing::warn!(
                old_person = state.person_id,
                new_person = person_id,
                "active session replaced"
            );
        }
        *state = SessionState::idle();
        state.active = true;
        state.person_id = person_id;
        state.person_name = person_name.to_string();
        state.max_samples = max_samples.max(1);
        state.mode = Some(mode);
        state.min_luminosity = match mode {
            CaptureMode::Manual => MANUAL_MIN_LUMINOSITY,
            CaptureMode::Auto => AUTO_MIN_LUMINOSITY,
        };
        tracing::info!(person_id, person_name, max_samples, ?mode, "session started");
    }

    /// Arm the next manual capture. A no-op when no session is active or
    /// the sample ceiling has been reached.
    pub fn request_capture(&self) {
        let mut state = self.lock();
        if state.active && state.captured < state.max_samples {
            state.pending_trigger = true;
        }
    }

    /// Decide whether the current frame should be captured.
    ///
    /// In manual mode this consumes the pending trigger even when the
    /// frame is too dark — a dark shot is discarded, not deferred.
    pub fn maybe_capture(&self, luminosity: u8) -> CaptureDecision {
        let mut state = self.lock();
        if !state.active || state.captured >= state.max_samples {
            return CaptureDecision::Skip;
        }

        let fire = match state.mode {
            Some(CaptureMode::Manual) => {
                if !state.pending_trigger {
                    return CaptureDecision::Skip;
                }
                state.pending_trigger = false;
                if luminosity < state.min_luminosity {
                    tracing::debug!(luminosity, "capture trigger dropped, frame too dark");
                    false
                } else {
                    true
                }
            }
            Some(CaptureMode::Auto) => {
                let elapsed_ok = state
                    .last_capture
                    .map(|t| t.elapsed() >= state.cooldown)
                    .unwrap_or(true);
                elapsed_ok && luminosity >= state.min_luminosity
            }
            None => false,
        };

        if fire {
            CaptureDecision::Capture {
                person_id: state.person_id,
                sequence: state.captured + 1,
            }
        } else {
            CaptureDecision::Skip
        }
    }

    /// Record that the sample decided by the last [`Self::maybe_capture`]
    /// was persisted.
    pub fn commit_capture(&self) {
        let mut state = self.lock();
        state.captured += 1;
        state.last_capture = Some(Instant::now());
        tracing::debug!(
            person_id = state.person_id,
            captured = state.captured,
            max = state.max_samples,
            "sample captured"
        );
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.lock();
        SessionStatus {
            active: state.active,
            person_id: state.person_id,
            person_name: state.person_name.clone(),
            captured: state.captured,
            max_samples: state.max_samples,
            mode: state.mode,
        }
    }

    /// True once the sample ceiling has been reached.
    pub fn is_complete(&self) -> bool {
        let state = self.lock();
        state.active && state.captured >= state.max_samples
    }

    /// End the session and register its person when at least one sample
    /// was captured. Resets to idle on success.
    pub fn finish(&self, persons: &dyn PersonRegistry) -> Result<SessionStatus, SessionError> {
        let mut state = self.lock();
        if !state.active {
            return Err(SessionError::NoActiveSession);
        }
        let summary = SessionStatus {
            active: false,
            person_id: state.person_id,
            person_name: state.person_name.clone(),
            captured: state.captured,
            max_samples: state.max_samples,
            mode: state.mode,
        };
        if state.captured > 0 {
            persons.create(PersonIdentity {
                person_id: state.person_id,
                name: state.person_name.clone(),
            })?;
            tracing::info!(
                person_id = summary.person_id,
                captured = summary.captured,
                "enrollment finished"
            );
        } else {
            tracing::info!(person_id = summary.person_id, "empty session discarded");
        }
        *state = SessionState::idle();
        Ok(summary)
    }

    /// Abandon the session without registering anyone.
    pub fn reset(&self) {
        let mut state = self.lock();
        if state.active {
            tracing::info!(person_id = state.person_id, "session reset");
        }
        *state = SessionState::idle();
    }

    #[cfg(test)]
    fn set_cooldown(&self, cooldown: Duration) {
        self.lock().cooldown = cooldown;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Next free person id: one past the highest registered, starting at 1.
pub fn next_person_id(persons: &dyn PersonRegistry) -> Result<i32, RegistryError> {
    let max = persons
        .get_all()?
        .iter()
        .map(|p| p.person_id)
        .max()
        .unwrap_or(0);
    Ok(max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryPersonRegistry;

    const BRIGHT: u8 = 200;
    const DARK: u8 = 10;

    #[test]
    fn test_manual_capture_needs_trigger() {
        let session = SessionManager::new();
        session.start_manual(7, "Alice", 3);

        assert_eq!(session.maybe_capture(BRIGHT), CaptureDecision::Skip);

        session.request_capture();
        assert_eq!(
            session.maybe_capture(BRIGHT),
            CaptureDecision::Capture { person_id: 7, sequence: 1 }
        );
        session.commit_capture();

        // Trigger was consumed.
        assert_eq!(session.maybe_capture(BRIGHT), CaptureDecision::Skip);
    }

    #[test]
    fn test_dark_frame_consumes_trigger_without_capturing() {
        let session = SessionManager::new();
        session.start_manual(7, "Alice", 3);
        session.request_capture();

        assert_eq!(session.maybe_capture(DARK), CaptureDecision::Skip);
        // The trigger is gone, not deferred to the next bright frame.
        assert_eq!(session.maybe_capture(BRIGHT), CaptureDecision::Skip);
        assert_eq!(session.status().captured, 0);
    }

    #[test]
    fn test_trigger_is_noop_when_idle_or_full() {
        let session = SessionManager::new();
        session.request_capture();
        assert_eq!(session.maybe_capture(BRIGHT), CaptureDecision::Skip);

        session.start_manual(1, "Bob", 1);
        session.request_capture();
        assert!(matches!(
            session.maybe_capture(BRIGHT),
            CaptureDecision::Capture { .. }
        ));
        session.commit_capture();
        assert!(session.is_complete());

        session.request_capture();
        assert_eq!(session.maybe_capture(BRIGHT), CaptureDecision::Skip);
    }

    #[test]
    fn test_auto_mode_respects_cooldown() {
        let session = SessionManager::new();
        session.start_auto(2, "Carol", 5);
        session.set_cooldown(Duration::from_secs(3600));

        assert!(matches!(
            session.maybe_capture(BRIGHT),
            CaptureDecision::Capture { person_id: 2, sequence: 1 }
        ));
        session.commit_capture();

        // Cooldown holds subsequent frames back.
        assert_eq!(session.maybe_capture(BRIGHT), CaptureDecision::Skip);

        session.set_cooldown(Duration::ZERO);
        assert!(matches!(
            session.maybe_capture(BRIGHT),
            CaptureDecision::Capture { sequence: 2, .. }
        ));
    }

    #[test]
    fn test_auto_mode_requires_brighter_scene() {
        let session = SessionManager::new();
        session.start_auto(2, "Carol", 5);
        // Bright enough for manual, not for auto.
        assert_eq!(
            session.maybe_capture(MANUAL_MIN_LUMINOSITY),
            CaptureDecision::Skip
        );
        assert!(matches!(
            session.maybe_capture(AUTO_MIN_LUMINOSITY),
            CaptureDecision::Capture { .. }
        ));
    }

    #[test]
    fn test_new_session_overwrites_active_one() {
        let session = SessionManager::new();
        session.start_manual(1, "Bob", 5);
        session.request_capture();
        assert!(matches!(session.maybe_capture(BRIGHT), CaptureDecision::Capture { .. }));
        session.commit_capture();

        session.start_manual(2, "Carol", 5);
        let status = session.status();
        assert_eq!(status.person_id, 2);
        assert_eq!(status.captured, 0);
    }

    #[test]
    fn test_finish_registers_person_and_resets() {
        let persons = MemoryPersonRegistry::new();
        let session = SessionManager::new();
        session.start_manual(7, "Alice", 3);
        session.request_capture();
        assert!(matches!(session.maybe_capture(BRIGHT), CaptureDecision::Capture { .. }));
        session.commit_capture();

        let summary = session.finish(&persons).unwrap();
        assert_eq!(summary.captured, 1);
        assert!(!session.status().active);

        let all = persons.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Alice");
    }

    #[test]
    fn test_finish_without_samples_registers_nobody() {
        let persons = MemoryPersonRegistry::new();
        let session = SessionManager::new();
        session.start_manual(7, "Alice", 3);

        session.finish(&persons).unwrap();
        assert!(persons.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_finish_without_session_errors() {
        let persons = MemoryPersonRegistry::new();
        let session = SessionManager::new();
        assert!(matches!(
            session.finish(&persons),
            Err(SessionError::NoActiveSession)
        ));
    }

    #[test]
    fn test_next_person_id_is_max_plus_one() {
        let persons = MemoryPersonRegistry::new();
        assert_eq!(next_person_id(&persons).unwrap(), 1);

        persons
            .create(PersonIdentity { person_id: 4, name: "Dave".into() })
            .unwrap();
        persons
            .create(PersonIdentity { person_id: 2, name: "Eve".into() })
            .unwrap();
        assert_eq!(next_person_id(&persons).unwrap(), 5);
    }
}
