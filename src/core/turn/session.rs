//! Per-session mutable state, including the reused-session initial
//! response guard.
//!
//! All flags live on an explicit per-session object passed into the
//! handlers, never a process-wide singleton, so concurrent sessions
//! cannot cross-contaminate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::playback::VolumeControl;

use super::TurnState;

/// One-shot mute guard for the first assistant response of a reused
/// session.
///
/// Reused sessions may replay an initial response the user already
/// heard; the guard mutes it once. `guard_used` is set at most once and
/// never reset within the session.
pub struct SessionReuseGuard {
    drop_next_assistant_response: AtomicBool,
    guard_used: AtomicBool,
    auto_pause_active: AtomicBool,
    pre_guard_volume: Mutex<Option<f32>>,
    release_task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for SessionReuseGuard {
    fn default() -> Self {
        Self {
            drop_next_assistant_response: AtomicBool::new(false),
            guard_used: AtomicBool::new(false),
            auto_pause_active: AtomicBool::new(false),
            pre_guard_volume: Mutex::new(None),
            release_task: Mutex::new(None),
        }
    }
}

impl SessionReuseGuard {
    /// Arm the drop flag (session reported as reused).
    pub fn arm(&self) {
        self.drop_next_assistant_response
            .store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.drop_next_assistant_response.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.auto_pause_active.load(Ordering::Acquire)
    }

    pub fn was_used(&self) -> bool {
        self.guard_used.load(Ordering::Acquire)
    }

    /// Release the guard, restoring the pre-guard volume.
    ///
    /// At-most-once: the active flag is consumed before any effect, so
    /// the timer task and an explicit release cannot both fire.
    pub fn release(&self, volume: &dyn VolumeControl) -> bool {
        if !self.auto_pause_active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(task) = self.release_task.lock().take() {
            task.abort();
        }
        let restored = self.pre_guard_volume.lock().take().unwrap_or(1.0);
        volume.set_volume(restored);
        info!(restored_volume = restored, "Reused-session guard released");
        true
    }
}

/// Session-scoped state shared by event handlers.
pub struct SessionState {
    reused: AtomicBool,
    user_has_spoken: AtomicBool,
    guard: Arc<SessionReuseGuard>,
    turn_state: Mutex<TurnState>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            reused: AtomicBool::new(false),
            user_has_spoken: AtomicBool::new(false),
            guard: Arc::new(SessionReuseGuard::default()),
            turn_state: Mutex::new(TurnState::Idle),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session as a reused one and arm the initial-response
    /// drop flag.
    pub fn mark_reused(&self) {
        self.reused.store(true, Ordering::Release);
        self.guard.arm();
        info!("Session marked as reused; initial-response guard armed");
    }

    pub fn is_reused(&self) -> bool {
        self.reused.load(Ordering::Acquire)
    }

    pub fn note_user_spoke(&self) {
        self.user_has_spoken.store(true, Ordering::Release);
    }

    pub fn user_has_spoken(&self) -> bool {
        self.user_has_spoken.load(Ordering::Acquire)
    }

    pub fn guard(&self) -> &SessionReuseGuard {
        &self.guard
    }

    pub fn turn_state(&self) -> TurnState {
        *self.turn_state.lock()
    }

    pub fn set_turn_state(&self, next: TurnState) {
        let mut state = self.turn_state.lock();
        if *state != next {
            debug!(from = ?*state, to = ?next, "Turn state transition");
            *state = next;
        }
    }

    /// Engage the reused-session initial guard if every condition
    /// holds: drop flag armed, session reused, user silent so far, and
    /// the guard never used before.
    ///
    /// Engaging disarms the drop flag, consumes `guard_used`
    /// irreversibly, mutes playback while preserving the pre-guard
    /// volume, and schedules an automatic release so a missing release
    /// event cannot leave the session stuck silent.
    ///
    /// Returns true when the guard engaged.
    pub fn try_engage_guard(
        &self,
        volume: Arc<dyn VolumeControl>,
        auto_release_after: Duration,
    ) -> bool {
        let guard = &self.guard;
        let eligible = guard.is_armed()
            && self.is_reused()
            && !self.user_has_spoken()
            && !guard.was_used();
        if !eligible {
            return false;
        }

        // `guard_used` is the consumed flag: first engagement wins.
        if guard.guard_used.swap(true, Ordering::AcqRel) {
            return false;
        }
        guard
            .drop_next_assistant_response
            .store(false, Ordering::Release);
        guard.auto_pause_active.store(true, Ordering::Release);
        *guard.pre_guard_volume.lock() = Some(volume.volume());
        volume.set_volume(0.0);

        info!(
            auto_release_ms = auto_release_after.as_millis() as u64,
            "Reused-session initial guard engaged; playback muted"
        );

        let timer_guard = Arc::clone(guard);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(auto_release_after).await;
            if timer_guard.release(volume.as_ref()) {
                info!("Reused-session guard auto-released after timeout");
            }
        });
        *guard.release_task.lock() = Some(handle);
        true
    }

    /// Release the guard, restoring the pre-guard volume.
    pub fn release_guard(&self, volume: &dyn VolumeControl) -> bool {
        self.guard.release(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct TestVolume {
        bits: AtomicU32,
    }

    impl TestVolume {
        fn new(volume: f32) -> Arc<Self> {
            Arc::new(Self {
                bits: AtomicU32::new(volume.to_bits()),
            })
        }
    }

    impl VolumeControl for TestVolume {
        fn volume(&self) -> f32 {
            f32::from_bits(self.bits.load(Ordering::Acquire))
        }

        fn set_volume(&self, volume: f32) {
            self.bits.store(volume.to_bits(), Ordering::Release);
        }
    }

    fn reused_session() -> SessionState {
        let session = SessionState::new();
        session.mark_reused();
        session
    }

    #[tokio::test]
    async fn test_guard_engages_once_and_mutes() {
        let session = reused_session();
        let volume = TestVolume::new(0.8);

        assert!(session.try_engage_guard(
            volume.clone() as Arc<dyn VolumeControl>,
            Duration::from_secs(10)
        ));
        assert_eq!(volume.volume(), 0.0);
        assert!(session.guard().was_used());
        assert!(session.guard().is_active());
        assert!(!session.guard().is_armed());
    }

    #[tokio::test]
    async fn test_second_engagement_is_a_no_op() {
        let session = reused_session();
        let volume = TestVolume::new(0.8);

        assert!(session.try_engage_guard(
            volume.clone() as Arc<dyn VolumeControl>,
            Duration::from_secs(10)
        ));
        session.release_guard(volume.as_ref());

        // Even re-arming cannot re-engage: guard_used is irreversible.
        session.guard().arm();
        assert!(!session.try_engage_guard(
            volume.clone() as Arc<dyn VolumeControl>,
            Duration::from_secs(10)
        ));
    }

    #[tokio::test]
    async fn test_guard_requires_silent_user() {
        let session = reused_session();
        session.note_user_spoke();
        let volume = TestVolume::new(0.8);
        assert!(!session.try_engage_guard(
            volume as Arc<dyn VolumeControl>,
            Duration::from_secs(10)
        ));
    }

    #[tokio::test]
    async fn test_guard_requires_reused_session() {
        let session = SessionState::new();
        session.guard().arm();
        let volume = TestVolume::new(0.8);
        assert!(!session.try_engage_guard(
            volume as Arc<dyn VolumeControl>,
            Duration::from_secs(10)
        ));
    }

    #[tokio::test]
    async fn test_release_restores_pre_guard_volume() {
        let session = reused_session();
        let volume = TestVolume::new(0.6);

        session.try_engage_guard(
            volume.clone() as Arc<dyn VolumeControl>,
            Duration::from_secs(10),
        );
        assert_eq!(volume.volume(), 0.0);

        assert!(session.release_guard(volume.as_ref()));
        assert_eq!(volume.volume(), 0.6);

        // Release is at-most-once.
        assert!(!session.release_guard(volume.as_ref()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_release_fires_after_timeout() {
        let session = reused_session();
        let volume = TestVolume::new(0.9);

        session.try_engage_guard(
            volume.clone() as Arc<dyn VolumeControl>,
            Duration::from_secs(4),
        );
        assert_eq!(volume.volume(), 0.0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(volume.volume(), 0.9);
        assert!(!session.guard().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_release_cancels_timer() {
        let session = reused_session();
        let volume = TestVolume::new(0.9);

        session.try_engage_guard(
            volume.clone() as Arc<dyn VolumeControl>,
            Duration::from_secs(4),
        );
        assert!(session.release_guard(volume.as_ref()));
        volume.set_volume(0.5);

        // The timer must not fire and clobber the volume later.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(volume.volume(), 0.5);
    }
}
