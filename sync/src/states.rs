/// Synchronizer run state and the guard that owns it.
use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No run in progress. New runs are accepted.
    #[default]
    Idle,

    /// A run owns the synchronizer. Further runs are rejected, not queued.
    Running,
}

impl SyncState {
    /// Check if a transition to the target state is valid.
    ///
    /// The only legal moves are Idle -> Running (acquire) and Running -> Idle (release).
    pub fn can_transition_to(&self, target: SyncState) -> bool {
        match self {
            SyncState::Idle => matches!(target, SyncState::Running),
            SyncState::Running => matches!(target, SyncState::Idle),
        }
    }
}

/// Mutual exclusion for synchronizer runs.
///
/// The lock only protects the flag flip, it is never held across an await.
/// Exclusion comes from the state itself: while a [`RunPermit`] is alive the
/// state is `Running`, and dropping the permit is the only way back to `Idle`.
#[derive(Debug, Default)]
pub struct RunGuard {
    state: Mutex<SyncState>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SyncState::Running
    }

    /// Move to `Running` and return the permit, or `None` if a run is in progress.
    pub fn try_acquire(&self) -> Option<RunPermit<'_>> {
        let mut state = self.state.lock();
        if !state.can_transition_to(SyncState::Running) {
            return None;
        }
        *state = SyncState::Running;
        trace!("Run guard acquired");
        Some(RunPermit { guard: self })
    }

    fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.can_transition_to(SyncState::Idle));
        *state = SyncState::Idle;
        trace!("Run guard released");
    }
}

/// Proof of exclusive access. Releases the guard when dropped, on every exit path.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct RunPermit<'a> {
    guard: &'a RunGuard,
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}
