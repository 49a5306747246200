use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

impl RunState {
    fn from_u8(value: u8) -> RunState {
        match value {
            1 => RunState::Paused,
            2 => RunState::Stopped,
            _ => RunState::Running,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Stopped => "stopped",
        })
    }
}

/// Shared run/pause/stop switch, polled by retry loops once per iteration.
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct AutomationState {
    value: Arc<AtomicU8>,
}

impl AutomationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> RunState {
        RunState::from_u8(self.value.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: RunState) {
        let raw = match state {
            RunState::Running => 0,
            RunState::Paused => 1,
            RunState::Stopped => 2,
        };
        self.value.store(raw, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.set(RunState::Paused);
    }

    pub fn resume(&self) {
        self.set(RunState::Running);
    }

    pub fn stop(&self) {
        self.set(RunState::Stopped);
    }

    pub fn is_paused(&self) -> bool {
        self.get() == RunState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.get() == RunState::Stopped
    }
}
