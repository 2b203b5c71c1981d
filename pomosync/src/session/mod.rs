//! Pomodoro session model: the eight-step work/break rotation and the
//! per-phase state machine.

pub mod sequencer;

pub use sequencer::{PhaseCompletion, Sequencer, TimerSnapshot};

use pomosync_ipc::{PhaseStatus, TimerType};
use serde::{Deserialize, Serialize};

/// Steps run 0..=LAST_STEP, then wrap.
pub const LAST_STEP: u8 = 7;

/// Phase type for a rotation step: even steps work, odd steps short break,
/// the last step a long break.
pub fn timer_type_for_step(step: u8) -> TimerType {
    match step {
        LAST_STEP => TimerType::LongBreak,
        s if s % 2 == 0 => TimerType::Work,
        _ => TimerType::ShortBreak,
    }
}

pub fn next_step(step: u8) -> u8 {
    if step < LAST_STEP {
        step + 1
    } else {
        0
    }
}

/// Whether a start creates a server session or continues one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    New,
    Existing,
}

impl SessionMode {
    pub fn for_step(step: u8) -> Self {
        if step == 0 {
            SessionMode::New
        } else {
            SessionMode::Existing
        }
    }
}

/// Lifecycle of the current phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PhaseState {
    /// Armed at full duration, not counting.
    #[default]
    Idle,
    /// Counting locally, the server has not yet assigned a timer id.
    AwaitingServerAck,
    /// Counting with a server timer id.
    Running,
    /// Stopped mid-phase.
    Paused { remaining: u32 },
}

impl PhaseState {
    pub fn is_ticking(&self) -> bool {
        matches!(self, PhaseState::Running | PhaseState::AwaitingServerAck)
    }

    pub fn status(&self) -> PhaseStatus {
        match self {
            PhaseState::Idle => PhaseStatus::Idle,
            PhaseState::AwaitingServerAck => PhaseStatus::AwaitingServerAck,
            PhaseState::Running => PhaseStatus::Running,
            PhaseState::Paused { .. } => PhaseStatus::Paused,
        }
    }
}
