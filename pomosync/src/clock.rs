//! Local countdown clock.
//!
//! The clock knows nothing about phases or sessions. It counts whole seconds
//! down from the value it was armed with and reports completion exactly once.
//! Ticks are driven from outside (the engine's one-second interval).

/// Result of feeding one tick into the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Clock is stopped or paused; nothing changed.
    Idle,
    /// One second elapsed, this many remain.
    Remaining(u32),
    /// Countdown reached zero on this tick.
    Completed,
}

#[derive(Debug, Clone, Default)]
pub struct CountdownClock {
    remaining: u32,
    running: bool,
    completed: bool,
}

impl CountdownClock {
    pub fn new(initial_seconds: u32) -> Self {
        let mut clock = Self::default();
        clock.arm(initial_seconds);
        clock
    }

    /// (Re)initialize the remaining time. Leaves the clock stopped.
    pub fn arm(&mut self, initial_seconds: u32) {
        self.remaining = initial_seconds;
        self.running = false;
        self.completed = false;
    }

    pub fn start(&mut self) {
        if !self.completed {
            self.running = true;
        }
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        self.start();
    }

    /// Stop and set the remaining time, clearing any pending completion.
    pub fn reset(&mut self, to_seconds: u32) {
        self.arm(to_seconds);
    }

    pub fn tick(&mut self) -> Tick {
        if !self.running || self.completed {
            return Tick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            self.completed = true;
            return Tick::Completed;
        }
        Tick::Remaining(self.remaining)
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}
