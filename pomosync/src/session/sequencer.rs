use pomosync_ipc::{Category, PhaseStatus, TimerStatus, TimerType};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{next_step, timer_type_for_step, PhaseState, SessionMode, LAST_STEP};
use crate::channel::messages::{
    ExistingSequenceRequest, NewSequenceRequest, Outbound, ResetRequest, ResumeRequest,
    StartExistingRequest, StartNewRequest, StartRequest, TimerRequest, TimerSequenceRequest,
};
use crate::clock::{CountdownClock, Tick};
use crate::persistence::SessionRecord;
use crate::settings::{PhaseDuration, PhaseDurations};

/// What just finished, returned when the local countdown runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseCompletion {
    pub completed: TimerType,
    pub next: TimerType,
    pub step: u8,
    pub completed_work_sessions: u32,
}

/// Read-only view of the sequencer handed to front ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub phase: PhaseState,
    pub timer_type: TimerType,
    pub step: u8,
    pub mode: SessionMode,
    pub remaining: u32,
    pub duration: u32,
    pub durations: PhaseDurations,
    pub completed_work_sessions: u32,
    pub description: String,
    pub category: Category,
    pub description_locked: bool,
    pub timer_id: Option<i64>,
    pub sequence_id: Option<i64>,
    pub connected: bool,
}

impl TimerSnapshot {
    pub fn is_running(&self) -> bool {
        self.phase.is_ticking()
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.phase, PhaseState::Paused { .. })
    }

    /// Fraction of the phase already elapsed, 0.0..=1.0.
    pub fn progress(&self) -> f64 {
        if self.duration == 0 {
            return 0.0;
        }
        let elapsed = self.duration.saturating_sub(self.remaining) as f64;
        (elapsed / self.duration as f64).min(1.0)
    }
}

impl From<&TimerSnapshot> for TimerStatus {
    fn from(snapshot: &TimerSnapshot) -> Self {
        TimerStatus {
            state: snapshot.phase.status(),
            timer_type: snapshot.timer_type,
            step: snapshot.step,
            remaining: snapshot.remaining,
            duration: snapshot.duration,
            completed_work_sessions: snapshot.completed_work_sessions,
            description: snapshot.description.clone(),
            category: snapshot.category,
            timer_id: snapshot.timer_id,
            sequence_id: snapshot.sequence_id,
            connected: snapshot.connected,
        }
    }
}

/// Single owner of the pomodoro session state.
///
/// Every intent returns the message that should be published, if any. The
/// sequencer never talks to the network itself, so the caller decides what
/// to do when the channel is down.
#[derive(Debug, Clone)]
pub struct Sequencer {
    durations: PhaseDurations,
    clock: CountdownClock,
    phase: PhaseState,
    step: u8,
    completed_work_sessions: u32,
    description: String,
    category: Category,
    description_locked: bool,
    timer_id: Option<i64>,
    sequence_id: Option<i64>,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(PhaseDurations::default())
    }
}

impl Sequencer {
    pub fn new(durations: PhaseDurations) -> Self {
        Self {
            durations,
            clock: CountdownClock::new(durations.work),
            phase: PhaseState::Idle,
            step: 0,
            completed_work_sessions: 0,
            description: String::new(),
            category: Category::default(),
            description_locked: false,
            timer_id: None,
            sequence_id: None,
        }
    }

    /// Rebuild from a saved record. The phase always comes back idle.
    pub fn from_record(record: &SessionRecord) -> Self {
        let step = record.step.min(LAST_STEP);
        let mut sequencer = Self::new(record.durations);
        sequencer.step = step;
        sequencer.completed_work_sessions = record.completed_work_sessions;
        sequencer.sequence_id = record.sequence_id;
        sequencer.description = record.description.clone();
        sequencer.category = record.category;
        sequencer.clock.arm(sequencer.duration());
        sequencer
    }

    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            step: self.step,
            completed_work_sessions: self.completed_work_sessions,
            sequence_id: self.sequence_id,
            description: self.description.clone(),
            category: self.category,
            durations: self.durations,
            saved_at: chrono::Local::now(),
        }
    }

    pub fn timer_type(&self) -> TimerType {
        timer_type_for_step(self.step)
    }

    pub fn mode(&self) -> SessionMode {
        SessionMode::for_step(self.step)
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn phase(&self) -> PhaseState {
        self.phase
    }

    pub fn status(&self) -> PhaseStatus {
        self.phase.status()
    }

    pub fn is_ticking(&self) -> bool {
        self.phase.is_ticking()
    }

    /// Full length of the current phase.
    pub fn duration(&self) -> u32 {
        self.durations.get(self.timer_type())
    }

    pub fn remaining(&self) -> u32 {
        self.clock.remaining()
    }

    pub fn completed_work_sessions(&self) -> u32 {
        self.completed_work_sessions
    }

    pub fn timer_id(&self) -> Option<i64> {
        self.timer_id
    }

    pub fn sequence_id(&self) -> Option<i64> {
        self.sequence_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn durations(&self) -> PhaseDurations {
        self.durations
    }

    /// Returns false while a work phase holds the task input.
    pub fn set_description(&mut self, description: impl Into<String>) -> bool {
        if self.description_locked {
            debug!("task description is locked while the work phase is active");
            return false;
        }
        self.description = description.into();
        true
    }

    pub fn set_category(&mut self, category: Category) -> bool {
        if self.description_locked {
            debug!("task category is locked while the work phase is active");
            return false;
        }
        self.category = category;
        true
    }

    /// Change one phase type's configured length. Only an idle clock showing
    /// that phase type picks it up immediately.
    pub fn set_duration(&mut self, timer_type: TimerType, seconds: u32) {
        self.durations.set(timer_type, seconds);
        if timer_type == self.timer_type() && self.phase == PhaseState::Idle {
            self.clock.arm(seconds);
        }
    }

    pub fn apply_settings(&mut self, settings: &[PhaseDuration]) {
        for setting in settings {
            self.set_duration(setting.timer_type, setting.duration_seconds);
        }
    }

    /// Play button. Starts a new session, starts the next phase of the
    /// current one, or resumes a paused phase.
    pub fn start_intent(&mut self) -> Option<Outbound> {
        match self.phase {
            PhaseState::Paused { .. } => self.resume_intent(),
            PhaseState::Running | PhaseState::AwaitingServerAck => {
                debug!("start ignored, phase already running");
                None
            }
            PhaseState::Idle => {
                if self.sequence_id.is_none() && self.step != 0 {
                    // A new server session always opens the rotation.
                    info!(step = self.step, "no server session, restarting rotation at step 0");
                    self.step = 0;
                    self.clock.arm(self.duration());
                }
                let timer_request = TimerRequest {
                    duration: self.duration(),
                    remaining_time: self.clock.remaining(),
                    timer_type: self.timer_type(),
                };
                let request = match self.sequence_id {
                    None => {
                        let description = self.description.trim();
                        StartRequest::New(StartNewRequest {
                            timer_request,
                            sequence_request: NewSequenceRequest {
                                mode: SessionMode::New,
                                description: (!description.is_empty())
                                    .then(|| description.to_string()),
                                status: false,
                                category: self.category,
                            },
                            timer_sequence_request: TimerSequenceRequest { step: self.step },
                        })
                    }
                    Some(id) => StartRequest::Existing(StartExistingRequest {
                        timer_request,
                        sequence_request: ExistingSequenceRequest {
                            mode: SessionMode::Existing,
                            id,
                        },
                    }),
                };
                if self.timer_type() == TimerType::Work {
                    self.description_locked = true;
                }
                self.clock.start();
                self.phase = PhaseState::AwaitingServerAck;
                info!(step = self.step, timer_type = %self.timer_type(), "phase started");
                Some(Outbound::Start(request))
            }
        }
    }

    /// Continue a paused phase. Needs both server ids.
    pub fn resume_intent(&mut self) -> Option<Outbound> {
        let PhaseState::Paused { remaining } = self.phase else {
            debug!("resume ignored, phase is not paused");
            return None;
        };
        let (Some(timer_id), Some(sequence_id)) = (self.timer_id, self.sequence_id) else {
            warn!(
                timer_id = ?self.timer_id,
                sequence_id = ?self.sequence_id,
                "resume refused: server has not acknowledged this phase"
            );
            return None;
        };
        self.clock.resume();
        self.phase = PhaseState::Running;
        info!(remaining, "phase resumed");
        Some(Outbound::Resume(ResumeRequest {
            remaining_time: remaining,
            timer_id,
            sequence_id,
        }))
    }

    /// Pause button.
    pub fn stop_intent(&mut self) -> Option<Outbound> {
        if !self.phase.is_ticking() {
            debug!("stop ignored, phase is not running");
            return None;
        }
        self.clock.pause();
        self.phase = PhaseState::Paused {
            remaining: self.clock.remaining(),
        };
        info!(remaining = self.clock.remaining(), "phase stopped");
        Some(Outbound::Stop)
    }

    /// Back to full duration. Only once the server has assigned a timer.
    pub fn reset_intent(&mut self) -> Option<Outbound> {
        let Some(timer_id) = self.timer_id else {
            debug!("reset ignored, no timer id yet");
            return None;
        };
        self.clock.reset(self.duration());
        self.phase = PhaseState::Idle;
        self.timer_id = None;
        if self.timer_type() == TimerType::Work {
            self.description.clear();
            self.description_locked = false;
        }
        info!(timer_id, "phase reset");
        Some(Outbound::Reset(ResetRequest { timer_id }))
    }

    /// Feed one second into the clock.
    pub fn tick(&mut self) -> Option<PhaseCompletion> {
        match self.clock.tick() {
            Tick::Completed => Some(self.on_phase_complete()),
            Tick::Remaining(_) | Tick::Idle => None,
        }
    }

    /// Advance the rotation after the local countdown ran out.
    pub fn on_phase_complete(&mut self) -> PhaseCompletion {
        let completed = self.timer_type();
        if completed == TimerType::Work {
            self.completed_work_sessions += 1;
        }

        self.step = next_step(self.step);
        self.timer_id = None;
        if self.step == 0 {
            // Rotation finished; the next start opens a new server session.
            self.sequence_id = None;
            self.description_locked = false;
        }
        self.phase = PhaseState::Idle;
        self.clock.arm(self.duration());

        info!(
            completed = %completed,
            next = %self.timer_type(),
            step = self.step,
            "phase complete"
        );
        PhaseCompletion {
            completed,
            next: self.timer_type(),
            step: self.step,
            completed_work_sessions: self.completed_work_sessions,
        }
    }

    /// Merge ids from a server acknowledgement.
    pub fn on_server_ack(&mut self, timer_id: Option<i64>, sequence_id: Option<i64>) {
        if let Some(id) = sequence_id {
            if self.sequence_id != Some(id) {
                info!(sequence_id = id, "server assigned sequence");
            }
            self.sequence_id = Some(id);
        }

        if let Some(id) = timer_id {
            if self.phase == PhaseState::Idle {
                debug!(timer_id = id, "ignoring timer id for a phase that already ended");
                return;
            }
            self.timer_id = Some(id);
            if self.phase == PhaseState::AwaitingServerAck {
                self.phase = PhaseState::Running;
            }
        }
    }

    pub fn snapshot(&self, connected: bool) -> TimerSnapshot {
        TimerSnapshot {
            phase: self.phase,
            timer_type: self.timer_type(),
            step: self.step,
            mode: self.mode(),
            remaining: self.clock.remaining(),
            duration: self.duration(),
            durations: self.durations,
            completed_work_sessions: self.completed_work_sessions,
            description: self.description.clone(),
            category: self.category,
            description_locked: self.description_locked,
            timer_id: self.timer_id,
            sequence_id: self.sequence_id,
            connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_n(sequencer: &mut Sequencer, n: u32) -> Vec<PhaseCompletion> {
        (0..n).filter_map(|_| sequencer.tick()).collect()
    }

    fn short_durations() -> PhaseDurations {
        PhaseDurations {
            work: 3,
            short_break: 2,
            long_break: 4,
        }
    }

    #[test]
    fn fresh_start_creates_new_session() {
        let mut sequencer = Sequencer::default();
        sequencer.set_description("write report");
        sequencer.set_category(Category::Study);

        let Some(Outbound::Start(StartRequest::New(request))) = sequencer.start_intent() else {
            panic!("expected a new-session start");
        };
        assert_eq!(request.sequence_request.mode, SessionMode::New);
        assert_eq!(request.timer_sequence_request.step, 0);
        assert_eq!(request.sequence_request.description.as_deref(), Some("write report"));
        assert_eq!(request.sequence_request.category, Category::Study);
        assert_eq!(request.timer_request.duration, 1500);
        assert_eq!(request.timer_request.remaining_time, 1500);
        assert_eq!(sequencer.phase(), PhaseState::AwaitingServerAck);
    }

    #[test]
    fn known_sequence_starts_existing_phase() {
        let mut sequencer = Sequencer::default();
        sequencer.on_server_ack(None, Some(42));
        assert_eq!(sequencer.timer_id(), None);
        assert_eq!(sequencer.remaining(), sequencer.duration());

        let Some(Outbound::Start(StartRequest::Existing(request))) = sequencer.start_intent()
        else {
            panic!("expected an existing-session start");
        };
        assert_eq!(request.sequence_request.mode, SessionMode::Existing);
        assert_eq!(request.sequence_request.id, 42);
    }

    #[test]
    fn unacknowledged_rotation_restarts_at_step_zero() {
        let mut sequencer = Sequencer::new(PhaseDurations {
            work: 2,
            short_break: 2,
            long_break: 2,
        });
        sequencer.start_intent();
        assert_eq!(tick_n(&mut sequencer, 2).len(), 1);
        assert_eq!(sequencer.step(), 1);
        assert_eq!(sequencer.sequence_id(), None);

        let Some(Outbound::Start(StartRequest::New(request))) = sequencer.start_intent() else {
            panic!("expected a new-session start");
        };
        assert_eq!(request.timer_sequence_request.step, 0);
        assert_eq!(request.sequence_request.mode, SessionMode::New);
        assert_eq!(request.timer_request.timer_type, TimerType::Work);
        assert_eq!(sequencer.step(), 0);
        assert_eq!(sequencer.mode(), SessionMode::New);
        assert_eq!(sequencer.completed_work_sessions(), 1);
    }

    #[test]
    fn restored_step_without_sequence_opens_new_rotation() {
        let mut record = Sequencer::default().record();
        record.step = 3;
        record.sequence_id = None;
        let mut sequencer = Sequencer::from_record(&record);

        let Some(Outbound::Start(StartRequest::New(request))) = sequencer.start_intent() else {
            panic!("expected a new-session start");
        };
        assert_eq!(request.timer_sequence_request.step, 0);
        assert_eq!(request.timer_request.duration, 1500);
        assert_eq!(sequencer.snapshot(false).mode, SessionMode::New);
    }

    #[test]
    fn paused_phase_resumes_with_remaining_time() {
        let mut sequencer = Sequencer::default();
        sequencer.start_intent();
        sequencer.on_server_ack(Some(7), Some(42));
        assert_eq!(sequencer.phase(), PhaseState::Running);

        tick_n(&mut sequencer, 1500 - 90);
        assert_eq!(sequencer.stop_intent(), Some(Outbound::Stop));
        assert_eq!(sequencer.phase(), PhaseState::Paused { remaining: 90 });

        assert_eq!(
            sequencer.start_intent(),
            Some(Outbound::Resume(ResumeRequest {
                remaining_time: 90,
                timer_id: 7,
                sequence_id: 42,
            }))
        );
        assert_eq!(sequencer.phase(), PhaseState::Running);
        assert_eq!(sequencer.timer_id(), Some(7));
        assert_eq!(sequencer.sequence_id(), Some(42));
    }

    #[test]
    fn resume_without_ids_is_refused() {
        let mut sequencer = Sequencer::default();
        sequencer.start_intent();
        tick_n(&mut sequencer, 10);
        sequencer.stop_intent();

        assert_eq!(sequencer.resume_intent(), None);
        assert_eq!(sequencer.phase(), PhaseState::Paused { remaining: 1490 });
        assert!(sequencer.tick().is_none());
        assert_eq!(sequencer.remaining(), 1490);
    }

    #[test]
    fn stop_keeps_ids_and_step() {
        let mut sequencer = Sequencer::default();
        sequencer.start_intent();
        sequencer.on_server_ack(Some(7), Some(42));
        sequencer.stop_intent();

        assert_eq!(sequencer.step(), 0);
        assert_eq!(sequencer.timer_id(), Some(7));
        assert_eq!(sequencer.sequence_id(), Some(42));
        assert_eq!(sequencer.stop_intent(), None, "second stop is a no-op");
    }

    #[test]
    fn running_start_is_ignored() {
        let mut sequencer = Sequencer::default();
        assert!(sequencer.start_intent().is_some());
        assert!(sequencer.start_intent().is_none());
    }

    #[test]
    fn reset_without_timer_id_changes_nothing() {
        let mut sequencer = Sequencer::default();
        sequencer.start_intent();
        tick_n(&mut sequencer, 5);
        let before = sequencer.snapshot(true);

        assert_eq!(sequencer.reset_intent(), None);
        assert_eq!(sequencer.snapshot(true), before);
    }

    #[test]
    fn reset_restores_full_duration() {
        let mut sequencer = Sequencer::default();
        sequencer.set_description("deep work");
        sequencer.start_intent();
        sequencer.on_server_ack(Some(7), Some(42));
        tick_n(&mut sequencer, 100);
        assert!(!sequencer.set_description("other"), "input locked while working");

        assert_eq!(
            sequencer.reset_intent(),
            Some(Outbound::Reset(ResetRequest { timer_id: 7 }))
        );
        assert_eq!(sequencer.remaining(), 1500);
        assert_eq!(sequencer.phase(), PhaseState::Idle);
        assert_eq!(sequencer.description(), "");
        assert!(sequencer.set_description("other"));
        assert_eq!(sequencer.sequence_id(), Some(42));
    }

    #[test]
    fn reset_of_a_break_keeps_the_task() {
        let mut sequencer = Sequencer::new(short_durations());
        sequencer.set_description("essay");
        sequencer.start_intent();
        sequencer.on_server_ack(Some(1), Some(42));
        tick_n(&mut sequencer, 3);
        assert_eq!(sequencer.timer_type(), TimerType::ShortBreak);

        sequencer.start_intent();
        sequencer.on_server_ack(Some(2), None);
        sequencer.reset_intent();
        assert_eq!(sequencer.description(), "essay");
        assert_eq!(sequencer.remaining(), 2);
    }

    #[test]
    fn only_work_phases_are_counted() {
        let mut sequencer = Sequencer::default();
        for step in 0..=LAST_STEP {
            let before = sequencer.completed_work_sessions();
            assert_eq!(sequencer.step(), step);
            let completion = sequencer.on_phase_complete();
            let counted = completion.completed_work_sessions - before;
            if step % 2 == 0 && step != LAST_STEP {
                assert_eq!(counted, 1, "work step {step}");
            } else {
                assert_eq!(counted, 0, "break step {step}");
            }
        }
        assert_eq!(sequencer.completed_work_sessions(), 4);
        assert_eq!(sequencer.step(), 0);
    }

    #[test]
    fn completion_advances_rotation() {
        let mut sequencer = Sequencer::new(short_durations());
        sequencer.start_intent();
        sequencer.on_server_ack(Some(7), Some(42));

        let completions = tick_n(&mut sequencer, 10);
        assert_eq!(
            completions,
            vec![PhaseCompletion {
                completed: TimerType::Work,
                next: TimerType::ShortBreak,
                step: 1,
                completed_work_sessions: 1,
            }]
        );
        assert_eq!(sequencer.phase(), PhaseState::Idle);
        assert_eq!(sequencer.mode(), SessionMode::Existing);
        assert_eq!(sequencer.remaining(), 2);
        assert_eq!(sequencer.timer_id(), None);
        assert_eq!(sequencer.sequence_id(), Some(42));
    }

    #[test]
    fn wrapping_rotation_starts_a_new_session() {
        let mut sequencer = Sequencer::new(short_durations());
        sequencer.on_server_ack(None, Some(42));
        for _ in 0..=LAST_STEP {
            sequencer.on_phase_complete();
        }
        assert_eq!(sequencer.step(), 0);
        assert_eq!(sequencer.mode(), SessionMode::New);
        assert_eq!(sequencer.sequence_id(), None);
        assert!(matches!(
            sequencer.start_intent(),
            Some(Outbound::Start(StartRequest::New(_)))
        ));
    }

    #[test]
    fn ack_merge_never_clears_ids() {
        let mut sequencer = Sequencer::default();
        sequencer.start_intent();
        sequencer.on_server_ack(None, Some(42));
        assert_eq!(sequencer.phase(), PhaseState::AwaitingServerAck);

        sequencer.on_server_ack(Some(7), None);
        assert_eq!(sequencer.sequence_id(), Some(42));
        assert_eq!(sequencer.timer_id(), Some(7));
        assert_eq!(sequencer.phase(), PhaseState::Running);

        sequencer.on_server_ack(None, None);
        assert_eq!(sequencer.sequence_id(), Some(42));
        assert_eq!(sequencer.timer_id(), Some(7));
    }

    #[test]
    fn late_timer_ack_after_completion_is_ignored() {
        let mut sequencer = Sequencer::new(short_durations());
        sequencer.start_intent();
        tick_n(&mut sequencer, 3);
        sequencer.on_server_ack(Some(7), Some(42));

        assert_eq!(sequencer.timer_id(), None);
        assert_eq!(sequencer.sequence_id(), Some(42));
    }

    #[test]
    fn idle_duration_change_rearms_immediately() {
        let mut sequencer = Sequencer::default();
        sequencer.set_duration(TimerType::Work, 600);
        assert_eq!(sequencer.remaining(), 600);

        sequencer.set_duration(TimerType::LongBreak, 1200);
        assert_eq!(sequencer.remaining(), 600, "other phase types do not re-arm");
    }

    #[test]
    fn running_duration_change_waits_for_next_phase() {
        let mut sequencer = Sequencer::default();
        sequencer.start_intent();
        sequencer.on_server_ack(Some(7), Some(42));
        tick_n(&mut sequencer, 10);

        sequencer.set_duration(TimerType::Work, 600);
        assert_eq!(sequencer.remaining(), 1490);

        sequencer.stop_intent();
        sequencer.set_duration(TimerType::Work, 300);
        assert_eq!(sequencer.remaining(), 1490, "paused phase keeps its time");

        sequencer.reset_intent();
        assert_eq!(sequencer.remaining(), 300);
    }

    #[test]
    fn server_settings_apply_per_type() {
        let mut sequencer = Sequencer::default();
        sequencer.apply_settings(&[
            PhaseDuration {
                duration_seconds: 1800,
                timer_type: TimerType::Work,
            },
            PhaseDuration {
                duration_seconds: 600,
                timer_type: TimerType::ShortBreak,
            },
        ]);
        assert_eq!(sequencer.remaining(), 1800);
        assert_eq!(sequencer.durations().short_break, 600);
        assert_eq!(sequencer.durations().long_break, 900);
    }

    #[test]
    fn record_round_trip_restores_rotation() {
        let mut sequencer = Sequencer::new(short_durations());
        sequencer.set_description("thesis");
        sequencer.start_intent();
        sequencer.on_server_ack(Some(3), Some(42));
        tick_n(&mut sequencer, 3);

        let restored = Sequencer::from_record(&sequencer.record());
        assert_eq!(restored.step(), 1);
        assert_eq!(restored.sequence_id(), Some(42));
        assert_eq!(restored.timer_id(), None);
        assert_eq!(restored.completed_work_sessions(), 1);
        assert_eq!(restored.phase(), PhaseState::Idle);
        assert_eq!(restored.remaining(), 2);
        assert_eq!(restored.description(), "thesis");
    }
}
