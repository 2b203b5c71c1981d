use crate::config::Config;
use crate::engine::{EngineHandle, Intent};
use crate::session::TimerSnapshot;
use crate::settings::parse_clock_duration;
use crossterm::event::{KeyCode, KeyEvent};
use pomosync_ipc::TimerType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppMode {
    #[default]
    Normal,
    EditingTask,
    EditingDuration(TimerType),
}

pub struct App {
    pub engine: EngineHandle,
    pub snapshot: TimerSnapshot,
    /// Tab shown in the view. Follows the running phase.
    pub view: TimerType,
    pub mode: AppMode,
    pub input_buffer: String,
    pub status_message: Option<String>,
    pub config: Config,
    pub should_quit: bool,
}

impl App {
    pub fn new(engine: EngineHandle, config: Config) -> Self {
        let snapshot = engine.snapshot();
        Self {
            view: snapshot.timer_type,
            engine,
            snapshot,
            mode: AppMode::Normal,
            input_buffer: String::new(),
            status_message: None,
            config,
            should_quit: false,
        }
    }

    /// Pull the latest engine state.
    pub fn refresh(&mut self) {
        let snapshot = self.engine.snapshot();
        if snapshot.timer_type != self.snapshot.timer_type || snapshot.is_running() {
            self.view = snapshot.timer_type;
        }
        self.snapshot = snapshot;
    }

    /// Seconds shown for the selected tab.
    pub fn displayed_remaining(&self) -> u32 {
        if self.view == self.snapshot.timer_type {
            self.snapshot.remaining
        } else {
            self.snapshot.durations.get(self.view)
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match self.mode {
            AppMode::Normal => self.handle_normal_key(key.code),
            AppMode::EditingTask | AppMode::EditingDuration(_) => match key.code {
                KeyCode::Esc => {
                    self.mode = AppMode::Normal;
                    self.input_buffer.clear();
                }
                KeyCode::Enter => self.submit_input(),
                KeyCode::Backspace => {
                    self.input_buffer.pop();
                }
                KeyCode::Char(c) => self.input_buffer.push(c),
                _ => {}
            },
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) {
        self.status_message = None;
        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char(' ') => self.toggle_timer(),
            KeyCode::Char('r') => self.send(Intent::Reset),
            KeyCode::Char('t') => {
                if self.snapshot.description_locked {
                    self.status_message = Some("Task is locked until the work phase ends".into());
                } else {
                    self.input_buffer = self.snapshot.description.clone();
                    self.mode = AppMode::EditingTask;
                }
            }
            KeyCode::Char('c') => {
                if self.snapshot.description_locked {
                    self.status_message = Some("Category is locked until the work phase ends".into());
                } else {
                    self.send(Intent::SetCategory(self.snapshot.category.next()));
                }
            }
            KeyCode::Char('e') => {
                self.input_buffer.clear();
                self.mode = AppMode::EditingDuration(self.view);
            }
            KeyCode::Tab => self.cycle_view(),
            _ => {}
        }
    }

    fn toggle_timer(&mut self) {
        if self.snapshot.is_running() {
            self.send(Intent::Stop);
        } else if self.snapshot.is_paused() {
            if self.snapshot.timer_id.is_none() || self.snapshot.sequence_id.is_none() {
                self.status_message = Some("Waiting for the server to acknowledge this phase".into());
            }
            self.send(Intent::Resume);
        } else {
            self.send(Intent::Start);
        }
    }

    fn cycle_view(&mut self) {
        if self.snapshot.is_running() {
            return;
        }
        let index = TimerType::ALL
            .iter()
            .position(|t| *t == self.view)
            .unwrap_or(0);
        self.view = TimerType::ALL[(index + 1) % TimerType::ALL.len()];
    }

    fn submit_input(&mut self) {
        let input = std::mem::take(&mut self.input_buffer);
        match self.mode {
            AppMode::EditingTask => self.send(Intent::SetDescription(input.trim().to_string())),
            AppMode::EditingDuration(timer_type) => match parse_minutes(&input) {
                Some(seconds) => self.send(Intent::SetDuration {
                    timer_type,
                    seconds,
                }),
                None => {
                    self.status_message = Some(format!("Invalid duration: {input:?}"));
                }
            },
            AppMode::Normal => {}
        }
        self.mode = AppMode::Normal;
    }

    fn send(&mut self, intent: Intent) {
        if let Err(e) = self.engine.send(intent) {
            self.status_message = Some(e.to_string());
            self.should_quit = true;
        }
    }
}

/// `25` means 25 minutes, `25:30` is minutes and seconds.
fn parse_minutes(input: &str) -> Option<u32> {
    let input = input.trim();
    let seconds = if input.contains(':') {
        parse_clock_duration(input).ok()?
    } else {
        input.parse::<u32>().ok()?.checked_mul(60)?
    };
    (seconds > 0).then_some(seconds)
}
