//! Engine runtime.
//!
//! One tokio task owns the [`Sequencer`]. Views send [`Intent`]s through an
//! [`EngineHandle`] and read [`TimerSnapshot`]s from a watch channel, so
//! every mutation happens on a single task and nothing needs a lock.
//!
//! ```text
//!   EngineHandle ── Intent ──▶ ┌──────────────────────┐ ── Outbound ──▶ Publisher
//!   (views)                    │ Engine task          │
//!   EngineHandle ◀─ snapshot ─ │ Sequencer + ticker   │ ◀─ SessionEvent ─ channel
//!                              └──────────────────────┘
//! ```

use pomosync_ipc::{Category, TimerType};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, error, info, warn};

use crate::channel::{Outbound, Publisher, SessionEvent};
use crate::notify::{CompletionNotifier, SilentNotifier};
use crate::persistence::Persistence;
use crate::session::{Sequencer, TimerSnapshot};
use crate::settings::PhaseDuration;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Start,
    Stop,
    Resume,
    Reset,
    SetDescription(String),
    SetCategory(Category),
    SetDuration { timer_type: TimerType, seconds: u32 },
    ApplySettings(Vec<PhaseDuration>),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine has shut down")]
    Shutdown,
}

/// Cloneable handle given to every view.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Intent>,
    snapshots: watch::Receiver<TimerSnapshot>,
}

impl EngineHandle {
    pub fn send(&self, intent: Intent) -> Result<(), EngineError> {
        self.tx.send(intent).map_err(|_| EngineError::Shutdown)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.clone()
    }
}

pub struct Engine<P> {
    sequencer: Sequencer,
    publisher: P,
    notifier: Box<dyn CompletionNotifier>,
    persistence: Option<Persistence>,
    ticker: Option<Interval>,
}

impl<P: Publisher + 'static> Engine<P> {
    pub fn new(sequencer: Sequencer, publisher: P) -> Self {
        Self {
            sequencer,
            publisher,
            notifier: Box::new(SilentNotifier),
            persistence: None,
            ticker: None,
        }
    }

    pub fn with_notifier(mut self, notifier: impl CompletionNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Run the engine on its own task. It stops once every handle is gone
    /// and hands the publisher back.
    pub fn spawn(
        self,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        link: watch::Receiver<bool>,
    ) -> (EngineHandle, JoinHandle<P>) {
        let (tx, intents) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) =
            watch::channel(self.sequencer.snapshot(self.publisher.is_connected()));
        let task = tokio::spawn(self.run(intents, events, link, snapshot_tx));
        (EngineHandle { tx, snapshots }, task)
    }

    async fn run(
        mut self,
        mut intents: mpsc::UnboundedReceiver<Intent>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut link: watch::Receiver<bool>,
        snapshots: watch::Sender<TimerSnapshot>,
    ) -> P {
        info!("engine started");
        loop {
            let mut dirty = false;
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        self.handle_intent(intent);
                        dirty = true;
                    }
                    None => break,
                },
                Some(event) = events.recv() => {
                    debug!(?event, "server acknowledgement");
                    self.sequencer.on_server_ack(event.timer_id(), event.sequence_id());
                    dirty = true;
                }
                Ok(()) = link.changed() => {
                    info!(connected = *link.borrow(), "session link changed");
                }
                _ = next_tick(&mut self.ticker) => {
                    dirty = self.handle_tick();
                }
            }

            self.sync_ticker();
            if dirty {
                self.persist();
            }
            snapshots.send_replace(self.sequencer.snapshot(self.publisher.is_connected()));
        }
        self.persist();
        info!("engine stopped");
        self.publisher
    }

    fn handle_intent(&mut self, intent: Intent) {
        debug!(?intent, "intent");
        match intent {
            Intent::Start => {
                let message = self.sequencer.start_intent();
                self.dispatch(message);
            }
            Intent::Stop => {
                let message = self.sequencer.stop_intent();
                self.dispatch(message);
            }
            Intent::Resume => {
                let message = self.sequencer.resume_intent();
                self.dispatch(message);
            }
            Intent::Reset => {
                let message = self.sequencer.reset_intent();
                self.dispatch(message);
            }
            Intent::SetDescription(description) => {
                if !self.sequencer.set_description(description) {
                    warn!("task description cannot change during a work phase");
                }
            }
            Intent::SetCategory(category) => {
                if !self.sequencer.set_category(category) {
                    warn!("task category cannot change during a work phase");
                }
            }
            Intent::SetDuration {
                timer_type,
                seconds,
            } => self.sequencer.set_duration(timer_type, seconds),
            Intent::ApplySettings(settings) => self.sequencer.apply_settings(&settings),
        }
    }

    /// Publish without waiting. A dead link leaves local state as it is.
    fn dispatch(&self, message: Option<Outbound>) {
        let Some(message) = message else {
            return;
        };
        if let Err(err) = self.publisher.publish(&message) {
            warn!(
                destination = message.destination(),
                "session message not delivered: {err}"
            );
        }
    }

    fn handle_tick(&mut self) -> bool {
        match self.sequencer.tick() {
            Some(completion) => {
                self.notifier.phase_completed(&completion);
                true
            }
            None => false,
        }
    }

    /// The ticker exists exactly while the phase is counting down.
    fn sync_ticker(&mut self) {
        match (self.sequencer.is_ticking(), self.ticker.is_some()) {
            (true, false) => {
                self.ticker = Some(interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD));
                debug!("ticker acquired");
            }
            (false, true) => {
                self.ticker = None;
                debug!("ticker released");
            }
            _ => {}
        }
    }

    fn persist(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(err) = persistence.save(&self.sequencer.record()) {
            error!("failed to save session state: {err:#}");
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
