use pomosync_ipc::TimerType;
use tracing::error;

use crate::session::PhaseCompletion;

/// Told about every finished phase.
pub trait CompletionNotifier: Send {
    fn phase_completed(&self, completion: &PhaseCompletion);
}

/// Desktop notification when a work phase ends. Breaks stay silent.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl CompletionNotifier for DesktopNotifier {
    fn phase_completed(&self, completion: &PhaseCompletion) {
        if completion.completed != TimerType::Work {
            return;
        }
        let body = format!(
            "Work session {} done. Next up: {}.",
            completion.completed_work_sessions, completion.next
        );
        if let Err(e) = notify_rust::Notification::new()
            .summary("Pomodoro complete")
            .body(&body)
            .appname("pomosync")
            .show()
        {
            error!("Failed to send notification: {}", e);
        }
    }
}

/// For headless runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl CompletionNotifier for SilentNotifier {
    fn phase_completed(&self, _completion: &PhaseCompletion) {}
}
