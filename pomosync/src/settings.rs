//! Per-phase durations and the REST fetch that seeds them.

use pomosync_ipc::TimerType;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_WORK_SECS: u32 = 25 * 60;
pub const DEFAULT_SHORT_BREAK_SECS: u32 = 5 * 60;
pub const DEFAULT_LONG_BREAK_SECS: u32 = 15 * 60;

/// Configured length of each phase type, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseDurations {
    pub work: u32,
    pub short_break: u32,
    pub long_break: u32,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            work: DEFAULT_WORK_SECS,
            short_break: DEFAULT_SHORT_BREAK_SECS,
            long_break: DEFAULT_LONG_BREAK_SECS,
        }
    }
}

impl PhaseDurations {
    pub fn get(&self, timer_type: TimerType) -> u32 {
        match timer_type {
            TimerType::Work => self.work,
            TimerType::ShortBreak => self.short_break,
            TimerType::LongBreak => self.long_break,
        }
    }

    pub fn set(&mut self, timer_type: TimerType, seconds: u32) {
        match timer_type {
            TimerType::Work => self.work = seconds,
            TimerType::ShortBreak => self.short_break = seconds,
            TimerType::LongBreak => self.long_break = seconds,
        }
    }
}

/// One duration setting as served by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDuration {
    pub duration_seconds: u32,
    pub timer_type: TimerType,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid duration {0:?}, expected MM:SS")]
    InvalidDuration(String),

    #[error("response is missing {0}")]
    MissingField(&'static str),

    #[error("unknown timer type {0}")]
    UnknownTimerType(u8),
}

#[derive(Debug, Deserialize)]
struct PomodoroEnvelope {
    data: Option<PomodoroData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PomodoroData {
    timer_response: Option<TimerSetting>,
    sequence_response: Option<SequenceRef>,
}

#[derive(Debug, Deserialize)]
struct TimerSetting {
    duration: String,
    #[serde(rename = "type")]
    timer_type: u8,
}

#[derive(Debug, Deserialize)]
struct SequenceRef {
    #[allow(dead_code)]
    id: Option<i64>,
}

/// Parse "MM:SS" into seconds. Minutes may exceed 59.
pub fn parse_clock_duration(value: &str) -> Result<u32, SettingsError> {
    let invalid = || SettingsError::InvalidDuration(value.to_string());
    let (minutes, seconds) = value.trim().split_once(':').ok_or_else(invalid)?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    let seconds: u32 = seconds.parse().map_err(|_| invalid())?;
    if seconds >= 60 {
        return Err(invalid());
    }
    minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .ok_or_else(invalid)
}

fn phase_duration_from_body(body: &str) -> Result<PhaseDuration, SettingsError> {
    let envelope: PomodoroEnvelope =
        serde_json::from_str(body).map_err(|_| SettingsError::MissingField("data"))?;
    let data = envelope.data.ok_or(SettingsError::MissingField("data"))?;
    let timer = data
        .timer_response
        .ok_or(SettingsError::MissingField("timerResponse"))?;
    if data.sequence_response.is_none() {
        return Err(SettingsError::MissingField("sequenceResponse"));
    }
    let timer_type = TimerType::try_from(timer.timer_type)
        .map_err(|_| SettingsError::UnknownTimerType(timer.timer_type))?;
    Ok(PhaseDuration {
        duration_seconds: parse_clock_duration(&timer.duration)?,
        timer_type,
    })
}

/// Fetches the user's pomodoro settings from `GET {base}/api/v1/pomodoro`.
#[derive(Clone)]
pub struct SettingsClient {
    http: reqwest::Client,
    base_url: String,
}

impl SettingsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch(&self, token: &str) -> Result<PhaseDuration, SettingsError> {
        let url = format!("{}/api/v1/pomodoro", self.base_url);
        debug!(%url, "fetching pomodoro settings");
        let body = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        phase_duration_from_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clock_durations() {
        assert_eq!(parse_clock_duration("25:00").unwrap(), 1500);
        assert_eq!(parse_clock_duration("05:30").unwrap(), 330);
        assert_eq!(parse_clock_duration("90:00").unwrap(), 5400);
        assert!(parse_clock_duration("25").is_err());
        assert!(parse_clock_duration("10:75").is_err());
        assert!(parse_clock_duration("ab:00").is_err());
    }

    #[test]
    fn reads_duration_from_response() {
        let body = r#"{"data":{"timerResponse":{"duration":"15:00","type":3},"sequenceResponse":{"id":11}}}"#;
        let setting = phase_duration_from_body(body).unwrap();
        assert_eq!(
            setting,
            PhaseDuration {
                duration_seconds: 900,
                timer_type: TimerType::LongBreak
            }
        );
    }

    #[test]
    fn rejects_incomplete_response() {
        let body = r#"{"data":{"timerResponse":{"duration":"15:00","type":1}}}"#;
        assert!(matches!(
            phase_duration_from_body(body),
            Err(SettingsError::MissingField("sequenceResponse"))
        ));
        let body = r#"{"data":{"timerResponse":{"duration":"15:00","type":7},"sequenceResponse":{}}}"#;
        assert!(matches!(
            phase_duration_from_body(body),
            Err(SettingsError::UnknownTimerType(7))
        ));
    }

    #[test]
    fn durations_by_type() {
        let mut durations = PhaseDurations::default();
        assert_eq!(durations.get(TimerType::Work), 1500);
        durations.set(TimerType::ShortBreak, 120);
        assert_eq!(durations.get(TimerType::ShortBreak), 120);
        assert_eq!(durations.get(TimerType::LongBreak), 900);
    }
}
