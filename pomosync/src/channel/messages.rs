//! Session message bodies exchanged with the pomodoro service.

use pomosync_ipc::{Category, TimerType};
use serde::{Deserialize, Serialize};

use crate::session::SessionMode;

pub const START_DESTINATION: &str = "/app/pomodoro/start";
pub const STOP_DESTINATION: &str = "/app/pomodoro/stop";
pub const RESUME_DESTINATION: &str = "/app/pomodoro/resume";
pub const RESET_DESTINATION: &str = "/app/pomodoro/reset";

/// Everything the sequencer can ask the channel to publish.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Start(StartRequest),
    Stop,
    Resume(ResumeRequest),
    Reset(ResetRequest),
}

impl Outbound {
    pub fn destination(&self) -> &'static str {
        match self {
            Outbound::Start(_) => START_DESTINATION,
            Outbound::Stop => STOP_DESTINATION,
            Outbound::Resume(_) => RESUME_DESTINATION,
            Outbound::Reset(_) => RESET_DESTINATION,
        }
    }

    pub fn body(&self) -> serde_json::Result<String> {
        match self {
            Outbound::Start(request) => serde_json::to_string(request),
            Outbound::Stop => Ok("{}".to_string()),
            Outbound::Resume(request) => serde_json::to_string(request),
            Outbound::Reset(request) => serde_json::to_string(request),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StartRequest {
    New(StartNewRequest),
    Existing(StartExistingRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRequest {
    pub duration: u32,
    pub remaining_time: u32,
    pub timer_type: TimerType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartNewRequest {
    pub timer_request: TimerRequest,
    pub sequence_request: NewSequenceRequest,
    pub timer_sequence_request: TimerSequenceRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSequenceRequest {
    pub mode: SessionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: bool,
    #[serde(rename = "type")]
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerSequenceRequest {
    pub step: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExistingRequest {
    pub timer_request: TimerRequest,
    pub sequence_request: ExistingSequenceRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExistingSequenceRequest {
    pub mode: SessionMode,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub remaining_time: u32,
    pub timer_id: i64,
    pub sequence_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub timer_id: i64,
}

/// Inbound acknowledgement. Either id may be missing; a missing id means
/// "no update" for that identifier.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionEvent {
    pub sequence_response: Option<IdResponse>,
    pub timer_response: Option<IdResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IdResponse {
    pub id: Option<i64>,
}

/// Server messages carry the acknowledgement under `data`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InboundMessage {
    data: Option<SessionEvent>,
}

impl SessionEvent {
    /// Parse a MESSAGE body. A body without `data` is an event with no ids.
    pub fn from_body(body: &str) -> serde_json::Result<Self> {
        let message: InboundMessage = serde_json::from_str(body)?;
        Ok(message.data.unwrap_or_default())
    }

    pub fn timer_id(&self) -> Option<i64> {
        self.timer_response.as_ref().and_then(|r| r.id)
    }

    pub fn sequence_id(&self) -> Option<i64> {
        self.sequence_response.as_ref().and_then(|r| r.id)
    }
}
