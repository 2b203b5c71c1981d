//! Inter-process communication between pomosync and pomosyncctl
//!
//! We use Unix domain sockets for local IPC. Every message is one line of
//! JSON; the phase and category enums double as the numeric codes the
//! session server expects, so the engine shares them too.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Commands that pomosyncctl can send to pomosync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Start,
    Stop,
    Resume,
    Reset,
    Status,
    SetTask {
        description: String,
        category: Option<Category>,
    },
    SetDuration {
        timer_type: TimerType,
        seconds: u32,
    },
}

/// Responses from pomosync back to pomosyncctl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Status(TimerStatus),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerStatus {
    pub state: PhaseStatus,
    pub timer_type: TimerType,
    pub step: u8,
    pub remaining: u32, // seconds
    pub duration: u32,  // seconds
    pub completed_work_sessions: u32,
    pub description: String,
    pub category: Category,
    pub timer_id: Option<i64>,
    pub sequence_id: Option<i64>,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    Idle,
    AwaitingServerAck,
    Running,
    Paused,
}

/// Which countdown a phase runs. Serialized as the server's numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TimerType {
    Work = 1,
    ShortBreak = 2,
    LongBreak = 3,
}

impl TimerType {
    pub const ALL: [TimerType; 3] = [TimerType::Work, TimerType::ShortBreak, TimerType::LongBreak];

    pub fn label(self) -> &'static str {
        match self {
            TimerType::Work => "Pomodoro",
            TimerType::ShortBreak => "Short Break",
            TimerType::LongBreak => "Long Break",
        }
    }
}

impl From<TimerType> for u8 {
    fn from(value: TimerType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for TimerType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TimerType::Work),
            2 => Ok(TimerType::ShortBreak),
            3 => Ok(TimerType::LongBreak),
            other => Err(format!("unknown timer type {other}")),
        }
    }
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Task category attached to a new session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Category {
    #[default]
    Work = 1,
    Study = 2,
    Personal = 3,
    Other = 4,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::Work => "Work",
            Category::Study => "Study",
            Category::Personal => "Personal",
            Category::Other => "Other",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Category::Work => Category::Study,
            Category::Study => Category::Personal,
            Category::Personal => Category::Other,
            Category::Other => Category::Work,
        }
    }
}

impl From<Category> for u8 {
    fn from(value: Category) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Category {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Category::Work),
            2 => Ok(Category::Study),
            3 => Ok(Category::Personal),
            4 => Ok(Category::Other),
            other => Err(format!("unknown category {other}")),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection closed before a message arrived")]
    Closed,

    #[error("Connection refused - is pomosync running?")]
    ConnectionRefused,
}

pub const SOCKET_PATH: &str = "/tmp/pomosync.sock";

/// Write one message as a JSON line.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(message)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one JSON line.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, IpcError>
where
    R: AsyncBufRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(IpcError::Closed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn timer_type_uses_server_codes() {
        assert_eq!(serde_json::to_string(&TimerType::LongBreak).unwrap(), "3");
        let parsed: TimerType = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, TimerType::ShortBreak);
        assert!(serde_json::from_str::<TimerType>("9").is_err());
    }

    #[test]
    fn category_cycles_through_all_values() {
        let mut category = Category::default();
        let mut seen = vec![];
        for _ in 0..4 {
            seen.push(u8::from(category));
            category = category.next();
        }
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(category, Category::Work);
    }

    #[tokio::test]
    async fn messages_are_line_delimited() {
        let mut buf = Vec::new();
        write_message(
            &mut buf,
            &Command::SetDuration {
                timer_type: TimerType::Work,
                seconds: 600,
            },
        )
        .await
        .unwrap();
        write_message(&mut buf, &Command::Status).await.unwrap();
        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 2);

        let mut reader = BufReader::new(buf.as_slice());
        let first: Command = read_message(&mut reader).await.unwrap();
        let second: Command = read_message(&mut reader).await.unwrap();
        assert_eq!(
            first,
            Command::SetDuration {
                timer_type: TimerType::Work,
                seconds: 600
            }
        );
        assert_eq!(second, Command::Status);
        assert!(matches!(
            read_message::<_, Command>(&mut reader).await,
            Err(IpcError::Closed)
        ));
    }
}
