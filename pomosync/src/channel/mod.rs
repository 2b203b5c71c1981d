//! Remote session channel.
//!
//! A thin transport adapter: it keeps an authenticated STOMP connection
//! alive, publishes what it is given and forwards acknowledgements. It never
//! buffers while offline and never reconciles state.

pub mod client;
pub mod frame;
pub mod messages;

pub use client::{ChannelConfig, ConnectOutcome, StompChannel};
pub use messages::{Outbound, SessionEvent};

use thiserror::Error;

pub const SESSION_TOPIC: &str = "/user/queue/pomodoro";

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("session channel is not connected")]
    NotConnected,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("STOMP frame error: {0}")]
    Frame(#[from] frame::FrameError),

    #[error("broker rejected the connection: {0}")]
    Broker(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outbound half of the channel as the engine sees it.
pub trait Publisher: Send {
    /// Publish now or fail. Nothing is queued for later.
    fn publish(&self, message: &Outbound) -> Result<(), ChannelError>;

    fn is_connected(&self) -> bool;
}
