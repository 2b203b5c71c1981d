use futures::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::frame::{Frame, FrameCommand};
use super::messages::{Outbound, SessionEvent};
use super::{ChannelError, Publisher, SESSION_TOPIC};
use crate::credential::CookieSource;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const SUBSCRIPTION_ID: &str = "sub-0";

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// `ws://` or `wss://` endpoint of the STOMP broker.
    pub url: String,
    pub topic: String,
    pub reconnect_delay: Duration,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            topic: SESSION_TOPIC.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn host(&self) -> &str {
        host_of(&self.url)
    }
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Started,
    AlreadyConnected,
    MissingCredential,
}

#[derive(Debug)]
struct Publication {
    destination: &'static str,
    body: String,
}

/// Reconnecting STOMP-over-WebSocket client for the pomodoro service.
pub struct StompChannel {
    config: ChannelConfig,
    credential: CookieSource,
    status: Arc<watch::Sender<bool>>,
    outbound: Option<mpsc::UnboundedSender<Publication>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl StompChannel {
    pub fn new(config: ChannelConfig, credential: CookieSource) -> Self {
        let (status, _) = watch::channel(false);
        Self {
            config,
            credential,
            status: Arc::new(status),
            outbound: None,
            shutdown: None,
            task: None,
        }
    }

    /// Connected/disconnected, updated by the connection task.
    pub fn status(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    /// True while a connection task exists, connected or retrying.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start the connection task. Inbound acknowledgements go to `events`.
    pub fn connect(&mut self, events: mpsc::UnboundedSender<SessionEvent>) -> ConnectOutcome {
        if self.is_active() {
            debug!("session channel already active");
            return ConnectOutcome::AlreadyConnected;
        }

        let Some(token) = self.credential.token() else {
            warn!(
                cookie = self.credential.name(),
                "no access token found in cookies, not connecting"
            );
            return ConnectOutcome::MissingCredential;
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connection = Connection {
            config: self.config.clone(),
            token,
            status: self.status.clone(),
            events,
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };

        self.task = Some(tokio::spawn(connection.run()));
        self.outbound = Some(outbound_tx);
        self.shutdown = Some(shutdown_tx);
        info!(url = %self.config.url, "session channel activated");
        ConnectOutcome::Started
    }

    /// Tear down the connection. Safe to call when not connected.
    pub async fn disconnect(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        self.outbound = None;
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!("session channel task failed: {err}");
            }
            info!("session channel disconnected");
        }
        self.status.send_replace(false);
    }
}

impl Publisher for StompChannel {
    fn publish(&self, message: &Outbound) -> Result<(), ChannelError> {
        let destination = message.destination();
        let outbound = match &self.outbound {
            Some(outbound) if *self.status.borrow() => outbound,
            _ => {
                warn!(destination, "session channel is not connected, dropping message");
                return Err(ChannelError::NotConnected);
            }
        };
        let body = message.body()?;
        outbound
            .send(Publication { destination, body })
            .map_err(|_| ChannelError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        *self.status.borrow()
    }
}

impl Drop for StompChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum SessionEnd {
    ClosedByServer,
    Shutdown,
}

/// State owned by the background connection task.
struct Connection {
    config: ChannelConfig,
    token: String,
    status: Arc<watch::Sender<bool>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    outbound: mpsc::UnboundedReceiver<Publication>,
    shutdown: watch::Receiver<bool>,
}

impl Connection {
    async fn run(mut self) {
        while !*self.shutdown.borrow() {
            match self.session().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::ClosedByServer) => warn!("session channel closed by server"),
                Err(err) => error!("session channel error: {err}"),
            }
            self.status.send_replace(false);

            info!(delay = ?self.config.reconnect_delay, "reconnecting session channel");
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }
        self.status.send_replace(false);
    }

    async fn session(&mut self) -> Result<SessionEnd, ChannelError> {
        let url = self.config.url.clone();
        let connect = Frame::connect(self.config.host(), &self.token).encode();
        let handshake = async move {
            let (mut ws, _) = connect_async(url.as_str()).await?;
            ws.send(Message::Text(connect)).await?;
            await_connected(&mut ws).await?;
            Ok::<_, ChannelError>(ws)
        };

        let mut ws = tokio::select! {
            ws = handshake => ws?,
            _ = self.shutdown.changed() => return Ok(SessionEnd::Shutdown),
        };

        ws.send(Message::Text(
            Frame::subscribe(SUBSCRIPTION_ID, &self.config.topic).encode(),
        ))
        .await?;

        let mut stale = 0;
        while self.outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            warn!(stale, "dropping messages published before the connection dropped");
        }

        self.status.send_replace(true);
        info!(topic = %self.config.topic, "session channel connected");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    let _ = ws.send(Message::Text(Frame::disconnect().encode())).await;
                    let _ = ws.close(None).await;
                    return Ok(SessionEnd::Shutdown);
                }
                Some(publication) = self.outbound.recv() => {
                    debug!(destination = publication.destination, "publishing session message");
                    let frame = Frame::send(publication.destination, &self.token, publication.body);
                    ws.send(Message::Text(frame.encode())).await?;
                }
                incoming = ws.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.handle_frame(&text),
                        Err(_) => warn!("ignoring non UTF-8 binary message"),
                    },
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::ClosedByServer),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(err) => {
                warn!("ignoring malformed frame: {err}");
                return;
            }
        };

        match frame.command {
            FrameCommand::Message => match SessionEvent::from_body(&frame.body) {
                Ok(event) => {
                    debug!(?event, "pomodoro event");
                    if self.events.send(event).is_err() {
                        debug!("no session event handler, dropping event");
                    }
                }
                Err(err) => warn!("ignoring malformed pomodoro event: {err}"),
            },
            FrameCommand::Error => error!(
                message = frame.get("message").unwrap_or_default(),
                details = %frame.body,
                "broker error"
            ),
            other => debug!(command = %other, "ignoring frame"),
        }
    }
}

async fn await_connected<S>(ws: &mut S) -> Result<(), ChannelError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = ws.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match Frame::decode(&text)? {
            Some(frame) if frame.command == FrameCommand::Connected => {
                debug!(version = frame.get("version").unwrap_or_default(), "STOMP connected");
                return Ok(());
            }
            Some(frame) if frame.command == FrameCommand::Error => {
                let reason = frame
                    .get("message")
                    .map(str::to_string)
                    .unwrap_or(frame.body);
                return Err(ChannelError::Broker(reason));
            }
            _ => continue,
        }
    }
    Err(ChannelError::Broker(
        "connection closed during handshake".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::messages::ResetRequest;
    use crate::credential::ACCESS_TOKEN_COOKIE;

    #[test]
    fn host_is_taken_from_url() {
        assert_eq!(host_of("ws://localhost:8080/api/v1/auth/ws"), "localhost");
        assert_eq!(host_of("wss://api.example.com/ws?x=1"), "api.example.com");
        assert_eq!(host_of("ws://user@10.0.0.2:9000"), "10.0.0.2");
        assert_eq!(host_of("example.org"), "example.org");
    }

    #[tokio::test]
    async fn missing_cookie_does_not_connect() {
        let mut channel = StompChannel::new(
            ChannelConfig::new("ws://127.0.0.1:9/ws"),
            CookieSource::new(ACCESS_TOKEN_COOKIE),
        );
        let (events, _rx) = mpsc::unbounded_channel();

        assert_eq!(channel.connect(events), ConnectOutcome::MissingCredential);
        assert!(!channel.is_active());
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn publish_while_disconnected_is_dropped() {
        let channel = StompChannel::new(
            ChannelConfig::new("ws://127.0.0.1:9/ws"),
            CookieSource::new(ACCESS_TOKEN_COOKIE),
        );
        let result = channel.publish(&Outbound::Reset(ResetRequest { timer_id: 7 }));
        assert!(matches!(result, Err(ChannelError::NotConnected)));
        assert!(!channel.is_connected());
    }
}
