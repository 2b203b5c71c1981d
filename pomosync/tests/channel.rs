//! Session channel against an in-process STOMP broker.

use futures::{SinkExt, StreamExt};
use pomosync::channel::frame::{Frame, FrameCommand};
use pomosync::channel::messages::ResetRequest;
use pomosync::channel::{
    ChannelConfig, ConnectOutcome, Outbound, Publisher, SessionEvent, StompChannel, SESSION_TOPIC,
};
use pomosync::credential::{CookieSource, ACCESS_TOKEN_COOKIE};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const DROP_CLIENT: &str = "drop-client";

struct Broker {
    url: String,
    /// Every frame a client sent, in order.
    frames: mpsc::UnboundedReceiver<Frame>,
    /// Raw text pushed to the connected client.
    push: mpsc::UnboundedSender<String>,
    connections: Arc<AtomicUsize>,
}

impl Broker {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<String>();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut ws = accept_async(stream).await.unwrap();
                loop {
                    tokio::select! {
                        Some(text) = push_rx.recv() => {
                            if text == DROP_CLIENT {
                                let _ = ws.close(None).await;
                                break;
                            }
                            if ws.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        incoming = ws.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let Ok(Some(frame)) = Frame::decode(&text) else {
                                    continue;
                                };
                                if frame.command == FrameCommand::Connect {
                                    let connected = Frame::new(FrameCommand::Connected)
                                        .header("version", "1.2")
                                        .encode();
                                    ws.send(Message::Text(connected)).await.unwrap();
                                }
                                let _ = frames_tx.send(frame);
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        }
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}/api/v1/auth/ws/websocket"),
            frames,
            push,
            connections,
        }
    }

    async fn next_frame(&mut self) -> Frame {
        within(self.frames.recv()).await.expect("broker stopped")
    }

    fn push_message(&self, body: &str) {
        let frame = Frame::new(FrameCommand::Message)
            .header("destination", SESSION_TOPIC)
            .header("subscription", "sub-0")
            .header("message-id", "1")
            .header("content-type", "application/json")
            .body(body);
        self.push.send(frame.encode()).unwrap();
    }
}

async fn within<F: Future>(future: F) -> F::Output {
    timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

fn channel_for(broker: &Broker) -> StompChannel {
    let config = ChannelConfig {
        url: broker.url.clone(),
        topic: SESSION_TOPIC.to_string(),
        reconnect_delay: Duration::from_millis(100),
    };
    let cookies = CookieSource::new(ACCESS_TOKEN_COOKIE)
        .with_cookies("theme=dark; productivity_access_token=tok123");
    StompChannel::new(config, cookies)
}

#[tokio::test]
async fn handshake_subscribes_once_and_relays_frames() {
    let mut broker = Broker::start().await;
    let mut channel = channel_for(&broker);
    let mut status = channel.status();
    let (events_tx, mut events) = mpsc::unbounded_channel::<SessionEvent>();

    assert_eq!(channel.connect(events_tx.clone()), ConnectOutcome::Started);
    assert_eq!(channel.connect(events_tx), ConnectOutcome::AlreadyConnected);

    let connect = broker.next_frame().await;
    assert_eq!(connect.command, FrameCommand::Connect);
    assert_eq!(connect.get("Authorization"), Some("Bearer tok123"));
    assert_eq!(connect.get("host"), Some("127.0.0.1"));

    let subscribe = broker.next_frame().await;
    assert_eq!(subscribe.command, FrameCommand::Subscribe);
    assert_eq!(subscribe.get("destination"), Some(SESSION_TOPIC));

    within(status.wait_for(|connected| *connected)).await.unwrap();
    assert!(channel.is_connected());

    broker.push_message(r#"{"data":{"timerResponse":{"id":7},"sequenceResponse":{"id":42}}}"#);
    let event = within(events.recv()).await.unwrap();
    assert_eq!(event.timer_id(), Some(7));
    assert_eq!(event.sequence_id(), Some(42));

    channel
        .publish(&Outbound::Reset(ResetRequest { timer_id: 7 }))
        .unwrap();
    let send = broker.next_frame().await;
    assert_eq!(send.command, FrameCommand::Send);
    assert_eq!(send.get("destination"), Some("/app/pomodoro/reset"));
    assert_eq!(send.get("Authorization"), Some("Bearer tok123"));
    assert_eq!(send.get("content-type"), Some("application/json"));
    assert_eq!(send.body, r#"{"timerId":7}"#);

    channel.disconnect().await;
    assert_eq!(broker.next_frame().await.command, FrameCommand::Disconnect);
    assert!(!channel.is_connected());
    assert!(!channel.is_active());
    assert_eq!(broker.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let mut broker = Broker::start().await;
    let mut channel = channel_for(&broker);
    let mut status = channel.status();
    let (events_tx, mut events) = mpsc::unbounded_channel();

    channel.connect(events_tx);
    broker.next_frame().await;
    broker.next_frame().await;
    within(status.wait_for(|connected| *connected)).await.unwrap();

    broker.push.send("HELLO\n\n\0".to_string()).unwrap();
    broker.push_message("not json");
    broker.push_message(r#"{"data":{"sequenceResponse":{"id":5}}}"#);

    let event = within(events.recv()).await.unwrap();
    assert_eq!(event.timer_id(), None);
    assert_eq!(event.sequence_id(), Some(5));
    assert!(channel.is_connected());

    channel.disconnect().await;
}

#[tokio::test]
async fn reconnects_after_the_server_drops() {
    let mut broker = Broker::start().await;
    let mut channel = channel_for(&broker);
    let mut status = channel.status();
    let (events_tx, _events) = mpsc::unbounded_channel();

    channel.connect(events_tx);
    broker.next_frame().await;
    broker.next_frame().await;
    within(status.wait_for(|connected| *connected)).await.unwrap();

    broker.push.send(DROP_CLIENT.to_string()).unwrap();
    within(status.wait_for(|connected| !*connected)).await.unwrap();
    assert!(matches!(
        channel.publish(&Outbound::Stop),
        Err(pomosync::channel::ChannelError::NotConnected)
    ));

    assert_eq!(broker.next_frame().await.command, FrameCommand::Connect);
    assert_eq!(broker.next_frame().await.command, FrameCommand::Subscribe);
    within(status.wait_for(|connected| *connected)).await.unwrap();
    assert_eq!(broker.connections.load(Ordering::SeqCst), 2);

    channel.publish(&Outbound::Stop).unwrap();
    let send = broker.next_frame().await;
    assert_eq!(send.get("destination"), Some("/app/pomodoro/stop"));
    assert_eq!(send.body, "{}");

    channel.disconnect().await;
}
