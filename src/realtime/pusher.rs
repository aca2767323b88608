//! Pusher protocol (v7) client over a WebSocket.
//!
//! One background task owns the socket. It answers `pusher:ping`, turns
//! subscribe/unsubscribe commands into protocol frames (authorizing private
//! channels against the backend first) and dispatches every channel event to
//! the shared handler registry. There is no reconnection: once the socket
//! closes the connection stays closed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::{Broadcaster, Callback, HandlerId, HandlerRegistry};
use crate::config::ClientConfig;
use crate::errors::RealtimeError;
use crate::http::HttpClient;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const PRIVATE_PREFIX: &str = "private-";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ConnectionEstablished {
    socket_id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelAuth {
    auth: String,
}

/// The service double-encodes `data` as a JSON string; unwrap it when it parses.
fn decode_data(data: Value) -> Value {
    match data {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

fn parse_established(text: &str) -> Result<String, RealtimeError> {
    let frame: Frame = serde_json::from_str(text)
        .map_err(|e| RealtimeError::Protocol(format!("invalid handshake frame: {}", e)))?;
    if frame.event != "pusher:connection_established" {
        return Err(RealtimeError::Protocol(format!(
            "expected pusher:connection_established, got {}",
            frame.event
        )));
    }
    let established: ConnectionEstablished = serde_json::from_value(decode_data(frame.data))
        .map_err(|e| RealtimeError::Protocol(format!("invalid connection data: {}", e)))?;
    Ok(established.socket_id)
}

enum Command {
    Subscribe(String),
    Unsubscribe(String),
    Close,
}

pub struct PusherConnection {
    registry: Arc<HandlerRegistry>,
    commands: mpsc::UnboundedSender<Command>,
    socket_id: String,
    closed: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl PusherConnection {
    pub async fn connect(config: &ClientConfig, http: HttpClient) -> Result<Self, RealtimeError> {
        Self::connect_to(&config.realtime_url(), &config.auth_endpoint(), http).await
    }

    pub async fn connect_to(
        url: &str,
        auth_endpoint: &str,
        http: HttpClient,
    ) -> Result<Self, RealtimeError> {
        debug!(url, "connecting to realtime service");
        let connect_err = |message: String| RealtimeError::Connect {
            url: url.to_string(),
            message,
        };
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        let (sink, mut stream) = socket.split();

        let socket_id = match tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => parse_established(&text)?,
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return Err(RealtimeError::Closed),
            Ok(Some(Ok(_))) => {
                return Err(RealtimeError::Protocol("unexpected frame during handshake".into()));
            }
            Ok(Some(Err(e))) => return Err(connect_err(e.to_string())),
            Err(_) => return Err(connect_err("timed out waiting for the handshake".into())),
        };
        info!(%socket_id, "realtime connected");

        let registry = Arc::new(HandlerRegistry::default());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed) = watch::channel(false);
        let worker = Worker {
            sink,
            stream,
            commands: command_rx,
            registry: registry.clone(),
            http,
            auth_endpoint: auth_endpoint.to_string(),
            socket_id: socket_id.clone(),
            closed: closed_tx,
        };
        let task = tokio::spawn(worker.run());

        Ok(Self {
            registry,
            commands,
            socket_id,
            closed,
            task,
        })
    }

    pub fn socket_id(&self) -> &str {
        &self.socket_id
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.task.is_finished()
    }

    /// Resolves once the socket is gone, whichever side closed it.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        // A dropped sender means the worker is gone as well.
        let _ = closed.wait_for(|c| *c).await;
    }

    /// Close the socket and wait for the worker to finish.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(Command::Close);
        self.closed().await;
    }
}

impl Broadcaster for PusherConnection {
    fn bind(&self, channel: &str, event: &str, callback: Callback) -> HandlerId {
        let (id, first) = self.registry.bind(channel, event, callback);
        if first && self.commands.send(Command::Subscribe(channel.to_string())).is_err() {
            warn!(channel, "realtime connection closed; binding will never fire");
        }
        id
    }

    fn unbind(&self, channel: &str, id: HandlerId) {
        if self.registry.unbind(channel, id) {
            let _ = self.commands.send(Command::Unsubscribe(channel.to_string()));
        }
    }
}

impl Drop for PusherConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Incoming {
    Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Command(Option<Command>),
}

struct Worker {
    sink: SplitSink<Socket, Message>,
    stream: SplitStream<Socket>,
    commands: mpsc::UnboundedReceiver<Command>,
    registry: Arc<HandlerRegistry>,
    http: HttpClient,
    auth_endpoint: String,
    socket_id: String,
    closed: watch::Sender<bool>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let incoming = tokio::select! {
                frame = self.stream.next() => Incoming::Frame(frame),
                command = self.commands.recv() => Incoming::Command(command),
            };
            match incoming {
                Incoming::Frame(Some(Ok(Message::Text(text)))) => self.handle_text(&text).await,
                Incoming::Frame(Some(Ok(Message::Close(_))) | None) => {
                    info!("realtime connection closed by server");
                    break;
                }
                Incoming::Frame(Some(Ok(_))) => {}
                Incoming::Frame(Some(Err(e))) => {
                    warn!(error = %e, "realtime connection failed");
                    break;
                }
                Incoming::Command(Some(Command::Subscribe(channel))) => self.subscribe(&channel).await,
                Incoming::Command(Some(Command::Unsubscribe(channel))) => {
                    debug!(%channel, "leaving channel");
                    self.send(json!({"event": "pusher:unsubscribe", "data": {"channel": channel}}))
                        .await;
                }
                Incoming::Command(Some(Command::Close) | None) => {
                    let _ = self.sink.send(Message::Close(None)).await;
                    debug!("realtime connection closed locally");
                    break;
                }
            }
        }
        let _ = self.closed.send(true);
    }

    async fn handle_text(&mut self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ignoring malformed realtime frame");
                return;
            }
        };
        match frame.event.as_str() {
            "pusher:ping" => self.send(json!({"event": "pusher:pong", "data": {}})).await,
            "pusher:error" => warn!(data = %frame.data, "realtime service reported an error"),
            "pusher_internal:subscription_succeeded" => {
                debug!(channel = ?frame.channel, "channel joined");
            }
            event => match frame.channel {
                Some(channel) => {
                    let payload = decode_data(frame.data);
                    let handled = self.registry.dispatch(&channel, event, &payload);
                    debug!(%channel, event, handled, "realtime event");
                }
                None => debug!(event, "ignoring event without channel"),
            },
        }
    }

    async fn subscribe(&mut self, channel: &str) {
        let mut data = json!({ "channel": channel });
        if channel.starts_with(PRIVATE_PREFIX) {
            match self.authorize(channel).await {
                Ok(auth) => data["auth"] = Value::String(auth),
                Err(e) => {
                    // The next binding on this channel starts a fresh join.
                    let dropped = self.registry.forget(channel);
                    warn!(error = %e, dropped, "not joining channel");
                    return;
                }
            }
        }
        debug!(channel, "joining channel");
        self.send(json!({"event": "pusher:subscribe", "data": data})).await;
    }

    async fn authorize(&self, channel: &str) -> Result<String, RealtimeError> {
        let body: ChannelAuth = self
            .http
            .post_form_absolute(
                &self.auth_endpoint,
                &[("socket_id", self.socket_id.as_str()), ("channel_name", channel)],
            )
            .await
            .map_err(|source| RealtimeError::Authorization {
                channel: channel.to_string(),
                source,
            })?;
        Ok(body.auth)
    }

    async fn send(&mut self, frame: Value) {
        if let Err(e) = self.sink.send(Message::Text(frame.to_string())).await {
            warn!(error = %e, "failed to send realtime frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{Scope, TASK_UPDATED, subscribe};
    use crate::session::Session;
    use crate::storage::Storage;
    use crate::test_support::MockBackend;
    use axum::extract::Form;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    fn text(value: Value) -> Message {
        Message::Text(value.to_string())
    }

    async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(t))) => return serde_json::from_str(&t).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    }

    #[test]
    fn test_decode_data_unwraps_string_payloads() {
        assert_eq!(decode_data(json!("{\"a\":1}")), json!({"a": 1}));
        assert_eq!(decode_data(json!("plain")), json!("plain"));
        assert_eq!(decode_data(json!({"b": 2})), json!({"b": 2}));
    }

    #[test]
    fn test_parse_established() {
        let frame = json!({
            "event": "pusher:connection_established",
            "data": "{\"socket_id\":\"123.456\",\"activity_timeout\":120}"
        });
        assert_eq!(parse_established(&frame.to_string()).unwrap(), "123.456");
        assert!(parse_established(r#"{"event":"pusher:error","data":{}}"#).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_authorize_dispatch_and_leave() {
        let auth = Router::new().route(
            "/broadcasting/auth",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                Json(json!({"auth": format!("key:{}:{}", form["socket_id"], form["channel_name"])}))
            }),
        );
        let auth_backend = MockBackend::start(auth).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_url = format!("ws://{}/app/local", listener.local_addr().unwrap());
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<Value>();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(text(json!({
                "event": "pusher:connection_established",
                "data": "{\"socket_id\":\"1.2\"}"
            })))
            .await
            .unwrap();

            let subscribe = next_json(&mut ws).await;
            frames_tx.send(subscribe.clone()).unwrap();
            let channel = subscribe["data"]["channel"].as_str().unwrap().to_string();
            ws.send(text(json!({"event": "pusher:ping", "data": {}}))).await.unwrap();
            frames_tx.send(next_json(&mut ws).await).unwrap();
            ws.send(text(json!({
                "event": "task.updated",
                "channel": channel,
                "data": "{\"task\":{\"id\":7}}"
            })))
            .await
            .unwrap();

            frames_tx.send(next_json(&mut ws).await).unwrap();
        });

        let session = Arc::new(Session::new(Arc::new(Storage::in_memory())));
        let http = HttpClient::new(&auth_backend.url(), session);
        let endpoint = format!("{}/broadcasting/auth", auth_backend.url());
        let connection = Arc::new(PusherConnection::connect_to(&ws_url, &endpoint, http).await.unwrap());
        assert_eq!(connection.socket_id(), "1.2");

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Value>();
        let mut sub = subscribe(connection.clone(), Scope::Project(3), &[TASK_UPDATED], move |_, payload| {
            let _ = events_tx.send(payload.clone());
        });

        let subscribe_frame = frames_rx.recv().await.unwrap();
        assert_eq!(subscribe_frame["event"], "pusher:subscribe");
        assert_eq!(subscribe_frame["data"]["channel"], "private-project.3");
        assert_eq!(subscribe_frame["data"]["auth"], "key:1.2:private-project.3");

        let pong = frames_rx.recv().await.unwrap();
        assert_eq!(pong["event"], "pusher:pong");

        let payload = events_rx.recv().await.unwrap();
        assert_eq!(payload["task"]["id"], 7);

        sub.unsubscribe();
        let leave = frames_rx.recv().await.unwrap();
        assert_eq!(leave["event"], "pusher:unsubscribe");
        assert_eq!(leave["data"]["channel"], "private-project.3");

        server.await.unwrap();
        connection.closed().await;
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_failed_authorization_allows_a_later_join() {
        use axum::extract::State;
        use axum::http::StatusCode;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let attempts = Arc::new(AtomicUsize::new(0));
        let auth = Router::new()
            .route(
                "/broadcasting/auth",
                post(
                    |State(attempts): State<Arc<AtomicUsize>>, Form(form): Form<HashMap<String, String>>| async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            return (StatusCode::FORBIDDEN, Json(json!({"message": "Forbidden"})));
                        }
                        (StatusCode::OK, Json(json!({"auth": format!("key:{}", form["channel_name"])})))
                    },
                ),
            )
            .with_state(attempts.clone());
        let auth_backend = MockBackend::start(auth).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_url = format!("ws://{}/app/local", listener.local_addr().unwrap());
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<Value>();
        let _server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(text(json!({
                "event": "pusher:connection_established",
                "data": "{\"socket_id\":\"1.2\"}"
            })))
            .await
            .unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(t) = message
                    && frames_tx.send(serde_json::from_str(&t).unwrap()).is_err()
                {
                    break;
                }
            }
        });

        let session = Arc::new(Session::new(Arc::new(Storage::in_memory())));
        let http = HttpClient::new(&auth_backend.url(), session);
        let endpoint = format!("{}/broadcasting/auth", auth_backend.url());
        let connection = Arc::new(PusherConnection::connect_to(&ws_url, &endpoint, http).await.unwrap());

        let _rejected = subscribe(connection.clone(), Scope::Project(3), &[TASK_UPDATED], |_, _| {});
        tokio::time::timeout(Duration::from_secs(5), async {
            while !connection.registry.channels().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        let _joined = subscribe(connection.clone(), Scope::Project(3), &[TASK_UPDATED], |_, _| {});
        let frame = frames_rx.recv().await.unwrap();
        assert_eq!(frame["event"], "pusher:subscribe");
        assert_eq!(frame["data"]["channel"], "private-project.3");
        assert_eq!(frame["data"]["auth"], "key:private-project.3");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let session = Arc::new(Session::new(Arc::new(Storage::in_memory())));
        let http = HttpClient::new("http://127.0.0.1:9", session);
        let result =
            PusherConnection::connect_to("ws://127.0.0.1:9/app/local", "http://127.0.0.1:9/auth", http).await;
        assert!(matches!(result, Err(RealtimeError::Connect { .. })));
    }
}
