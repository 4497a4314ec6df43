use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream::BoxStream, SinkExt, StreamExt};
use shared::{
    domain::{ConnectionState, ConversationId, UserId},
    protocol::{ClientRequest, OutgoingMessage, ServerEvent},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::ClientSettings,
    error::ChannelError,
    events::{EventBus, EventKind, Subscription},
};

pub type ChannelInbox = mpsc::UnboundedReceiver<ServerEvent>;

/// The inbound stream ending or yielding an error means the link is gone.
pub struct ChannelLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: BoxStream<'static, Result<String>>,
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self) -> Result<ChannelLink>;
}

pub struct MissingChannelConnector;

#[async_trait]
impl ChannelConnector for MissingChannelConnector {
    async fn connect(&self) -> Result<ChannelLink> {
        Err(anyhow!("real-time channel is unavailable"))
    }
}

pub fn websocket_url(server_url: &str, user_id: &UserId) -> Result<Url, ChannelError> {
    let mut url =
        Url::parse(server_url).map_err(|err| ChannelError::InvalidUrl(format!("{server_url}: {err}")))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ChannelError::InvalidUrl(format!(
                "server_url must use http or https, got {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::InvalidUrl(server_url.to_string()))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("user_id", user_id.as_str());
    Ok(url)
}

pub struct WebSocketConnector {
    url: Url,
}

impl WebSocketConnector {
    pub fn new(server_url: &str, user_id: &UserId) -> Result<Self, ChannelError> {
        Ok(Self {
            url: websocket_url(server_url, user_id)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(&self) -> Result<ChannelLink> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {}", self.url))?;
        let (mut ws_writer, ws_reader) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(err) = ws_writer.send(WsMessage::Text(text)).await {
                    warn!("channel: websocket send failed: {err}");
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let inbound = ws_reader
            .filter_map(|frame| async move {
                match frame {
                    Ok(WsMessage::Text(text)) => Some(Ok(text)),
                    Ok(WsMessage::Close(_)) => Some(Err(anyhow!("websocket closed by server"))),
                    Ok(_) => None,
                    Err(err) => Some(Err(anyhow!("websocket receive failed: {err}"))),
                }
            })
            .boxed();

        Ok(ChannelLink { outbound, inbound })
    }
}

#[derive(Default)]
struct ChannelState {
    outbound: Option<mpsc::UnboundedSender<String>>,
    rooms: HashSet<ConversationId>,
    supervisor: Option<JoinHandle<()>>,
    shutdown: bool,
}

pub struct RealtimeChannel {
    settings: ClientSettings,
    connector: Arc<dyn ChannelConnector>,
    bus: EventBus,
    inbox: mpsc::UnboundedSender<ServerEvent>,
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<ChannelState>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl RealtimeChannel {
    pub fn new(
        settings: ClientSettings,
        connector: Arc<dyn ChannelConnector>,
    ) -> (Arc<Self>, ChannelInbox) {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let channel = Arc::new(Self {
            settings,
            connector,
            bus: EventBus::new(),
            inbox,
            state_tx,
            inner: Mutex::new(ChannelState::default()),
            connect_lock: tokio::sync::Mutex::new(()),
        });
        (channel, inbox_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn joined_rooms(&self) -> Vec<ConversationId> {
        let mut rooms: Vec<_> = self.lock_state().rooms.iter().cloned().collect();
        rooms.sort();
        rooms
    }

    pub async fn connect(self: &Arc<Self>) -> Result<(), ChannelError> {
        let _connecting = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let link = self.connector.connect().await.map_err(ChannelError::Connect)?;

        let previous = {
            let mut guard = self.lock_state();
            guard.shutdown = false;
            guard.supervisor.take()
        };
        if let Some(previous) = previous {
            previous.abort();
        }

        self.install_link(link.outbound);
        let supervisor = tokio::spawn(Self::supervise(Arc::downgrade(self), link.inbound));
        self.lock_state().supervisor = Some(supervisor);
        Ok(())
    }

    /// Releases the socket and stops any reconnection in progress. Joined rooms
    /// are kept and re-joined by the next `connect`.
    pub fn disconnect(&self) {
        let supervisor = {
            let mut guard = self.lock_state();
            guard.shutdown = true;
            guard.outbound = None;
            guard.supervisor.take()
        };
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn join_room(&self, conversation_id: &ConversationId) {
        let newly_joined = self.lock_state().rooms.insert(conversation_id.clone());
        if newly_joined {
            let _ = self.emit(ClientRequest::JoinRoom {
                conversation_id: conversation_id.clone(),
            });
        }
    }

    pub fn leave_room(&self, conversation_id: &ConversationId) {
        let was_joined = self.lock_state().rooms.remove(conversation_id);
        if was_joined {
            let _ = self.emit(ClientRequest::LeaveRoom {
                conversation_id: conversation_id.clone(),
            });
        }
    }

    pub fn send(&self, message: OutgoingMessage) -> Result<(), ChannelError> {
        self.emit(ClientRequest::SendMessage(message))
    }

    pub fn start_typing(&self, conversation_id: &ConversationId) -> Result<(), ChannelError> {
        self.emit(ClientRequest::Typing {
            conversation_id: conversation_id.clone(),
        })
    }

    pub fn stop_typing(&self, conversation_id: &ConversationId) -> Result<(), ChannelError> {
        self.emit(ClientRequest::StoppedTyping {
            conversation_id: conversation_id.clone(),
        })
    }

    fn emit(&self, request: ClientRequest) -> Result<(), ChannelError> {
        let frame = serde_json::to_string(&request)
            .map_err(|err| ChannelError::Connect(anyhow!("failed to encode frame: {err}")))?;
        let mut guard = self.lock_state();
        let Some(outbound) = guard.outbound.as_ref() else {
            debug!(frame = %frame, "channel: dropping frame while disconnected");
            return Err(ChannelError::NotConnected);
        };
        if outbound.send(frame).is_err() {
            guard.outbound = None;
            drop(guard);
            warn!("channel: writer is gone; treating channel as disconnected");
            self.set_state(ConnectionState::Disconnected);
            return Err(ChannelError::NotConnected);
        }
        Ok(())
    }

    fn install_link(&self, outbound: mpsc::UnboundedSender<String>) {
        let rooms: Vec<ConversationId> = {
            let mut guard = self.lock_state();
            guard.outbound = Some(outbound);
            guard.rooms.iter().cloned().collect()
        };
        for conversation_id in rooms {
            let _ = self.emit(ClientRequest::JoinRoom { conversation_id });
        }
        self.set_state(ConnectionState::Connected);
    }

    async fn supervise(channel: Weak<Self>, mut inbound: BoxStream<'static, Result<String>>) {
        loop {
            while let Some(frame) = inbound.next().await {
                let Some(channel) = channel.upgrade() else {
                    return;
                };
                match frame {
                    Ok(text) => channel.handle_frame(&text),
                    Err(err) => {
                        warn!("channel: link lost: {err:#}");
                        break;
                    }
                }
            }

            let Some(link) = Self::reconnect(&channel).await else {
                return;
            };
            let Some(channel) = channel.upgrade() else {
                return;
            };
            channel.install_link(link.outbound);
            inbound = link.inbound;
        }
    }

    async fn reconnect(channel: &Weak<Self>) -> Option<ChannelLink> {
        let (settings, connector) = {
            let channel = channel.upgrade()?;
            channel.lock_state().outbound = None;
            channel.set_state(ConnectionState::Disconnected);
            (channel.settings.clone(), Arc::clone(&channel.connector))
        };

        for attempt in 1..=settings.reconnect_attempts {
            tokio::time::sleep(settings.reconnect_backoff(attempt)).await;
            if channel.upgrade()?.lock_state().shutdown {
                return None;
            }
            match connector.connect().await {
                Ok(link) => {
                    info!(attempt, "channel: reconnected");
                    return Some(link);
                }
                Err(err) => warn!(attempt, "channel: reconnect failed: {err:#}"),
            }
        }
        warn!(
            attempts = settings.reconnect_attempts,
            "channel: giving up on reconnection; staying disconnected"
        );
        None
    }

    fn handle_frame(&self, text: &str) {
        let event = match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => event,
            Err(err) => {
                warn!("channel: invalid server event: {err}");
                return;
            }
        };
        self.bus.dispatch(&event);
        if self.inbox.send(event).is_err() {
            debug!("channel: inbox closed; event dropped");
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            match next {
                ConnectionState::Connected => info!("channel: connected"),
                ConnectionState::Disconnected => warn!("channel: disconnected"),
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        let state = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.outbound = None;
        if let Some(supervisor) = state.supervisor.take() {
            supervisor.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
