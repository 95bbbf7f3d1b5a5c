use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::broadcaster::{Broadcaster, Fields};
use super::envelope::{build_envelope, encode};
use super::errors::HubError;

/// Identity of a connected viewer
pub type ViewerId = Uuid;

/// A payload queued for one viewer
pub type Frame = Arc<str>;

/// Frame sent to a viewer right after it registers
const REGISTERED_FRAME: &str = r#"{"type":"register","message":"Client registered!"}"#;

/// A viewer as seen by the hub: an id and the sending side of its mailbox
#[derive(Debug)]
pub struct Viewer {
    id: ViewerId,
    mailbox: mpsc::Sender<Frame>,
}

impl Viewer {
    /// Creates a viewer with a bounded mailbox of `capacity` frames
    ///
    /// Returns the receiving side, which the viewer's writer drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (mailbox, frames) = mpsc::channel(capacity.max(1));
        let viewer = Self {
            id: Uuid::new_v4(),
            mailbox,
        };
        (viewer, frames)
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }
}

enum Command {
    Register(Viewer),
    Unregister(ViewerId),
    Broadcast(Frame),
    LiveCount(oneshot::Sender<usize>),
}

/// The coordinator owning every viewer mailbox
///
/// Runs as exactly one task; all mutations arrive as commands, so the
/// viewer set needs no lock. The task ends once every [`HubHandle`] is
/// dropped.
pub struct Hub {
    viewers: HashMap<ViewerId, mpsc::Sender<Frame>>,
    commands: mpsc::Receiver<Command>,
}

impl Hub {
    /// Creates the hub and a handle to it; `capacity` bounds pending commands
    pub fn new(capacity: usize) -> (Self, HubHandle) {
        let (tx, commands) = mpsc::channel(capacity.max(1));
        let hub = Self {
            viewers: HashMap::new(),
            commands,
        };
        (hub, HubHandle { tx })
    }

    /// Spawns the coordinator loop, returning a handle to it
    pub fn spawn(capacity: usize) -> (HubHandle, tokio::task::JoinHandle<()>) {
        let (hub, handle) = Self::new(capacity);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// Processes commands until every handle is gone
    pub async fn run(mut self) {
        tracing::info!("hub started");
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Register(viewer) => self.register(viewer),
                Command::Unregister(id) => self.unregister(id),
                Command::Broadcast(frame) => self.fan_out(frame),
                Command::LiveCount(reply) => {
                    let _ = reply.send(self.viewers.len());
                }
            }
        }
        tracing::info!(viewers = self.viewers.len(), "hub stopped");
    }

    fn register(&mut self, viewer: Viewer) {
        let Viewer { id, mailbox } = viewer;
        if mailbox.try_send(Arc::from(REGISTERED_FRAME)).is_err() {
            tracing::warn!(viewer_id = %id, "viewer gone before registration completed");
            return;
        }
        self.viewers.insert(id, mailbox);
        tracing::info!(viewer_id = %id, viewers = self.viewers.len(), "viewer registered");
    }

    fn unregister(&mut self, id: ViewerId) {
        // Dropping the sender closes the mailbox
        if self.viewers.remove(&id).is_some() {
            tracing::info!(viewer_id = %id, viewers = self.viewers.len(), "viewer unregistered");
        }
    }

    fn fan_out(&mut self, frame: Frame) {
        self.viewers.retain(|id, mailbox| match mailbox.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(viewer_id = %id, "viewer mailbox full, dropping viewer");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(viewer_id = %id, "viewer mailbox closed, dropping viewer");
                false
            }
        });
    }
}

/// Cloneable entry point to the hub
#[derive(Clone, Debug)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
}

impl HubHandle {
    /// Adds a viewer; it immediately receives a "registered" event
    pub async fn register(&self, viewer: Viewer) -> Result<(), HubError> {
        self.send(Command::Register(viewer)).await
    }

    /// Removes a viewer and closes its mailbox; unknown ids are ignored
    pub async fn unregister(&self, id: ViewerId) -> Result<(), HubError> {
        self.send(Command::Unregister(id)).await
    }

    /// Number of viewers currently registered
    pub async fn live_count(&self) -> Result<usize, HubError> {
        let (reply, count) = oneshot::channel();
        self.send(Command::LiveCount(reply)).await?;
        count.await.map_err(|_| HubError::Closed)
    }

    /// Builds, encodes and queues an event for every viewer
    pub async fn publish(
        &self,
        message: &str,
        category: &str,
        include_time: bool,
        extra: Fields,
    ) -> Result<(), HubError> {
        let time = include_time.then(Local::now);
        let envelope = build_envelope(message, category, time, extra)?;
        let frame: Frame = Arc::from(encode(&envelope)?);
        self.send(Command::Broadcast(frame)).await
    }

    async fn send(&self, command: Command) -> Result<(), HubError> {
        self.tx.send(command).await.map_err(|_| HubError::Closed)
    }
}

#[async_trait]
impl Broadcaster for HubHandle {
    async fn broadcast(&self, message: &str, category: &str, include_time: bool, extra: Fields) {
        match self.publish(message, category, include_time, extra).await {
            Ok(()) => {}
            Err(HubError::ReservedKey(key)) => {
                tracing::error!(key = %key, category, "broadcast contains reserved key, dropped");
            }
            Err(e) => {
                tracing::warn!(error = %e, category, "broadcast not delivered");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::fields;
    use serde_json::{json, Value};

    fn decode(frame: &Frame) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn register_sends_acknowledgement() {
        let (hub, _task) = Hub::spawn(16);
        let (viewer, mut frames) = Viewer::new(8);
        hub.register(viewer).await.unwrap();

        let ack = decode(&frames.recv().await.unwrap());
        assert_eq!(ack["type"], "register");
        assert_eq!(ack["message"], "Client registered!");
        assert_eq!(hub.live_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_viewer_in_order() {
        let (hub, _task) = Hub::spawn(16);
        let (a, mut frames_a) = Viewer::new(8);
        let (b, mut frames_b) = Viewer::new(8);
        hub.register(a).await.unwrap();
        hub.register(b).await.unwrap();

        hub.broadcast("one", "system log", false, Fields::new()).await;
        hub.broadcast("two", "system log", true, fields(json!({"id": 7}))).await;

        for frames in [&mut frames_a, &mut frames_b] {
            assert_eq!(decode(&frames.recv().await.unwrap())["type"], "register");
            assert_eq!(decode(&frames.recv().await.unwrap())["message"], "one");
            let second = decode(&frames.recv().await.unwrap());
            assert_eq!(second["message"], "two");
            assert_eq!(second["id"], 7);
            assert!(second["time"].is_string());
        }
    }

    #[tokio::test]
    async fn reserved_key_reaches_no_viewer() {
        let (hub, _task) = Hub::spawn(16);
        let (viewer, mut frames) = Viewer::new(8);
        hub.register(viewer).await.unwrap();
        frames.recv().await.unwrap();

        hub.broadcast("bad", "system log", true, fields(json!({"type": "x"})))
            .await;
        hub.broadcast("worse", "system log", true, fields(json!({"message": "x"})))
            .await;
        hub.broadcast("good", "system log", true, Fields::new()).await;

        let next = decode(&frames.recv().await.unwrap());
        assert_eq!(next["message"], "good");
    }

    #[tokio::test]
    async fn full_mailbox_drops_only_that_viewer() {
        let (hub, _task) = Hub::spawn(16);
        // The registration ack fills a one-frame mailbox
        let (slow, mut slow_frames) = Viewer::new(1);
        let (fast, mut fast_frames) = Viewer::new(8);
        hub.register(slow).await.unwrap();
        hub.register(fast).await.unwrap();

        hub.broadcast("overflow", "system log", false, Fields::new()).await;
        assert_eq!(hub.live_count().await.unwrap(), 1);

        assert_eq!(decode(&slow_frames.recv().await.unwrap())["type"], "register");
        assert!(slow_frames.recv().await.is_none(), "mailbox closed after drop");

        fast_frames.recv().await.unwrap();
        assert_eq!(decode(&fast_frames.recv().await.unwrap())["message"], "overflow");
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_closes_mailbox() {
        let (hub, _task) = Hub::spawn(16);
        let (viewer, mut frames) = Viewer::new(8);
        let id = viewer.id();
        hub.register(viewer).await.unwrap();

        hub.unregister(id).await.unwrap();
        hub.unregister(id).await.unwrap();

        assert_eq!(hub.live_count().await.unwrap(), 0);
        frames.recv().await.unwrap();
        assert!(frames.recv().await.is_none());
    }

    #[tokio::test]
    async fn handle_reports_closed_hub() {
        let (hub, handle) = Hub::new(4);
        drop(hub);

        assert!(matches!(handle.live_count().await, Err(HubError::Closed)));
    }
}
