use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::hub::{HubHandle, Viewer, ViewerId};

/// Mailbox size and liveness probing for viewer connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerSettings {
    pub mailbox_capacity: usize,
    /// Time between two pings
    pub probe_interval: Duration,
    /// Silence after which a viewer is disconnected; longer than `probe_interval`
    pub liveness_timeout: Duration,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            probe_interval: Duration::from_secs(5),
            liveness_timeout: Duration::from_secs(15),
        }
    }
}

/// Serves one viewer connection until it goes away
///
/// Registers a mailbox with the hub, then runs two independent loops:
/// a reader task that records pong frames as liveness acknowledgements and
/// ends on close or transport error, and the writer (this task) that drains
/// the mailbox into `sink` and pings on every probe tick. Either side ending
/// unregisters the viewer.
pub async fn run_viewer<S, R, E>(hub: HubHandle, settings: ViewerSettings, mut sink: S, stream: R)
where
    S: Sink<Message> + Unpin + Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (viewer, mut mailbox) = Viewer::new(settings.mailbox_capacity);
    let id = viewer.id();
    if let Err(e) = hub.register(viewer).await {
        tracing::warn!(viewer_id = %id, error = %e, "could not register viewer");
        return;
    }

    let (ack_tx, ack_rx) = watch::channel(Instant::now());
    let reader = tokio::spawn(read_acks(hub.clone(), id, stream, ack_tx));

    let mut probe = interval_at(
        Instant::now() + settings.probe_interval,
        settings.probe_interval,
    );
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = mailbox.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Text(frame.to_string())).await.is_err() {
                        tracing::debug!(viewer_id = %id, "viewer write failed");
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = probe.tick() => {
                let silent_for = ack_rx.borrow().elapsed();
                if silent_for > settings.liveness_timeout {
                    tracing::info!(viewer_id = %id, silent_ms = silent_for.as_millis() as u64, "viewer missed liveness window");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    tracing::debug!(viewer_id = %id, "viewer ping failed");
                    break;
                }
            }
        }
    }

    let _ = hub.unregister(id).await;
    reader.abort();
}

async fn read_acks<R, E>(hub: HubHandle, id: ViewerId, mut stream: R, acks: watch::Sender<Instant>)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Pong(_)) => {
                acks.send_replace(Instant::now());
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(viewer_id = %id, error = %e, "viewer transport error");
                break;
            }
        }
    }
    let _ = hub.unregister(id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Broadcaster, Fields, Hub};
    use futures::channel::mpsc;
    use std::convert::Infallible;

    fn settings() -> ViewerSettings {
        ViewerSettings {
            mailbox_capacity: 16,
            probe_interval: Duration::from_secs(5),
            liveness_timeout: Duration::from_secs(15),
        }
    }

    async fn next_text(outbound: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
        loop {
            match outbound.next().await.expect("viewer frame") {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_broadcasts_as_text_frames() {
        let (hub, _task) = Hub::spawn(16);
        let (sink, mut outbound) = mpsc::unbounded::<Message>();
        let (_inbound_tx, inbound) = mpsc::unbounded::<Result<Message, Infallible>>();
        tokio::spawn(run_viewer(hub.clone(), settings(), sink, inbound));

        assert_eq!(next_text(&mut outbound).await["type"], "register");
        hub.broadcast("hello", "system log", false, Fields::new()).await;
        assert_eq!(next_text(&mut outbound).await["message"], "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_viewer_is_disconnected() {
        let (hub, _task) = Hub::spawn(16);
        let (sink, mut outbound) = mpsc::unbounded::<Message>();
        let (_inbound_tx, inbound) = mpsc::unbounded::<Result<Message, Infallible>>();
        let session = tokio::spawn(run_viewer(hub.clone(), settings(), sink, inbound));

        session.await.unwrap();

        assert_eq!(hub.live_count().await.unwrap(), 0);
        let mut pings = 0;
        let mut closed = false;
        while let Ok(Some(frame)) = outbound.try_next() {
            match frame {
                Message::Ping(_) => pings += 1,
                Message::Close(_) => closed = true,
                _ => {}
            }
        }
        assert_eq!(pings, 3);
        assert!(closed);
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_keep_the_viewer_alive() {
        let (hub, _task) = Hub::spawn(16);
        let (sink, mut outbound) = mpsc::unbounded::<Message>();
        let (inbound_tx, inbound) = mpsc::unbounded::<Result<Message, Infallible>>();
        tokio::spawn(run_viewer(hub.clone(), settings(), sink, inbound));

        let mut pings = 0;
        while pings < 6 {
            if let Message::Ping(_) = outbound.next().await.unwrap() {
                pings += 1;
                inbound_tx.unbounded_send(Ok(Message::Pong(Vec::new()))).unwrap();
            }
        }

        assert_eq!(hub.live_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_transport_unregisters() {
        let (hub, _task) = Hub::spawn(16);
        let (sink, mut outbound) = mpsc::unbounded::<Message>();
        let (inbound_tx, inbound) = mpsc::unbounded::<Result<Message, Infallible>>();
        let session = tokio::spawn(run_viewer(hub.clone(), settings(), sink, inbound));

        next_text(&mut outbound).await;
        inbound_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        session.await.unwrap();

        assert_eq!(hub.live_count().await.unwrap(), 0);
    }
}
