use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::broadcaster::{Broadcaster, Fields};
use super::envelope::build_envelope;

/// Broadcaster that keeps every accepted envelope for assertions
#[derive(Default)]
pub(crate) struct RecordingBroadcaster {
    events: Mutex<Vec<Fields>>,
}

impl RecordingBroadcaster {
    pub(crate) fn events(&self) -> Vec<Fields> {
        self.events.lock().unwrap().clone()
    }

    /// Envelopes whose `status` field equals `status`
    pub(crate) fn with_status(&self, status: &str) -> Vec<Fields> {
        self.events()
            .into_iter()
            .filter(|e| e.get("status") == Some(&Value::from(status)))
            .collect()
    }

    pub(crate) fn of_type(&self, category: &str) -> Vec<Fields> {
        self.events()
            .into_iter()
            .filter(|e| e.get("type") == Some(&Value::from(category)))
            .collect()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(&self, message: &str, category: &str, _include_time: bool, extra: Fields) {
        if let Ok(envelope) = build_envelope(message, category, None, extra) {
            self.events.lock().unwrap().push(envelope);
        }
    }
}
