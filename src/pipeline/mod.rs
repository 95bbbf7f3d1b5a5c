// Sighting pipeline
//
// The long-running bus subscribers: headquarters turning sightings into
// capture tasks, the dead-letter monitor counting missed tasks, and team
// relays echoing the sightings they are interested in.

pub mod dead_letter;
pub mod dispatcher;
pub mod errors;
pub mod team;

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use dead_letter::{DeadLetterMonitor, ESCAPE_LOG};
pub use dispatcher::{Dispatcher, DispatcherSettings, DISPATCH_LOG};
pub use errors::{DispatchError, DispatchResult, TeamError, TeamResult};
pub use team::{TeamRelay, TeamRoster, TEAM_LOG, TEAM_SIGHTING};

/// A spawned subscriber loop and the token that stops it
#[derive(Debug)]
pub struct PipelineTask {
    label: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PipelineTask {
    /// Spawns `run` with a fresh cancellation token
    pub fn spawn<F, Fut>(label: &'static str, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(cancel.clone()));
        Self {
            label,
            cancel,
            handle,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the loop and waits for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(task = self.label, error = %e, "pipeline task failed");
        } else {
            tracing::debug!(task = self.label, "pipeline task stopped");
        }
    }
}
