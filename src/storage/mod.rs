//! Encrypted local storage for score and alert events.

mod encrypted;

pub use encrypted::SecureStore;

use crate::feed::FeedEvent;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

/// Persist every feed event off the scoring path. SQLite writes run on the
/// blocking pool; failures are logged, never propagated to the pipeline.
pub fn spawn_recorder(store: Arc<SecureStore>, mut rx: broadcast::Receiver<FeedEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(ev) => ev,
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "store recorder lagging; events not persisted");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let store = Arc::clone(&store);
            let written = tokio::task::spawn_blocking(move || match &event {
                FeedEvent::Score(ev) => store.insert_score(ev),
                FeedEvent::Alert(a) => store.insert_alert(a),
            })
            .await;
            match written {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "persisting feed event failed"),
                Err(e) => warn!(error = %e, "store task aborted"),
            }
        }
    })
}
