//! Per-transport queue of suspended requests
//!
//! A buffer holds the requests of one transport that failed with
//! auth-required, each paired with the settler of its caller's pending
//! result. Entries are drained exactly once: every drain detaches the whole
//! episode under the lock before touching a single entry, so a request that
//! fails again while being replayed opens a fresh episode instead of
//! rejoining the one being drained.

use std::fmt;
use std::future::Future;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RequestError;
use crate::metrics;
use crate::pending::{Settlement, Settler};
use crate::registry::TransportName;

/// Identifies one suspension episode of one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpisodeId(Uuid);

impl EpisodeId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A suspended request and the settler of its caller's result.
pub struct BufferedEntry<R, V, F> {
    request: R,
    settler: Settler<V, F>,
}

struct Episode<R, V, F> {
    id: EpisodeId,
    entries: Vec<BufferedEntry<R, V, F>>,
}

/// Summary of one drained episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    pub transport: TransportName,
    pub episode: EpisodeId,
    pub entries: usize,
}

/// Handle to the replay of one episode.
///
/// Replays run on a spawned task; dropping the handle does not stop them.
#[derive(Debug)]
pub struct ReplayHandle {
    pub drained: Drained,
    /// Requests re-issued against the transport.
    pub replayed: usize,
    /// Requests rejected because the updater failed for them.
    pub failed_updates: usize,
    task: JoinHandle<()>,
}

impl ReplayHandle {
    /// Wait until every replayed request has settled or abandoned its
    /// original caller.
    ///
    /// A replay that was suspended again finishes only when that later
    /// episode is drained.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            warn!(transport = %self.drained.transport, error = %e, "replay task failed");
        }
    }
}

/// Ordered suspended requests of one transport.
pub struct RequestBuffer<R, V, F> {
    transport: TransportName,
    current: Mutex<Option<Episode<R, V, F>>>,
}

impl<R, V, F> RequestBuffer<R, V, F> {
    pub fn new(transport: TransportName) -> Self {
        Self {
            transport,
            current: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &TransportName {
        &self.transport
    }

    /// Append at the tail, opening a new episode if the buffer was empty.
    ///
    /// Returns the episode id and the number of entries now buffered.
    pub async fn append(&self, request: R, settler: Settler<V, F>) -> (EpisodeId, usize) {
        let mut current = self.current.lock().await;
        let episode = current.get_or_insert_with(|| {
            let id = EpisodeId::new();
            debug!(transport = %self.transport, episode = %id, "opening suspension episode");
            Episode {
                id,
                entries: Vec::new(),
            }
        });
        episode.entries.push(BufferedEntry { request, settler });
        (episode.id, episode.entries.len())
    }

    pub async fn len(&self) -> usize {
        self.current
            .lock()
            .await
            .as_ref()
            .map_or(0, |episode| episode.entries.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Id of the episode currently accumulating entries, if any.
    pub async fn episode(&self) -> Option<EpisodeId> {
        self.current.lock().await.as_ref().map(|episode| episode.id)
    }

    /// Reject every entry with `reason`, or abandon them all when `reason`
    /// is `None`.
    ///
    /// Abandoned results are never settled. The buffer is empty afterwards
    /// either way. Returns `None` if there was nothing to drain.
    pub async fn reject_all(&self, reason: Option<String>) -> Option<Drained> {
        let episode = self.current.lock().await.take()?;
        let drained = Drained {
            transport: self.transport.clone(),
            episode: episode.id,
            entries: episode.entries.len(),
        };

        match reason {
            Some(reason) => {
                for entry in episode.entries {
                    entry
                        .settler
                        .reject(RequestError::Cancelled(reason.clone()));
                }
                metrics::record_rejected(&self.transport, drained.entries);
                info!(
                    transport = %self.transport,
                    episode = %drained.episode,
                    entries = drained.entries,
                    reason = %reason,
                    "suspended requests rejected"
                );
            }
            None => {
                drop(episode.entries);
                metrics::record_abandoned(&self.transport, drained.entries);
                info!(
                    transport = %self.transport,
                    episode = %drained.episode,
                    entries = drained.entries,
                    "suspended requests abandoned"
                );
            }
        }

        Some(drained)
    }

    /// Re-issue every entry in insertion order.
    ///
    /// `updater` runs on each request first. If it fails, only that entry is
    /// rejected with `RequestError::ConfigUpdate`. `reissue` produces the
    /// replay future for an updated request; replays are polled in insertion
    /// order on a spawned task and each one settles its original caller with
    /// the replay's own settlement. A replay that resolves to `None` was
    /// abandoned further down the chain, and its original caller is abandoned
    /// too. Returns `None` if there was nothing to drain.
    pub async fn retry_all<U, E, I, Fut>(&self, mut updater: U, reissue: I) -> Option<ReplayHandle>
    where
        U: FnMut(R) -> Result<R, E>,
        E: fmt::Display,
        I: Fn(R) -> Fut,
        Fut: Future<Output = Option<Settlement<V, F>>> + Send + 'static,
        V: Send + 'static,
        F: Send + 'static,
    {
        let episode = self.current.lock().await.take()?;
        let drained = Drained {
            transport: self.transport.clone(),
            episode: episode.id,
            entries: episode.entries.len(),
        };

        let mut replays = Vec::with_capacity(drained.entries);
        let mut failed_updates = 0;
        for BufferedEntry { request, settler } in episode.entries {
            match updater(request) {
                Ok(updated) => {
                    let replay = reissue(updated);
                    replays.push(async move {
                        match replay.await {
                            Some(settlement) => settler.settle(settlement),
                            None => drop(settler),
                        }
                    });
                }
                Err(e) => {
                    warn!(
                        transport = %self.transport,
                        episode = %drained.episode,
                        error = %e,
                        "request updater failed, rejecting request"
                    );
                    failed_updates += 1;
                    settler.reject(RequestError::ConfigUpdate(e.to_string()));
                }
            }
        }

        let replayed = replays.len();
        metrics::record_replayed(&self.transport, replayed);
        if failed_updates > 0 {
            metrics::record_rejected(&self.transport, failed_updates);
        }
        info!(
            transport = %self.transport,
            episode = %drained.episode,
            replayed,
            failed_updates,
            "replaying suspended requests"
        );

        let task = tokio::spawn(async move {
            join_all(replays).await;
        });

        Some(ReplayHandle {
            drained,
            replayed,
            failed_updates,
            task,
        })
    }
}
