use async_trait::async_trait;
use model::TripSegment;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use trip_io::{StoreError, TripStore};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("server rejected trip: HTTP {0}")]
    Status(u16),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Delivers one finished segment to the remote side. `Ok` means the
/// server acknowledged it.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn push(&self, segment: &TripSegment) -> Result<(), SyncError>;
}

pub struct HttpSyncTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSyncTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn push(&self, segment: &TripSegment) -> Result<(), SyncError> {
        let response = self.client.post(&self.endpoint).json(segment).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }
        debug!(id = %segment.id, %status, "trip accepted");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

/// One pass over the unsynced finished segments, oldest first. A failed
/// push leaves the segment unsynced for the next pass.
pub async fn sync_once(store: &dyn TripStore, transport: &dyn SyncTransport) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();
    for segment in store.list_unsynced()? {
        if !segment.is_finished() {
            continue;
        }
        report.attempted += 1;
        match transport.push(&segment).await {
            Ok(()) => match store.mark_synced(segment.id) {
                Ok(()) => report.synced += 1,
                Err(e) => {
                    warn!(id = %segment.id, "acknowledged trip not marked synced: {e}");
                    report.failed += 1;
                }
            },
            Err(e) => {
                warn!(id = %segment.id, "sync failed: {e}");
                report.failed += 1;
            }
        }
    }
    if report.attempted > 0 {
        info!(synced = report.synced, failed = report.failed, "sync pass done");
    }
    Ok(report)
}

/// Runs `sync_once` on a timer while `online` is true, plus once on
/// every offline to online edge. Returns when the connectivity sender
/// is dropped.
pub async fn run_sync_loop(
    store: Arc<dyn TripStore>,
    transport: Arc<dyn SyncTransport>,
    interval: Duration,
    mut online: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut was_online = *online.borrow_and_update();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !*online.borrow() {
                    continue;
                }
            }
            changed = online.changed() => {
                if changed.is_err() {
                    debug!("connectivity closed, sync loop exits");
                    return;
                }
                let now_online = *online.borrow_and_update();
                let rising = now_online && !was_online;
                was_online = now_online;
                if !rising {
                    continue;
                }
                info!("back online, syncing");
            }
        }
        if let Err(e) = sync_once(store.as_ref(), transport.as_ref()).await {
            warn!("sync pass aborted: {e}");
        }
    }
}

/// Cloneable switch for the online flag.
#[derive(Clone)]
pub struct ConnectivityHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityHandle {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Returns true when the flag actually changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        })
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
