use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};
use uuid::Uuid;

use odr_events::Bus;
use odr_port::{NoopSession, PortError, SessionFactory, SharedSession};
use odr_topics as topics;

use crate::board::StatusBoard;
use crate::config::RegistryConfig;
use crate::error::LoadError;
use crate::record::{LoadStatus, Priority, RequestRecord, RequestSnapshot};

/// One caller-visible lifecycle update for a requested tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadUpdate {
    /// A download for this tag is underway (possibly started by an
    /// earlier caller).
    Loading,
    /// The resource group is available.
    Loaded,
    /// The load failed with the given normalized message; release the tag
    /// before retrying.
    Failed(String),
}

/// Receiving side of one `request_resource` call.
///
/// Updates are queued here from whatever thread the port completion
/// arrives on and consumed on the caller's own task, so callers observe a
/// single-threaded contract. The channel closes once no further updates
/// can arrive for this request.
pub struct RequestTicket {
    rx: mpsc::UnboundedReceiver<LoadUpdate>,
}

impl RequestTicket {
    pub async fn next(&mut self) -> Option<LoadUpdate> {
        self.rx.recv().await
    }

    /// Non-blocking poll, for presentation code that ticks.
    pub fn try_next(&mut self) -> Option<LoadUpdate> {
        self.rx.try_recv().ok()
    }

    /// Wait for the terminal outcome, skipping `Loading` updates. Returns
    /// `None` when the request resolves without one (for example when
    /// another caller owns the in-flight download).
    pub async fn outcome(&mut self) -> Option<LoadUpdate> {
        while let Some(update) = self.rx.recv().await {
            if !matches!(update, LoadUpdate::Loading) {
                return Some(update);
            }
        }
        None
    }
}

/// Result of the atomic create-or-get on the registry map.
enum Claim {
    /// This caller created the record and owns starting its download.
    Created { session: SharedSession },
    /// A record already existed; its status and error at lookup time.
    Existing { status: LoadStatus, error: String },
}

/// The request-lifecycle coordinator.
///
/// Owns the collection of [`RequestRecord`]s: at most one live record per
/// tag, created on first request/prefetch, destroyed only via explicit
/// release. Everything caller-visible flows through per-request tickets,
/// the event bus, and the status board.
pub struct ResourceRegistry {
    factory: Option<Arc<dyn SessionFactory>>,
    records: Mutex<HashMap<String, RequestRecord>>,
    bus: Bus,
    board: StatusBoard,
    prefetch_priority: f32,
}

impl ResourceRegistry {
    pub fn new(bus: Bus, config: RegistryConfig) -> Arc<Self> {
        let prefetch_priority = config.prefetch_fraction();
        Arc::new(Self {
            factory: config.factory,
            records: Mutex::new(HashMap::new()),
            bus,
            board: StatusBoard::default(),
            prefetch_priority,
        })
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Handle to the process-wide loading observables.
    pub fn board(&self) -> StatusBoard {
        self.board.clone()
    }

    /// Request the resource group named by `tag`.
    ///
    /// With `reload` set the download starts unconditionally; otherwise
    /// the port is first asked whether the content is already cached and
    /// a cached hit resolves `Loaded` without downloading. An empty tag
    /// resolves `Loaded` immediately and touches nothing.
    pub async fn request_resource(self: &Arc<Self>, tag: &str, reload: bool) -> RequestTicket {
        let (tx, rx) = mpsc::unbounded_channel();
        let ticket = RequestTicket { rx };
        let tag = tag.trim();
        if tag.is_empty() {
            let _ = tx.send(LoadUpdate::Loaded);
            return ticket;
        }

        let attempt = Uuid::new_v4();
        match self.record_for(tag, attempt, Priority::Urgent).await {
            Claim::Existing { status, error } => match status {
                // Another caller already owns this fetch; it is not ours
                // to restart or to resolve.
                LoadStatus::Loading => {
                    let _ = tx.send(LoadUpdate::Loading);
                }
                LoadStatus::Loaded => {
                    let _ = tx.send(LoadUpdate::Loaded);
                }
                LoadStatus::Failed => {
                    let _ = tx.send(LoadUpdate::Failed(error));
                }
                // Mid-teardown, or a concurrent caller claimed creation
                // moments ago; the caller retries later if it still cares.
                LoadStatus::Released | LoadStatus::NotLoaded => {}
            },
            Claim::Created { session } => {
                if !reload {
                    match session.is_cached().await {
                        Ok(true) => {
                            if self.mark_cached(tag, attempt).await {
                                let _ = tx.send(LoadUpdate::Loaded);
                            }
                            return ticket;
                        }
                        Ok(false) => {}
                        // Let the download path produce the normalized
                        // failure instead of inventing one here.
                        Err(err) => {
                            debug!(%tag, "cache check failed: {err}");
                        }
                    }
                }
                let _ = tx.send(LoadUpdate::Loading);
                self.begin_download(tag, attempt, session, Priority::Urgent, Some(tx))
                    .await;
            }
        }
        ticket
    }

    /// Warm the cache for one or more comma-delimited tags.
    ///
    /// Fire-and-forget: no per-caller updates; outcomes land on record
    /// state, the status board, and the bus. A tag that already has a
    /// record is left alone, whatever its state.
    pub async fn prefetch_resources(self: &Arc<Self>, tags: &str, reload: bool) {
        for tag in split_tags(tags) {
            self.prefetch_one(tag, reload).await;
        }
    }

    async fn prefetch_one(self: &Arc<Self>, tag: &str, reload: bool) {
        let attempt = Uuid::new_v4();
        match self.record_for(tag, attempt, Priority::Prefetch).await {
            Claim::Existing { .. } => {}
            Claim::Created { session } => {
                if !reload {
                    if let Ok(true) = session.is_cached().await {
                        self.mark_cached(tag, attempt).await;
                        return;
                    }
                }
                self.begin_download(tag, attempt, session, Priority::Prefetch, None)
                    .await;
            }
        }
    }

    /// Release one or more comma-delimited tags. Unknown tags are ignored.
    pub async fn release_resources(&self, tags: &str) {
        for tag in split_tags(tags) {
            let removed = { self.records.lock().await.remove(tag) };
            if let Some(record) = removed {
                self.teardown(tag, record).await;
            }
        }
    }

    /// Release every tracked tag and clear the registry.
    pub async fn release_all(&self) {
        let drained: Vec<(String, RequestRecord)> = {
            let mut records = self.records.lock().await;
            records.drain().collect()
        };
        for (tag, record) in drained {
            self.teardown(&tag, record).await;
        }
    }

    /// Release exactly the failed tags, making them requestable again.
    pub async fn release_failed(&self) {
        let failed: Vec<(String, RequestRecord)> = {
            let mut records = self.records.lock().await;
            let tags: Vec<String> = records
                .iter()
                .filter(|(_, record)| record.status == LoadStatus::Failed)
                .map(|(tag, _)| tag.clone())
                .collect();
            tags.into_iter()
                .filter_map(|tag| records.remove(&tag).map(|record| (tag, record)))
                .collect()
        };
        for (tag, record) in failed {
            self.teardown(&tag, record).await;
        }
    }

    /// Read-only lookup for presentation code; never mutates.
    pub async fn find_requestor(&self, tag: &str) -> Option<RequestSnapshot> {
        self.records
            .lock()
            .await
            .get(tag)
            .map(RequestRecord::snapshot)
    }

    /// Snapshot of every tracked record, in no particular order.
    pub async fn snapshot(&self) -> Vec<RequestSnapshot> {
        self.records
            .lock()
            .await
            .values()
            .map(RequestRecord::snapshot)
            .collect()
    }

    /// Atomic create-or-get. A hit returns the existing record's state; a
    /// miss constructs the port session, inserts a fresh `NotLoaded`
    /// record owned by `attempt`, and reports `Created`.
    async fn record_for(&self, tag: &str, attempt: Uuid, priority: Priority) -> Claim {
        let count;
        let claim = {
            let mut records = self.records.lock().await;
            if let Some(record) = records.get(tag) {
                return Claim::Existing {
                    status: record.status,
                    error: record.error.clone(),
                };
            }
            let corr_id = Uuid::new_v4().to_string();
            let session: SharedSession = match &self.factory {
                Some(factory) => match factory.open(tag) {
                    Ok(session) => session,
                    Err(err) => {
                        warn!(%tag, "download session could not be created: {err}");
                        let failure = LoadError::NotRequestable(err.to_string());
                        let message = failure.to_string();
                        records.insert(
                            tag.to_string(),
                            RequestRecord {
                                tag: tag.to_string(),
                                attempt,
                                corr_id: corr_id.clone(),
                                status: LoadStatus::Failed,
                                priority,
                                error: message.clone(),
                                session: Arc::new(NoopSession),
                                watcher: None,
                            },
                        );
                        count = records.len();
                        drop(records);
                        self.board.record_error(&message);
                        self.publish_progress(
                            tag,
                            "failed",
                            Some(failure.code()),
                            Some(&message),
                            &corr_id,
                        );
                        self.publish_records_changed(count);
                        return Claim::Existing {
                            status: LoadStatus::Failed,
                            error: message,
                        };
                    }
                },
                None => {
                    error!(%tag, "no session factory configured; resource loading degraded");
                    Arc::new(NoopSession)
                }
            };
            records.insert(
                tag.to_string(),
                RequestRecord {
                    tag: tag.to_string(),
                    attempt,
                    corr_id,
                    status: LoadStatus::NotLoaded,
                    priority,
                    error: String::new(),
                    session: Arc::clone(&session),
                    watcher: None,
                },
            );
            count = records.len();
            Claim::Created { session }
        };
        self.publish_records_changed(count);
        claim
    }

    /// Flip a freshly created record straight to `Loaded` after the port
    /// reported the content as already cached. Returns false when the
    /// record was released (or re-owned) while the cache check ran.
    async fn mark_cached(&self, tag: &str, attempt: Uuid) -> bool {
        let corr_id = {
            let mut records = self.records.lock().await;
            match records.get_mut(tag) {
                Some(record)
                    if record.attempt == attempt && record.status == LoadStatus::NotLoaded =>
                {
                    record.status = LoadStatus::Loaded;
                    record.corr_id.clone()
                }
                _ => {
                    debug!(%tag, "cached result dropped: record no longer owned");
                    return false;
                }
            }
        };
        self.publish_progress(tag, "cached", None, None, &corr_id);
        true
    }

    /// Transition the record to `Loading` and hand the port session to a
    /// background job. No-op unless the record is still the `NotLoaded`
    /// one this attempt created.
    async fn begin_download(
        self: &Arc<Self>,
        tag: &str,
        attempt: Uuid,
        session: SharedSession,
        priority: Priority,
        watcher: Option<mpsc::UnboundedSender<LoadUpdate>>,
    ) {
        let corr_id = {
            let mut records = self.records.lock().await;
            match records.get_mut(tag) {
                Some(record)
                    if record.attempt == attempt && record.status == LoadStatus::NotLoaded =>
                {
                    record.status = LoadStatus::Loading;
                    record.priority = priority;
                    record.watcher = watcher;
                    // Counter moves with the status transition; a release
                    // landing between them would leak the count.
                    self.board.loading_started(tag);
                    record.corr_id.clone()
                }
                _ => {
                    debug!(%tag, "download not started: record no longer owned by this attempt");
                    return;
                }
            }
        };
        self.publish_progress(tag, "started", None, None, &corr_id);

        let fraction = match priority {
            Priority::Urgent => 1.0,
            Priority::Prefetch => self.prefetch_priority,
        };
        let runner = Arc::clone(self);
        let tag = tag.to_string();
        tokio::spawn(async move {
            let outcome = session.begin(fraction).await;
            runner.finish_download(&tag, attempt, outcome).await;
        });
    }

    /// Fold the port's completion back into the record. Outcomes for
    /// records that were released (or re-created) in the meantime are
    /// dropped.
    async fn finish_download(&self, tag: &str, attempt: Uuid, outcome: Result<(), PortError>) {
        let (watcher, corr_id, result) = {
            let mut records = self.records.lock().await;
            match records.get_mut(tag) {
                Some(record)
                    if record.attempt == attempt && record.status == LoadStatus::Loading =>
                {
                    let watcher = record.watcher.take();
                    let corr_id = record.corr_id.clone();
                    match outcome {
                        Ok(()) => {
                            record.status = LoadStatus::Loaded;
                            record.error.clear();
                            (watcher, corr_id, Ok(()))
                        }
                        Err(err) => {
                            let failure = LoadError::from(err);
                            record.status = LoadStatus::Failed;
                            record.error = failure.to_string();
                            (watcher, corr_id, Err(failure))
                        }
                    }
                }
                _ => {
                    warn!(%tag, "dropping stale download outcome");
                    return;
                }
            }
        };
        self.board.loading_finished();
        match result {
            Ok(()) => {
                self.publish_progress(tag, "loaded", None, None, &corr_id);
                if let Some(tx) = watcher {
                    let _ = tx.send(LoadUpdate::Loaded);
                }
            }
            Err(failure) => {
                let message = failure.to_string();
                self.board.record_error(&message);
                self.publish_progress(tag, "failed", Some(failure.code()), Some(&message), &corr_id);
                if let Some(tx) = watcher {
                    let _ = tx.send(LoadUpdate::Failed(message));
                }
            }
        }
    }

    /// Finish tearing down a record already removed from the map.
    async fn teardown(&self, tag: &str, mut record: RequestRecord) {
        let was_loading = record.status == LoadStatus::Loading;
        let corr_id = record.corr_id.clone();
        record.release();
        if was_loading {
            self.board.loading_finished();
        }
        let count = self.records.lock().await.len();
        self.bus.publish(
            topics::TOPIC_RESOURCE_RELEASED,
            &json!({"tag": tag, "corr_id": corr_id}),
        );
        self.publish_records_changed(count);
    }

    fn publish_progress(
        &self,
        tag: &str,
        status: &str,
        code: Option<&str>,
        error: Option<&str>,
        corr_id: &str,
    ) {
        let mut payload = json!({"tag": tag, "status": status, "corr_id": corr_id});
        if let Some(code) = code {
            payload["code"] = json!(code);
        }
        if let Some(error) = error {
            payload["error"] = json!(error);
        }
        self.bus.publish(topics::TOPIC_RESOURCE_PROGRESS, &payload);
    }

    fn publish_records_changed(&self, count: usize) {
        self.bus
            .publish(topics::TOPIC_RESOURCE_RECORDS_CHANGED, &json!({"count": count}));
    }
}

/// Split a comma-delimited tag list, trimming and dropping empty elements.
fn split_tags(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|tag| !tag.is_empty())
}
