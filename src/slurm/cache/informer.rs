/**
 * Informer cache
 *
 * Mirrors one resource kind locally. A list poller keeps the whole
 * collection fresh, a single-object poller refreshes individual keys on
 * demand, and a dispatcher hands the resulting events to the installed
 * handler. Reads are served from memory once no resync is outstanding;
 * writes go to the layer below and are bracketed by resync requests.
 */
use super::cached_data::Observation;
use super::config::{InformerConfig, RESYNC_CHANNEL_CAPACITY};
use super::event::{Event, EventHandler, EventType};
use super::poller::{self, GetResync, ListResync};
use super::store::Store;
use crate::error::{Error, Result};
use crate::slurm::object::{ObjectKey, ObjectType, Patch, Resource, ResourceList};
use crate::slurm::reader::{GetOptions, ListOptions, Reader, Writer};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// The two freshness domains: full listings and targeted single-key reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDomain {
    List,
    Get,
}

#[derive(Debug, Clone, Default)]
pub struct DomainStatus {
    pub synced: bool,
    /// Error of the last completed read in this domain, if it failed
    pub error: Option<Arc<Error>>,
}

#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Bumped on every start; pollers of an earlier start cannot publish
    pub generation: u64,
    pub list: DomainStatus,
    pub get: DomainStatus,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            generation: 0,
            list: DomainStatus::default(),
            // nothing to refresh until someone asks for a key
            get: DomainStatus {
                synced: true,
                error: None,
            },
        }
    }
}

impl SyncStatus {
    /// No resync outstanding in either domain
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.list.synced && self.get.synced
    }

    const fn domain_mut(&mut self, domain: SyncDomain) -> &mut DomainStatus {
        match domain {
            SyncDomain::List => &mut self.list,
            SyncDomain::Get => &mut self.get,
        }
    }

    fn error_for(&self, domain: SyncDomain) -> Option<Arc<Error>> {
        match domain {
            SyncDomain::List => self.list.error.clone(),
            SyncDomain::Get => self.get.error.clone().or_else(|| self.list.error.clone()),
        }
    }
}

/// State shared between the informer handle and its background tasks
pub(super) struct Shared {
    pub(super) object_type: ObjectType,
    pub(super) reader: Arc<dyn Reader>,
    pub(super) store: RwLock<Store>,
    status: watch::Sender<SyncStatus>,
    observations: AtomicU64,
    handler: std::sync::RwLock<Option<Arc<dyn EventHandler>>>,
}

impl Shared {
    pub(super) fn observe(&self) -> Observation {
        Observation {
            seq: self.observations.fetch_add(1, Ordering::SeqCst) + 1,
            at: Utc::now(),
        }
    }

    /// Start a new generation with both domains back at their initial state
    fn reset(&self) -> u64 {
        let mut generation = 0;
        self.status.send_modify(|status| {
            generation = status.generation + 1;
            *status = SyncStatus {
                generation,
                ..SyncStatus::default()
            };
        });
        generation
    }

    fn invalidate(&self, domain: SyncDomain) {
        self.status.send_modify(|status| status.domain_mut(domain).synced = false);
    }

    /// Apply `f` only while `generation` is still current
    fn update_status(&self, generation: u64, f: impl FnOnce(&mut SyncStatus)) {
        self.status.send_if_modified(|status| {
            if status.generation != generation {
                return false;
            }
            f(status);
            true
        });
    }

    pub(super) fn mark_unsynced(&self, generation: u64, domain: SyncDomain) {
        self.update_status(generation, |status| status.domain_mut(domain).synced = false);
    }

    pub(super) fn publish(&self, generation: u64, domain: SyncDomain, error: Option<Arc<Error>>) {
        self.update_status(generation, |status| {
            *status.domain_mut(domain) = DomainStatus {
                synced: true,
                error,
            };
        });
    }

    /// A complete listing re-read every key, so an earlier single-key
    /// failure no longer describes the cache.
    pub(super) fn publish_listing(&self, generation: u64, error: Option<Arc<Error>>) {
        self.update_status(generation, |status| {
            if error.is_none() {
                status.get.error = None;
            }
            status.list = DomainStatus {
                synced: true,
                error,
            };
        });
    }

    fn list_synced(&self) -> bool {
        self.status.borrow().list.synced
    }

    fn handler(&self) -> Option<Arc<dyn EventHandler>> {
        self.handler.read().ok().and_then(|slot| slot.clone())
    }

    pub(super) fn dispatch(&self, event: &Event) {
        let Some(handler) = self.handler() else {
            trace!("no {} handler installed, dropping {:?} event", self.object_type, event.event_type);
            return;
        };

        match event.event_type {
            EventType::Added => handler.on_add(&event.object, self.list_synced()),
            EventType::Modified => match &event.object_old {
                Some(old) => handler.on_update(old, &event.object),
                None => handler.on_update(&event.object, &event.object),
            },
            EventType::Deleted => handler.on_delete(&event.object),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    list_tx: mpsc::Sender<ListResync>,
    get_tx: mpsc::Sender<GetResync>,
}

/// Snapshot of an informer's state for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformerStats {
    pub object_type: ObjectType,
    pub entries: usize,
    pub started: bool,
    pub synced: bool,
    pub last_error: Option<String>,
}

pub struct Informer {
    shared: Arc<Shared>,
    writer: Arc<dyn Writer>,
    config: InformerConfig,
    running: Mutex<Option<Running>>,
}

impl Informer {
    #[must_use]
    pub fn new(
        object_type: ObjectType,
        reader: Arc<dyn Reader>,
        writer: Arc<dyn Writer>,
        config: InformerConfig,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            shared: Arc::new(Shared {
                object_type,
                reader,
                store: RwLock::new(Store::new()),
                status,
                observations: AtomicU64::new(0),
                handler: std::sync::RwLock::new(None),
            }),
            writer,
            config,
            running: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.shared.object_type
    }

    #[must_use]
    pub const fn config(&self) -> &InformerConfig {
        &self.config
    }

    /// Spawn the list poller, the single-object poller and the event
    /// dispatcher. They stop when `parent` is cancelled or on [`stop`].
    /// Starting a running informer does nothing.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// [`stop`]: Informer::stop
    pub fn start(&self, parent: &CancellationToken) {
        let Ok(mut running) = self.running.lock() else {
            error!("{} informer state poisoned, not starting", self.object_type());
            return;
        };
        if running.as_ref().is_some_and(|r| !r.cancel.is_cancelled()) {
            debug!("{} informer already started", self.object_type());
            return;
        }

        let cancel = parent.child_token();
        let (list_tx, list_rx) = mpsc::channel(RESYNC_CHANNEL_CAPACITY);
        let (get_tx, get_rx) = mpsc::channel(RESYNC_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let generation = self.shared.reset();

        tokio::spawn(poller::run_list_poller(
            self.shared.clone(),
            generation,
            list_rx,
            event_tx.clone(),
            self.config.list_poll_interval,
            cancel.clone(),
        ));
        tokio::spawn(poller::run_get_poller(
            self.shared.clone(),
            generation,
            get_rx,
            event_tx,
            cancel.clone(),
        ));
        tokio::spawn(poller::run_dispatcher(
            self.shared.clone(),
            event_rx,
            cancel.clone(),
        ));

        *running = Some(Running {
            cancel,
            list_tx,
            get_tx,
        });
        info!(
            "🚀 {} informer started (list every {}s)",
            self.object_type(),
            self.config.list_poll_interval.as_secs_f64()
        );
    }

    /// Stop the background tasks. Stopping a stopped informer does nothing.
    pub fn stop(&self) {
        let running = self.running.lock().ok().and_then(|mut r| r.take());
        if let Some(running) = running {
            running.cancel.cancel();
            info!("🛑 {} informer stopped", self.object_type());
        }
    }

    #[must_use]
    pub fn has_started(&self) -> bool {
        self.running
            .lock()
            .ok()
            .is_some_and(|r| r.as_ref().is_some_and(|r| !r.cancel.is_cancelled()))
    }

    /// Whether the list domain has completed a read since it was last
    /// invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SyncFailed`] when that read failed.
    pub fn has_synced(&self) -> Result<bool> {
        let status = self.shared.status.borrow();
        match &status.list.error {
            Some(e) if status.list.synced => Err(Error::SyncFailed(e.clone())),
            _ => Ok(status.list.synced),
        }
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.shared.status.borrow().clone()
    }

    /// Install the event handler, replacing any previous one
    pub fn set_event_handler(&self, handler: Arc<dyn EventHandler>) {
        if let Ok(mut slot) = self.shared.handler.write() {
            *slot = Some(handler);
        }
    }

    pub fn unset_event_handler(&self) {
        if let Ok(mut slot) = self.shared.handler.write() {
            *slot = None;
        }
    }

    pub async fn stats(&self) -> InformerStats {
        let entries = self.shared.store.read().await.len();
        let status = self.sync_status();
        InformerStats {
            object_type: self.object_type(),
            entries,
            started: self.has_started(),
            synced: status.list.synced,
            last_error: status
                .error_for(SyncDomain::Get)
                .map(|e| e.to_string()),
        }
    }

    fn stopped(&self) -> Error {
        Error::InformerStopped(self.shared.object_type)
    }

    fn check_type(&self, object_type: ObjectType) -> Result<()> {
        if object_type == self.shared.object_type {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: self.shared.object_type,
                found: object_type,
            })
        }
    }

    fn running_with<T>(&self, f: impl FnOnce(&Running) -> T) -> Result<T> {
        let running = self.running.lock().map_err(|_| self.stopped())?;
        match running.as_ref() {
            Some(r) if !r.cancel.is_cancelled() => Ok(f(r)),
            _ => Err(self.stopped()),
        }
    }

    /// Ask the list poller for a full resync. Returns once the poller has
    /// taken the request and marked the list domain unsynced.
    async fn resync_list(&self) -> Result<()> {
        let tx = self.running_with(|r| r.list_tx.clone())?;
        self.shared.invalidate(SyncDomain::List);
        let (ack, acked) = oneshot::channel();
        tx.send(ListResync { ack })
            .await
            .map_err(|_| self.stopped())?;
        acked.await.map_err(|_| self.stopped())
    }

    /// Ask the single-object poller to re-read `key`. Returns once the
    /// poller has taken the request and marked the get domain unsynced.
    async fn resync_one(&self, key: &ObjectKey) -> Result<()> {
        let tx = self.running_with(|r| r.get_tx.clone())?;
        self.shared.invalidate(SyncDomain::Get);
        let (ack, acked) = oneshot::channel();
        tx.send(GetResync {
            key: key.clone(),
            ack,
        })
        .await
        .map_err(|_| self.stopped())?;
        acked.await.map_err(|_| self.stopped())
    }

    fn note_resync(&self, operation: &str, result: Result<()>) {
        if let Err(e) = result {
            debug!("{} {}: resync skipped: {}", self.object_type(), operation, e);
        }
    }

    /// Wait until neither poller has a resync outstanding, bounded by
    /// `timeout` (the configured default when `None`).
    ///
    /// # Errors
    ///
    /// [`Error::SyncTimeout`] when the bound expires, [`Error::InformerStopped`]
    /// when the informer is or gets stopped, and [`Error::SyncFailed`] when the
    /// read the wait ended on failed.
    pub async fn wait_for_sync(&self, domain: SyncDomain, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(self.config.sync_timeout);
        let cancel = self.running_with(|r| r.cancel.clone())?;
        let mut status = self.shared.status.subscribe();

        let synced = async {
            status
                .wait_for(SyncStatus::is_idle)
                .await
                .map(|s| s.error_for(domain))
        };

        tokio::select! {
            () = cancel.cancelled() => Err(self.stopped()),
            waited = tokio::time::timeout(timeout, synced) => match waited {
                Err(_) => Err(Error::SyncTimeout {
                    object_type: self.object_type(),
                    timeout,
                }),
                Ok(Err(_)) => Err(self.stopped()),
                Ok(Ok(Some(error))) => Err(Error::SyncFailed(error)),
                Ok(Ok(None)) => Ok(()),
            },
        }
    }
}

impl Drop for Informer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl Reader for Informer {
    async fn get(&self, object_type: ObjectType, key: &ObjectKey, opts: &GetOptions) -> Result<Resource> {
        self.check_type(object_type)?;
        if opts.skip_cache {
            return self.shared.reader.get(object_type, key, opts).await;
        }
        if opts.refresh_cache {
            self.resync_one(key).await?;
        }
        self.wait_for_sync(SyncDomain::Get, opts.sync_timeout).await?;

        let store = self.shared.store.read().await;
        store
            .get(key)
            .map(|entry| entry.object.clone())
            .ok_or_else(|| Error::not_found(object_type, key.clone()))
    }

    async fn list(&self, object_type: ObjectType, opts: &ListOptions) -> Result<ResourceList> {
        self.check_type(object_type)?;
        if opts.skip_cache {
            return self.shared.reader.list(object_type, opts).await;
        }
        if opts.refresh_cache {
            self.resync_list().await?;
        }
        self.wait_for_sync(SyncDomain::List, opts.sync_timeout).await?;

        let items = {
            let store = self.shared.store.read().await;
            store.values().map(|entry| entry.object.clone()).collect()
        };
        ResourceList::from_items(object_type, items)
    }
}

#[async_trait]
impl Writer for Informer {
    async fn create(&self, object: &Resource) -> Result<Resource> {
        self.check_type(object.object_type())?;
        self.note_resync("create", self.resync_list().await);
        let created = self.writer.create(object).await?;
        self.note_resync("create", self.resync_list().await);
        Ok(created)
    }

    async fn update(&self, patch: &Patch) -> Result<()> {
        self.check_type(patch.object_type)?;
        self.note_resync("update", self.resync_list().await);
        self.writer.update(patch).await?;
        self.note_resync("update", self.resync_one(&patch.key).await);
        Ok(())
    }

    async fn delete(&self, object_type: ObjectType, key: &ObjectKey) -> Result<()> {
        self.check_type(object_type)?;
        self.note_resync("delete", self.resync_list().await);
        self.writer.delete(object_type, key).await?;
        self.note_resync("delete", self.resync_list().await);
        Ok(())
    }

    async fn delete_all_of(&self, object_type: ObjectType) -> Result<()> {
        self.check_type(object_type)?;
        self.note_resync("delete_all_of", self.resync_list().await);
        self.writer.delete_all_of(object_type).await?;
        self.note_resync("delete_all_of", self.resync_list().await);
        Ok(())
    }
}
