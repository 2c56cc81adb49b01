use super::config::MIN_PERIOD_MILLIS;
use super::event::Event;
use super::informer::{Shared, SyncDomain};
use super::store;
use crate::error::{Error, Result};
use crate::slurm::object::{ObjectKey, ResourceList};
use crate::slurm::reader::{GetOptions, ListOptions};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Request for a full re-list. `ack` fires once the list domain is marked
/// unsynced, before the read is issued.
pub(super) struct ListResync {
    pub ack: oneshot::Sender<()>,
}

/// Request to re-read one key. `ack` fires once the get domain is marked
/// unsynced, before the read is issued.
pub(super) struct GetResync {
    pub key: ObjectKey,
    pub ack: oneshot::Sender<()>,
}

/// `tokio::time::interval` panics on a zero period
pub(super) fn clamp_period(period: Duration) -> Duration {
    let min = Duration::from_millis(MIN_PERIOD_MILLIS);
    if period < min {
        warn!("period {:?} is below the {:?} minimum, using the minimum", period, min);
        return min;
    }
    period
}

pub(super) async fn run_list_poller(
    shared: Arc<Shared>,
    generation: u64,
    mut requests: mpsc::Receiver<ListResync>,
    events: mpsc::UnboundedSender<Event>,
    period: Duration,
    cancel: CancellationToken,
) {
    info!("🔄 {} list poller started", shared.object_type);

    // first tick completes immediately so the cache fills right away
    let mut ticker = tokio::time::interval(clamp_period(period));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                trace!("{} list poll due", shared.object_type);
            }
            request = requests.recv() => match request {
                Some(ListResync { ack }) => {
                    shared.mark_unsynced(generation, SyncDomain::List);
                    // Requester may have given up
                    let _ = ack.send(());
                    ticker.reset();
                }
                None => break,
            },
        }

        refresh_list(&shared, generation, &events).await;
    }

    info!("🛑 {} list poller shutting down", shared.object_type);
}

pub(super) async fn run_get_poller(
    shared: Arc<Shared>,
    generation: u64,
    mut requests: mpsc::Receiver<GetResync>,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) {
    debug!("{} single-object poller started", shared.object_type);

    loop {
        let request = tokio::select! {
            () = cancel.cancelled() => break,
            request = requests.recv() => request,
        };
        let Some(GetResync { key, ack }) = request else {
            break;
        };

        shared.mark_unsynced(generation, SyncDomain::Get);
        let _ = ack.send(());
        refresh_one(&shared, generation, &key, &events).await;
    }

    debug!("{} single-object poller shutting down", shared.object_type);
}

pub(super) async fn run_dispatcher(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => shared.dispatch(&event),
                None => break,
            },
        }
    }

    debug!("{} event dispatcher shutting down", shared.object_type);
}

fn check_list(shared: &Shared, list: ResourceList) -> Result<ResourceList> {
    if list.object_type() == shared.object_type {
        Ok(list)
    } else {
        Err(Error::TypeMismatch {
            expected: shared.object_type,
            found: list.object_type(),
        })
    }
}

fn publish_events(events: &mpsc::UnboundedSender<Event>, changes: Vec<Event>) {
    for event in changes {
        // Dispatcher gone means we are shutting down
        let _ = events.send(event);
    }
}

async fn refresh_list(shared: &Shared, generation: u64, events: &mpsc::UnboundedSender<Event>) {
    let start = Instant::now();
    let observation = shared.observe();
    let result = shared
        .reader
        .list(shared.object_type, &ListOptions::bypass())
        .await
        .and_then(|list| check_list(shared, list));

    let error = match result {
        Ok(list) => {
            let mut store = shared.store.write().await;
            let changes = store::apply_list(&mut store, list.into_items(), observation);
            debug!(
                "✅ {} list synced in {:?}: {} cached, {} changes",
                shared.object_type,
                start.elapsed(),
                store.len(),
                changes.len()
            );
            publish_events(events, changes);
            None
        }
        Err(e) => {
            warn!(
                "❌ {} list failed after {:?}, keeping cached snapshot: {}",
                shared.object_type,
                start.elapsed(),
                e
            );
            Some(Arc::new(e))
        }
    };

    shared.publish_listing(generation, error);
}

async fn refresh_one(
    shared: &Shared,
    generation: u64,
    key: &ObjectKey,
    events: &mpsc::UnboundedSender<Event>,
) {
    let observation = shared.observe();
    let result = shared
        .reader
        .get(shared.object_type, key, &GetOptions::bypass())
        .await
        .and_then(|object| {
            if object.object_type() == shared.object_type {
                Ok(object)
            } else {
                Err(Error::TypeMismatch {
                    expected: shared.object_type,
                    found: object.object_type(),
                })
            }
        });

    let outcome = {
        let mut store = shared.store.write().await;
        let (changes, outcome) = store::apply_one(&mut store, key, result, observation);
        publish_events(events, changes);
        outcome
    };

    let error = outcome.err().map(|e| {
        warn!("❌ {} {} refresh failed: {}", shared.object_type, key, e);
        Arc::new(e)
    });
    shared.publish(generation, SyncDomain::Get, error);
}
