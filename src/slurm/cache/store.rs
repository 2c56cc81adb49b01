//! The informer's local map and the diff that keeps it in line with remote
//! reads. Both functions are called with the store's write lock held and
//! return the events to publish, in the order the changes were applied.

use super::cached_data::{CacheEntry, Observation};
use super::event::Event;
use crate::error::Result;
use crate::slurm::object::{ObjectKey, Resource};
use std::collections::{HashMap, HashSet};

pub type Store = HashMap<ObjectKey, CacheEntry>;

/// Reconcile the store with a complete listing.
///
/// * keys not cached yet are inserted (`Added`);
/// * cached keys are replaced only when the listing is not older than the
///   entry and the value differs (`Modified`);
/// * cached keys missing from the listing are removed (`Deleted`), unless
///   the entry was read after this listing started.
///
/// Re-applying the same listing yields no events and leaves entries untouched.
pub fn apply_list(store: &mut Store, items: Vec<Resource>, observation: Observation) -> Vec<Event> {
    let mut events = Vec::new();
    let mut seen = HashSet::with_capacity(items.len());

    for object in items {
        let key = object.key();
        seen.insert(key.clone());

        match store.get_mut(&key) {
            None => {
                store.insert(key, CacheEntry::new(object.clone(), observation));
                events.push(Event::added(object));
            }
            Some(entry) => {
                if entry.is_newer_than(observation) || entry.object == object {
                    continue;
                }
                let old = entry.object.clone();
                entry.update(object.clone(), observation);
                events.push(Event::modified(old, object));
            }
        }
    }

    let gone: Vec<ObjectKey> = store
        .iter()
        .filter(|(key, entry)| !seen.contains(*key) && !entry.is_newer_than(observation))
        .map(|(key, _)| key.clone())
        .collect();

    for key in gone {
        if let Some(entry) = store.remove(&key) {
            events.push(Event::deleted(entry.object));
        }
    }

    events
}

/// Apply the result of reading a single key.
///
/// A not-found answer is authoritative and removes the entry. Any other
/// error leaves the store untouched and is handed back.
pub fn apply_one(
    store: &mut Store,
    key: &ObjectKey,
    result: Result<Resource>,
    observation: Observation,
) -> (Vec<Event>, Result<()>) {
    match result {
        Ok(object) => {
            let events = match store.get_mut(key) {
                None => {
                    store.insert(key.clone(), CacheEntry::new(object.clone(), observation));
                    vec![Event::added(object)]
                }
                Some(entry) if entry.is_newer_than(observation) || entry.object == object => {
                    vec![]
                }
                Some(entry) => {
                    let old = entry.object.clone();
                    entry.update(object.clone(), observation);
                    vec![Event::modified(old, object)]
                }
            };
            (events, Ok(()))
        }
        Err(e) if e.is_not_found() => {
            let newer = store
                .get(key)
                .is_some_and(|entry| entry.is_newer_than(observation));
            let events = if newer {
                vec![]
            } else {
                store
                    .remove(key)
                    .map(|entry| vec![Event::deleted(entry.object)])
                    .unwrap_or_default()
            };
            (events, Ok(()))
        }
        Err(e) => (vec![], Err(e)),
    }
}
