#![allow(dead_code)]

use async_trait::async_trait;
use slurm_informer::slurm::backend::Backend;
use slurm_informer::slurm::cache::InformerConfig;
use slurm_informer::{
    Client, ClientConfig, Error, JobInfo, Node, ObjectKey, ObjectType, Patch, Resource, ResourceList, Result,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Healthy,
    /// Every call fails with a transport-style error
    Down,
    /// Every call answers 204 with nothing to read
    NoContent,
    /// Every call stalls this long before answering
    Slow(Duration),
}

/// In-memory stand-in for one slurmrestd protocol version
#[derive(Debug)]
pub struct FakeBackend {
    version: &'static str,
    objects: Mutex<BTreeMap<(ObjectType, ObjectKey), Resource>>,
    mode: Mutex<Mode>,
    gets: AtomicUsize,
    lists: Mutex<BTreeMap<ObjectType, usize>>,
    writes: AtomicUsize,
    next_job_id: AtomicU32,
}

impl FakeBackend {
    pub fn new(version: &'static str) -> Arc<Self> {
        Arc::new(Self {
            version,
            objects: Mutex::new(BTreeMap::new()),
            mode: Mutex::new(Mode::Healthy),
            gets: AtomicUsize::new(0),
            lists: Mutex::new(BTreeMap::new()),
            writes: AtomicUsize::new(0),
            next_job_id: AtomicU32::new(1000),
        })
    }

    pub fn insert(&self, object: impl Into<Resource>) {
        let object = object.into();
        self.objects
            .lock()
            .unwrap()
            .insert((object.object_type(), object.key()), object);
    }

    pub fn remove(&self, object_type: ObjectType, key: impl Into<ObjectKey>) {
        self.objects.lock().unwrap().remove(&(object_type, key.into()));
    }

    pub fn stored(&self, object_type: ObjectType, key: impl Into<ObjectKey>) -> Option<Resource> {
        self.objects
            .lock()
            .unwrap()
            .get(&(object_type, key.into()))
            .cloned()
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.lock().unwrap().values().sum()
    }

    pub fn lists_of(&self, object_type: ObjectType) -> usize {
        self.lists
            .lock()
            .unwrap()
            .get(&object_type)
            .copied()
            .unwrap_or_default()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn check_up(&self) -> Result<()> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Healthy => Ok(()),
            Mode::Down => Err(Error::Custom(format!("{} connection refused", self.version))),
            Mode::NoContent => Err(Error::NoContent),
            Mode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn version(&self) -> &str {
        self.version
    }

    async fn get(&self, object_type: ObjectType, key: &ObjectKey) -> Result<Resource> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_up().await?;
        self.stored(object_type, key.clone())
            .ok_or_else(|| Error::not_found(object_type, key.clone()))
    }

    async fn list(&self, object_type: ObjectType) -> Result<ResourceList> {
        *self.lists.lock().unwrap().entry(object_type).or_default() += 1;
        self.check_up().await?;
        let items = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ty, _), _)| *ty == object_type)
            .map(|(_, object)| object.clone())
            .collect();
        ResourceList::from_items(object_type, items)
    }

    async fn create(&self, object: &Resource) -> Result<Resource> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_up().await?;
        let created = match object {
            Resource::JobInfo(job) => Resource::JobInfo(JobInfo {
                job_id: self.next_job_id.fetch_add(1, Ordering::SeqCst),
                ..job.clone()
            }),
            other => other.clone(),
        };
        self.insert(created.clone());
        Ok(created)
    }

    async fn update(&self, patch: &Patch) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_up().await?;
        let current = self
            .stored(patch.object_type, patch.key.clone())
            .ok_or_else(|| Error::not_found(patch.object_type, patch.key.clone()))?;
        let Value::Object(mut fields) = current.to_json()? else {
            return Err(Error::Custom("stored object is not a JSON object".to_string()));
        };
        fields.extend(patch.fields.clone());
        self.insert(Resource::from_json(patch.object_type, Value::Object(fields))?);
        Ok(())
    }

    async fn delete(&self, object_type: ObjectType, key: &ObjectKey) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_up().await?;
        self.objects
            .lock()
            .unwrap()
            .remove(&(object_type, key.clone()))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(object_type, key.clone()))
    }
}

pub fn node(name: &str, cpus: u32) -> Node {
    Node {
        name: name.to_string(),
        cpus,
        state: vec!["IDLE".to_string()],
        ..Node::default()
    }
}

pub fn job(name: &str) -> JobInfo {
    JobInfo {
        name: name.to_string(),
        partition: Some("debug".to_string()),
        script: Some("#!/bin/sh\nsleep 60\n".to_string()),
        ..JobInfo::default()
    }
}

/// Config whose pollers only run when asked to, so tests control every read
pub fn quiet_config() -> ClientConfig {
    ClientConfig::default()
        .with_informer_config(
            InformerConfig::default()
                .with_list_poll_interval(Duration::from_secs(3600))
                .with_sync_timeout(Duration::from_secs(5)),
        )
        .with_heartbeat_interval(Duration::from_millis(20))
}

pub fn client(config: ClientConfig, backends: &[Arc<FakeBackend>]) -> Client {
    Client::with_backends(
        config,
        backends
            .iter()
            .map(|b| b.clone() as Arc<dyn Backend>)
            .collect(),
    )
    .unwrap()
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
