//! Versioned backend chain
//!
//! Wraps an ordered list of [`Backend`]s, preferred protocol version first,
//! and runs every logical operation against them with fallback. The index of
//! the backend that last answered is remembered ("sticky") and shared by all
//! operations, so once an older controller is detected the newer versions
//! are no longer tried on every call.

use super::backend::Backend;
use super::object::{ObjectKey, ObjectType, Patch, Resource, ResourceList};
use super::reader::{GetOptions, ListOptions, Reader, Writer};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct VersionedChain {
    backends: Vec<Arc<dyn Backend>>,
    sticky: AtomicUsize,
}

impl VersionedChain {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `backends` is empty.
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(Error::Config(
                "at least one backend version is required".to_string(),
            ));
        }
        Ok(Self {
            backends,
            sticky: AtomicUsize::new(0),
        })
    }

    /// Index of the backend the next operation starts with
    #[must_use]
    pub fn sticky_index(&self) -> usize {
        self.sticky.load(Ordering::Acquire)
    }

    /// Version label of the backend the next operation starts with
    #[must_use]
    pub fn sticky_version(&self) -> &str {
        self.backends
            .get(self.sticky_index())
            .map_or("", |b| b.version())
    }

    #[must_use]
    pub fn versions(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.version()).collect()
    }

    /// Runs `op` starting at the sticky backend.
    ///
    /// A success or a tolerated error pins the answering backend and is
    /// returned as is. Anything else moves on to the next backend. When all
    /// of them failed the sticky index goes back to the preferred version and
    /// the collected errors are returned.
    async fn dispatch<T, F>(&self, operation: &'static str, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn Backend>) -> BoxFuture<'static, Result<T>>,
    {
        let start = self.sticky_index().min(self.backends.len() - 1);
        let mut errors = Vec::new();

        for (index, backend) in self.backends.iter().enumerate().skip(start) {
            match op(backend.clone()).await {
                Ok(value) => {
                    self.pin(index, backend.version());
                    return Ok(value);
                }
                Err(e) if e.is_tolerated() => {
                    debug!("{} on {}: {}", operation, backend.version(), e);
                    self.pin(index, backend.version());
                    return Err(e);
                }
                Err(e) => {
                    debug!("{} failed on {}, trying older version: {}", operation, backend.version(), e);
                    errors.push(e);
                }
            }
        }

        warn!("{} failed on every backend version from index {}", operation, start);
        self.sticky.store(0, Ordering::Release);
        Err(Error::Exhausted(errors))
    }

    fn pin(&self, index: usize, version: &str) {
        let previous = self.sticky.swap(index, Ordering::AcqRel);
        if previous != index {
            debug!("pinned backend chain to {} (index {})", version, index);
        }
    }
}

#[async_trait]
impl Reader for VersionedChain {
    async fn get(&self, object_type: ObjectType, key: &ObjectKey, _opts: &GetOptions) -> Result<Resource> {
        let key = key.clone();
        self.dispatch("get", move |backend| {
            let key = key.clone();
            Box::pin(async move { backend.get(object_type, &key).await })
        })
        .await
    }

    async fn list(&self, object_type: ObjectType, _opts: &ListOptions) -> Result<ResourceList> {
        self.dispatch("list", move |backend| {
            Box::pin(async move { backend.list(object_type).await })
        })
        .await
    }
}

#[async_trait]
impl Writer for VersionedChain {
    async fn create(&self, object: &Resource) -> Result<Resource> {
        let object = object.clone();
        self.dispatch("create", move |backend| {
            let object = object.clone();
            Box::pin(async move { backend.create(&object).await })
        })
        .await
    }

    async fn update(&self, patch: &Patch) -> Result<()> {
        let patch = patch.clone();
        self.dispatch("update", move |backend| {
            let patch = patch.clone();
            Box::pin(async move { backend.update(&patch).await })
        })
        .await
    }

    async fn delete(&self, object_type: ObjectType, key: &ObjectKey) -> Result<()> {
        let key = key.clone();
        self.dispatch("delete", move |backend| {
            let key = key.clone();
            Box::pin(async move { backend.delete(object_type, &key).await })
        })
        .await
    }

    async fn delete_all_of(&self, object_type: ObjectType) -> Result<()> {
        let list = Reader::list(self, object_type, &ListOptions::bypass()).await?;
        debug!("deleting {} {} objects", list.len(), object_type);
        for item in list.items() {
            match Writer::delete(self, object_type, &item.key()).await {
                Ok(()) => {}
                Err(e) if e.is_tolerated() => {
                    debug!("{} {} already gone", object_type, item.key());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slurm::resources::Node;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum Outcome {
        Found,
        NotFound,
        Down,
    }

    #[derive(Debug)]
    struct ScriptedBackend {
        version: &'static str,
        outcome: Mutex<Outcome>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(version: &'static str, outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                version,
                outcome: Mutex::new(outcome),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, outcome: Outcome) {
            *self.outcome.lock().unwrap() = outcome;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn answer<T>(&self, object_type: ObjectType, key: &ObjectKey, found: T) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = *self.outcome.lock().unwrap();
            match outcome {
                Outcome::Found => Ok(found),
                Outcome::NotFound => Err(Error::not_found(object_type, key.clone())),
                Outcome::Down => Err(Error::Custom(format!("{} unreachable", self.version))),
            }
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        fn version(&self) -> &str {
            self.version
        }

        async fn get(&self, object_type: ObjectType, key: &ObjectKey) -> Result<Resource> {
            let node = Node {
                name: key.to_string(),
                comment: Some(self.version.to_string()),
                ..Node::default()
            };
            self.answer(object_type, key, node.into())
        }

        async fn list(&self, object_type: ObjectType) -> Result<ResourceList> {
            self.answer(object_type, &ObjectKey::default(), ResourceList::new(object_type))
        }

        async fn create(&self, object: &Resource) -> Result<Resource> {
            self.answer(object.object_type(), &object.key(), object.clone())
        }

        async fn update(&self, patch: &Patch) -> Result<()> {
            self.answer(patch.object_type, &patch.key, ())
        }

        async fn delete(&self, object_type: ObjectType, key: &ObjectKey) -> Result<()> {
            self.answer(object_type, key, ())
        }
    }

    fn chain(backends: &[Arc<ScriptedBackend>]) -> VersionedChain {
        VersionedChain::new(
            backends
                .iter()
                .map(|b| b.clone() as Arc<dyn Backend>)
                .collect(),
        )
        .unwrap()
    }

    async fn get_node(chain: &VersionedChain, name: &str) -> Result<Resource> {
        Reader::get(chain, ObjectType::Node, &ObjectKey::from(name), &GetOptions::default()).await
    }

    #[test]
    fn test_empty_chain_is_rejected() {
        assert!(matches!(VersionedChain::new(vec![]), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_falls_back_and_pins_older_version() {
        let v3 = ScriptedBackend::new("v3", Outcome::Down);
        let v2 = ScriptedBackend::new("v2", Outcome::Found);
        let v1 = ScriptedBackend::new("v1", Outcome::Found);
        let chain = chain(&[v3.clone(), v2.clone(), v1.clone()]);

        let node = get_node(&chain, "n1").await.unwrap();
        assert_eq!(node.into_object::<Node>().unwrap().comment.as_deref(), Some("v2"));
        assert_eq!(chain.sticky_index(), 1);
        assert_eq!(chain.sticky_version(), "v2");

        // next call skips the newer, failing version entirely
        get_node(&chain, "n2").await.unwrap();
        assert_eq!(v3.calls(), 1);
        assert_eq!(v2.calls(), 2);
        assert_eq!(v1.calls(), 0);
    }

    #[tokio::test]
    async fn test_not_found_ends_fallback() {
        let v2 = ScriptedBackend::new("v2", Outcome::NotFound);
        let v1 = ScriptedBackend::new("v1", Outcome::Found);
        let chain = chain(&[v2.clone(), v1.clone()]);

        let err = get_node(&chain, "x").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(v1.calls(), 0);
        assert_eq!(chain.sticky_index(), 0);
    }

    #[tokio::test]
    async fn test_tolerated_error_pins_the_answering_backend() {
        let v3 = ScriptedBackend::new("v3", Outcome::Down);
        let v2 = ScriptedBackend::new("v2", Outcome::NotFound);
        let v1 = ScriptedBackend::new("v1", Outcome::Found);
        let chain = chain(&[v3.clone(), v2.clone(), v1.clone()]);

        assert!(get_node(&chain, "x").await.unwrap_err().is_not_found());
        assert_eq!(chain.sticky_index(), 1);

        v2.set(Outcome::Found);
        get_node(&chain, "x").await.unwrap();
        assert_eq!(v3.calls(), 1);
        assert_eq!(v2.calls(), 2);
        assert_eq!(v1.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_error_and_resets() {
        let v2 = ScriptedBackend::new("v2", Outcome::Down);
        let v1 = ScriptedBackend::new("v1", Outcome::Found);
        let chain = chain(&[v2.clone(), v1.clone()]);

        get_node(&chain, "n1").await.unwrap();
        assert_eq!(chain.sticky_index(), 1);

        v1.set(Outcome::Down);
        let err = get_node(&chain, "n1").await.unwrap_err();
        match err {
            Error::Exhausted(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(chain.sticky_index(), 0);

        let err = get_node(&chain, "n1").await.unwrap_err();
        match err {
            Error::Exhausted(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_sticky_index_is_shared_across_operations() {
        let v2 = ScriptedBackend::new("v2", Outcome::Down);
        let v1 = ScriptedBackend::new("v1", Outcome::Found);
        let chain = chain(&[v2.clone(), v1.clone()]);

        Reader::list(&chain, ObjectType::JobInfo, &ListOptions::default())
            .await
            .unwrap();
        assert_eq!(v2.calls(), 1);

        Writer::delete(&chain, ObjectType::Node, &ObjectKey::from("n1"))
            .await
            .unwrap();
        assert_eq!(v2.calls(), 1);
        assert_eq!(v1.calls(), 2);
    }
}
