//! The read/write contract every layer below the facade satisfies.
//!
//! The backend chain implements it against the remote service and the
//! informer implements it on top of another `Reader`/`Writer`, so caches
//! can be stacked.

use super::object::{ObjectKey, ObjectType, Patch, Resource, ResourceList};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Go straight to the layer below, ignoring any cached copy
    pub skip_cache: bool,
    /// Ask the cache to re-read this object before answering
    pub refresh_cache: bool,
    /// Upper bound on waiting for the cache to sync; the informer default if unset
    pub sync_timeout: Option<Duration>,
}

impl GetOptions {
    #[must_use]
    pub fn bypass() -> Self {
        Self {
            skip_cache: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn refresh() -> Self {
        Self {
            refresh_cache: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub skip_cache: bool,
    pub refresh_cache: bool,
    pub sync_timeout: Option<Duration>,
}

impl ListOptions {
    #[must_use]
    pub fn bypass() -> Self {
        Self {
            skip_cache: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn refresh() -> Self {
        Self {
            refresh_cache: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }
}

#[async_trait]
pub trait Reader: Send + Sync {
    async fn get(&self, object_type: ObjectType, key: &ObjectKey, opts: &GetOptions) -> Result<Resource>;

    async fn list(&self, object_type: ObjectType, opts: &ListOptions) -> Result<ResourceList>;
}

#[async_trait]
pub trait Writer: Send + Sync {
    /// Creates `object` remotely and returns it as created; the remote may
    /// assign the key (a submitted job gets its id here).
    async fn create(&self, object: &Resource) -> Result<Resource>;

    async fn update(&self, patch: &Patch) -> Result<()>;

    async fn delete(&self, object_type: ObjectType, key: &ObjectKey) -> Result<()>;

    async fn delete_all_of(&self, object_type: ObjectType) -> Result<()>;
}
