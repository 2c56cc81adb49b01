/**
 * Client facade
 *
 * Routes reads to a running informer when the kind is cached and straight
 * to the backend chain otherwise. Writes are capability-checked per kind and
 * then go through the informer (which brackets them with resyncs) or the
 * chain.
 */
use super::backend::{ApiVersion, Backend};
use super::cache::config::{DEFAULT_HEARTBEAT_SECONDS, check_period};
use super::cache::{EventHandler, Informer, InformerConfig, InformerStats};
use super::chain::VersionedChain;
use super::object::{Object, ObjectKey, ObjectType, Patch, Resource, ResourceList};
use super::reader::{GetOptions, ListOptions, Reader, Writer};
use super::resources::ControllerPing;
use super::rest::{RestBackend, http_client};
use super::USER_AGENT;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

pub const DEFAULT_SERVER: &str = "http://localhost:6820";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of slurmrestd, without the `/slurm/...` suffix
    pub server: String,
    /// JWT sent as `X-SLURM-USER-TOKEN`
    pub auth_token: Option<String>,
    pub user_agent: String,
    /// Backend versions, most preferred first
    pub versions: Vec<ApiVersion>,
    /// Kinds that are never cached; reads always go to the remote
    pub uncached: HashSet<ObjectType>,
    pub informer: InformerConfig,
    pub heartbeat_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            auth_token: None,
            user_agent: USER_AGENT.to_string(),
            versions: ApiVersion::NEWEST_FIRST.to_vec(),
            uncached: HashSet::from([ObjectType::ControllerPing]),
            informer: InformerConfig::default(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECONDS),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `SLURM_REST_URL`, `SLURM_JWT`,
    /// `SLURM_INFORMER_USER_AGENT` and `SLURM_REST_VERSIONS` (comma separated,
    /// most preferred first).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `SLURM_REST_VERSIONS` names an unknown version.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(server) = std::env::var("SLURM_REST_URL") {
            config.server = server;
        }
        if let Ok(token) = std::env::var("SLURM_JWT") {
            config.auth_token = Some(token);
        }
        if let Ok(user_agent) = std::env::var("SLURM_INFORMER_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Ok(versions) = std::env::var("SLURM_REST_VERSIONS") {
            config.versions = parse_versions(&versions)?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_versions(mut self, versions: Vec<ApiVersion>) -> Self {
        self.versions = versions;
        self
    }

    #[must_use]
    pub fn with_uncached(mut self, object_type: ObjectType) -> Self {
        self.uncached.insert(object_type);
        self
    }

    #[must_use]
    pub fn with_cached(mut self, object_type: ObjectType) -> Self {
        self.uncached.remove(&object_type);
        self
    }

    #[must_use]
    pub const fn with_informer_config(mut self, informer: InformerConfig) -> Self {
        self.informer = informer;
        self
    }

    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn is_uncached(&self, object_type: ObjectType) -> bool {
        self.uncached.contains(&object_type)
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if a period is too short for the background
    /// tasks.
    pub fn validate(&self) -> Result<()> {
        self.informer.validate()?;
        check_period("heartbeat interval", self.heartbeat_interval)
    }
}

/// Parse a comma separated version list such as `v0.0.43,v0.0.42`
///
/// # Errors
///
/// Returns [`Error::Config`] for an unknown version or an empty list.
pub fn parse_versions(list: &str) -> Result<Vec<ApiVersion>> {
    let versions = list
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<ApiVersion>>>()?;
    if versions.is_empty() {
        return Err(Error::Config("empty slurmrestd version list".to_string()));
    }
    Ok(versions)
}

struct Inner {
    chain: Arc<VersionedChain>,
    config: ClientConfig,
    informers: RwLock<HashMap<ObjectType, Arc<Informer>>>,
    lifecycle: Mutex<Option<CancellationToken>>,
    started: AtomicBool,
}

impl Inner {
    fn new_informer(&self, object_type: ObjectType) -> Arc<Informer> {
        Arc::new(Informer::new(
            object_type,
            self.chain.clone(),
            self.chain.clone(),
            self.config.informer,
        ))
    }
}

/// Cheaply clonable handle; clones share the chain and the informers
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Build a client talking to slurmrestd over HTTP, one backend per
    /// configured version.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or no version is
    /// configured.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = http_client(Some(&config.user_agent), config.auth_token.as_deref())?;
        let backends = config
            .versions
            .iter()
            .map(|version| {
                Arc::new(RestBackend::new(*version, &config.server, http.clone())) as Arc<dyn Backend>
            })
            .collect();
        Self::with_backends(config, backends)
    }

    /// Build a client over arbitrary backends, most preferred first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `backends` is empty or the config is invalid.
    pub fn with_backends(config: ClientConfig, backends: Vec<Arc<dyn Backend>>) -> Result<Self> {
        Self::with_chain(config, Arc::new(VersionedChain::new(backends)?))
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if the config is invalid.
    pub fn with_chain(config: ClientConfig, chain: Arc<VersionedChain>) -> Result<Self> {
        config.validate()?;
        let mut inner = Inner {
            chain,
            config,
            informers: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(None),
            started: AtomicBool::new(false),
        };

        let informers = ObjectType::ALL
            .into_iter()
            .filter(|ty| !inner.config.is_uncached(*ty))
            .map(|ty| (ty, inner.new_informer(ty)))
            .collect();
        inner.informers = RwLock::new(informers);

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn chain(&self) -> &Arc<VersionedChain> {
        &self.inner.chain
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    async fn running_token(&self) -> Option<CancellationToken> {
        self.inner
            .lifecycle
            .lock()
            .await
            .as_ref()
            .filter(|token| !token.is_cancelled())
            .cloned()
    }

    /// Start every cached kind's informer and the supervisor. Calling it on
    /// a started client does nothing.
    pub async fn start(&self) {
        let token = {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            if lifecycle.as_ref().is_some_and(|t| !t.is_cancelled()) {
                debug!("client already started");
                return;
            }
            let token = CancellationToken::new();
            *lifecycle = Some(token.clone());
            self.inner.started.store(true, Ordering::Release);
            token
        };

        for (object_type, informer) in self.inner.informers.read().await.iter() {
            if !self.inner.config.is_uncached(*object_type) {
                informer.start(&token);
            }
        }

        tokio::spawn(supervise(
            Arc::downgrade(&self.inner),
            token,
            self.inner.config.heartbeat_interval,
        ));
        info!("🚀 slurm client started against {}", self.inner.config.server);
    }

    /// Cancel the client's token; the supervisor stops the informers
    pub async fn stop(&self) {
        if let Some(token) = self.inner.lifecycle.lock().await.as_ref() {
            token.cancel();
        }
    }

    /// The informer for `object_type`, created on first use. It is started
    /// right away when the client is running and the kind is cached.
    pub async fn get_informer(&self, object_type: ObjectType) -> Arc<Informer> {
        let existing = self.inner.informers.read().await.get(&object_type).cloned();
        let informer = match existing {
            Some(informer) => informer,
            None => {
                let mut informers = self.inner.informers.write().await;
                informers
                    .entry(object_type)
                    .or_insert_with(|| self.inner.new_informer(object_type))
                    .clone()
            }
        };

        // checked after registering so a concurrent start cannot miss it
        if !self.inner.config.is_uncached(object_type) {
            if let Some(token) = self.running_token().await {
                informer.start(&token);
            }
        }
        informer
    }

    /// Install `handler` on the kind's informer
    pub async fn set_event_handler(&self, object_type: ObjectType, handler: Arc<dyn EventHandler>) {
        self.get_informer(object_type).await.set_event_handler(handler);
    }

    pub async fn stats(&self) -> Vec<InformerStats> {
        let informers: Vec<Arc<Informer>> = self.inner.informers.read().await.values().cloned().collect();
        let mut stats = Vec::with_capacity(informers.len());
        for informer in informers {
            stats.push(informer.stats().await);
        }
        stats.sort_by_key(|s| s.object_type);
        stats
    }

    /// Running informer serving `object_type`, if reads should use one
    async fn route(&self, object_type: ObjectType) -> Option<Arc<Informer>> {
        if self.inner.config.is_uncached(object_type) {
            return None;
        }
        let informer = self.inner.informers.read().await.get(&object_type).cloned()?;
        informer.has_started().then_some(informer)
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] if the object does not exist, a sync error from the
    /// informer, or the chain's error when every backend failed.
    pub async fn get(&self, object_type: ObjectType, key: &ObjectKey, opts: &GetOptions) -> Result<Resource> {
        match self.route(object_type).await {
            Some(informer) => informer.get(object_type, key, opts).await,
            None => {
                let opts = GetOptions {
                    skip_cache: true,
                    ..*opts
                };
                self.inner.chain.get(object_type, key, &opts).await
            }
        }
    }

    /// # Errors
    ///
    /// A sync error from the informer or the chain's error.
    pub async fn list(&self, object_type: ObjectType, opts: &ListOptions) -> Result<ResourceList> {
        match self.route(object_type).await {
            Some(informer) => informer.list(object_type, opts).await,
            None => {
                let opts = ListOptions {
                    skip_cache: true,
                    ..*opts
                };
                self.inner.chain.list(object_type, &opts).await
            }
        }
    }

    /// Create `object` remotely and return it as created (a submitted job
    /// comes back with its assigned id).
    ///
    /// # Errors
    ///
    /// [`Error::Unimplemented`] if the kind cannot be created.
    pub async fn create(&self, object: &Resource) -> Result<Resource> {
        let object_type = object.object_type();
        if !object_type.supports_create() {
            return Err(Error::unimplemented(object_type, "create"));
        }
        match self.route(object_type).await {
            Some(informer) => informer.create(object).await,
            None => self.inner.chain.create(object).await,
        }
    }

    /// Bring the remote object in line with `desired`. Only fields that
    /// differ from the current value are sent; nothing is sent when none do.
    ///
    /// # Errors
    ///
    /// [`Error::Unimplemented`] if the kind cannot be updated, or the error
    /// from reading the current value.
    pub async fn update(&self, desired: &Resource) -> Result<()> {
        let object_type = desired.object_type();
        if !object_type.supports_update() {
            return Err(Error::unimplemented(object_type, "update"));
        }

        let current = self.get(object_type, &desired.key(), &GetOptions::default()).await?;
        let patch = Patch::between(&current, desired)?;
        if patch.is_empty() {
            debug!("{} {} already up to date", object_type, patch.key);
            return Ok(());
        }

        match self.route(object_type).await {
            Some(informer) => informer.update(&patch).await,
            None => self.inner.chain.update(&patch).await,
        }
    }

    /// # Errors
    ///
    /// [`Error::Unimplemented`] if the kind cannot be deleted.
    pub async fn delete(&self, object_type: ObjectType, key: &ObjectKey) -> Result<()> {
        if !object_type.supports_delete() {
            return Err(Error::unimplemented(object_type, "delete"));
        }
        match self.route(object_type).await {
            Some(informer) => informer.delete(object_type, key).await,
            None => self.inner.chain.delete(object_type, key).await,
        }
    }

    /// # Errors
    ///
    /// [`Error::Unimplemented`] if the kind cannot be deleted.
    pub async fn delete_all_of(&self, object_type: ObjectType) -> Result<()> {
        if !object_type.supports_delete() {
            return Err(Error::unimplemented(object_type, "delete_all_of"));
        }
        match self.route(object_type).await {
            Some(informer) => informer.delete_all_of(object_type).await,
            None => self.inner.chain.delete_all_of(object_type).await,
        }
    }

    /// # Errors
    ///
    /// As [`Client::get`], plus [`Error::TypeMismatch`] if the answer is of another kind.
    pub async fn get_object<T: Object>(&self, key: impl Into<ObjectKey>) -> Result<T> {
        self.get(T::TYPE, &key.into(), &GetOptions::default())
            .await?
            .into_object()
    }

    /// # Errors
    ///
    /// As [`Client::list`].
    pub async fn list_objects<T: Object>(&self) -> Result<Vec<T>> {
        self.list(T::TYPE, &ListOptions::default())
            .await?
            .into_objects()
    }

    /// # Errors
    ///
    /// As [`Client::create`].
    pub async fn create_object<T: Object>(&self, object: T) -> Result<T> {
        self.create(&object.into_resource()).await?.into_object()
    }

    /// Controller liveness as reported by slurmrestd
    ///
    /// # Errors
    ///
    /// As [`Client::list`].
    pub async fn ping(&self) -> Result<Vec<ControllerPing>> {
        self.list_objects().await
    }
}

async fn supervise(inner: Weak<Inner>, token: CancellationToken, heartbeat: Duration) {
    let mut ticker = tokio::time::interval(heartbeat);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                let running = inner
                    .informers
                    .read()
                    .await
                    .values()
                    .filter(|i| i.has_started())
                    .count();
                trace!("💓 heartbeat: {} informers running, backend {}", running, inner.chain.sticky_version());
            }
        }
    }

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut lifecycle = inner.lifecycle.lock().await;
    // a newer start owns the informers now
    if lifecycle.as_ref().is_some_and(|t| !t.is_cancelled()) {
        return;
    }
    for informer in inner.informers.read().await.values() {
        informer.stop();
    }
    *lifecycle = None;
    inner.started.store(false, Ordering::Release);
    info!("🛑 slurm client stopped");
}
