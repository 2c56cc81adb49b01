pub mod cached_data;
pub mod config;
pub mod event;
pub mod informer;
mod poller;
pub mod store;

pub use cached_data::{CacheEntry, Observation};
pub use config::InformerConfig;
pub use event::{ChannelHandler, Event, EventHandler, EventType};
pub use informer::{DomainStatus, Informer, InformerStats, SyncDomain, SyncStatus};
