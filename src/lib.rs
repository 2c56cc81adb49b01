//! Client for the Slurm REST API (slurmrestd) with per-kind informer caches
//! and transparent fallback across protocol versions.

pub mod error;
pub mod slurm;

pub use error::{Error, Result};
pub use slurm::cache::{ChannelHandler, Event, EventHandler, EventType, Informer, InformerConfig};
pub use slurm::client::{Client, ClientConfig};
pub use slurm::object::{Object, ObjectKey, ObjectType, Patch, Resource, ResourceList};
pub use slurm::reader::{GetOptions, ListOptions, Reader, Writer};
pub use slurm::resources::{ControllerPing, JobInfo, Node, PartitionInfo};
