pub mod backend;
pub mod cache;
pub mod chain;
pub mod client;
pub mod object;
pub mod reader;
pub mod resources;
pub mod rest;

/// Default user agent sent to slurmrestd - automatically uses the package version
///
/// Can be overridden via the `SLURM_INFORMER_USER_AGENT` environment variable
/// (see [`client::ClientConfig::from_env`]).
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
