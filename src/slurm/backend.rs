use super::object::{ObjectKey, ObjectType, Patch, Resource, ResourceList};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// slurmrestd protocol revisions this client can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiVersion {
    V0040,
    V0041,
    V0042,
    V0043,
}

impl ApiVersion {
    /// Preference order used when no explicit list is configured
    pub const NEWEST_FIRST: [Self; 4] = [Self::V0043, Self::V0042, Self::V0041, Self::V0040];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V0040 => "v0.0.40",
            Self::V0041 => "v0.0.41",
            Self::V0042 => "v0.0.42",
            Self::V0043 => "v0.0.43",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    /// Accepts `v0.0.42`, `v0042` and `0.0.42`.
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s.chars().filter(char::is_ascii_digit).collect();
        match digits.as_str() {
            "0040" | "040" => Ok(Self::V0040),
            "0041" | "041" => Ok(Self::V0041),
            "0042" | "042" => Ok(Self::V0042),
            "0043" | "043" => Ok(Self::V0043),
            _ => Err(Error::Config(format!("unsupported slurmrestd version {s:?}"))),
        }
    }
}

/// One protocol-version-specific remote client.
///
/// Implementations map each logical operation onto their version's
/// endpoints. They must report a missing object as [`Error::NotFound`] and an
/// empty reply as [`Error::NoContent`]; any other error makes the chain try
/// the next, older backend.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Label used in logs and errors, e.g. `v0.0.42`
    fn version(&self) -> &str;

    async fn get(&self, object_type: ObjectType, key: &ObjectKey) -> Result<Resource>;

    async fn list(&self, object_type: ObjectType) -> Result<ResourceList>;

    async fn create(&self, object: &Resource) -> Result<Resource>;

    async fn update(&self, patch: &Patch) -> Result<()>;

    async fn delete(&self, object_type: ObjectType, key: &ObjectKey) -> Result<()>;
}
