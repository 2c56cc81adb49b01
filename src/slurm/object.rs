//! The resource model shared by the backends, the informer cache and the
//! facade.
//!
//! Every resource kind is a plain serde struct implementing [`Object`]. The
//! cache and the backend chain are kind-agnostic: they move values around as
//! the closed [`Resource`] enum, so adding a kind is a compile error until
//! every `match` over [`ObjectType`] handles it.

use super::resources::{ControllerPing, JobInfo, Node, PartitionInfo};
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Natural unique key of a resource within its [`ObjectType`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectKey(String);

impl ObjectKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&String> for ObjectKey {
    fn from(key: &String) -> Self {
        Self(key.clone())
    }
}

impl From<u32> for ObjectKey {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

/// Resource kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Node,
    JobInfo,
    PartitionInfo,
    ControllerPing,
}

impl ObjectType {
    pub const ALL: [Self; 4] = [
        Self::Node,
        Self::JobInfo,
        Self::PartitionInfo,
        Self::ControllerPing,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "Node",
            Self::JobInfo => "JobInfo",
            Self::PartitionInfo => "PartitionInfo",
            Self::ControllerPing => "ControllerPing",
        }
    }

    /// Name of the matching list type, e.g. `NodeList`.
    #[must_use]
    pub fn list_name(self) -> String {
        format!("{}List", self.as_str())
    }

    #[must_use]
    pub const fn supports_create(self) -> bool {
        matches!(self, Self::JobInfo)
    }

    #[must_use]
    pub const fn supports_update(self) -> bool {
        matches!(self, Self::Node | Self::JobInfo)
    }

    #[must_use]
    pub const fn supports_delete(self) -> bool {
        matches!(self, Self::Node | Self::JobInfo)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    /// Accepts both the item name and its list name; `NodeList` and `Node`
    /// both resolve to [`ObjectType::Node`]. Matching ignores ASCII case.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let name = trimmed
            .strip_suffix("List")
            .or_else(|| trimmed.strip_suffix("list"))
            .unwrap_or(trimmed);
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Config(format!("unknown object type {s:?}")))
    }
}

/// Capability set every cached resource kind provides.
///
/// Value equality is `PartialEq` and deep copy is `Clone`; the cache never
/// hands out references into its own map.
pub trait Object: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    const TYPE: ObjectType;

    fn key(&self) -> ObjectKey;

    fn into_resource(self) -> Resource;

    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] when `resource` holds another kind.
    fn try_from_resource(resource: Resource) -> Result<Self>;
}

macro_rules! impl_object {
    ($ty:ident, |$this:ident| $key:expr) => {
        impl Object for $ty {
            const TYPE: ObjectType = ObjectType::$ty;

            fn key(&self) -> ObjectKey {
                let $this = self;
                ObjectKey::from($key)
            }

            fn into_resource(self) -> Resource {
                Resource::$ty(self)
            }

            fn try_from_resource(resource: Resource) -> Result<Self> {
                match resource {
                    Resource::$ty(inner) => Ok(inner),
                    other => Err(Error::TypeMismatch {
                        expected: ObjectType::$ty,
                        found: other.object_type(),
                    }),
                }
            }
        }

        impl From<$ty> for Resource {
            fn from(value: $ty) -> Self {
                Self::$ty(value)
            }
        }
    };
}

impl_object!(Node, |n| &n.name);
impl_object!(JobInfo, |j| j.job_id);
impl_object!(PartitionInfo, |p| &p.name);
impl_object!(ControllerPing, |p| &p.hostname);

/// A value of any resource kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Node(Node),
    JobInfo(JobInfo),
    PartitionInfo(PartitionInfo),
    ControllerPing(ControllerPing),
}

impl Resource {
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        match self {
            Self::Node(o) => o.key(),
            Self::JobInfo(o) => o.key(),
            Self::PartitionInfo(o) => o.key(),
            Self::ControllerPing(o) => o.key(),
        }
    }

    #[must_use]
    pub const fn object_type(&self) -> ObjectType {
        match self {
            Self::Node(_) => ObjectType::Node,
            Self::JobInfo(_) => ObjectType::JobInfo,
            Self::PartitionInfo(_) => ObjectType::PartitionInfo,
            Self::ControllerPing(_) => ObjectType::ControllerPing,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as JSON.
    pub fn to_json(&self) -> Result<Value> {
        let value = match self {
            Self::Node(o) => serde_json::to_value(o)?,
            Self::JobInfo(o) => serde_json::to_value(o)?,
            Self::PartitionInfo(o) => serde_json::to_value(o)?,
            Self::ControllerPing(o) => serde_json::to_value(o)?,
        };
        Ok(value)
    }

    /// Decodes one item of `object_type` from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] when the value does not match the kind's schema.
    pub fn from_json(object_type: ObjectType, value: Value) -> Result<Self> {
        let resource = match object_type {
            ObjectType::Node => Self::Node(serde_json::from_value(value)?),
            ObjectType::JobInfo => Self::JobInfo(serde_json::from_value(value)?),
            ObjectType::PartitionInfo => Self::PartitionInfo(serde_json::from_value(value)?),
            ObjectType::ControllerPing => Self::ControllerPing(serde_json::from_value(value)?),
        };
        Ok(resource)
    }

    /// Narrows the value to a concrete kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for any other kind.
    pub fn into_object<T: Object>(self) -> Result<T> {
        T::try_from_resource(self)
    }
}

/// A homogeneous, ordered collection of one resource kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceList {
    object_type: ObjectType,
    items: Vec<Resource>,
}

impl ResourceList {
    #[must_use]
    pub const fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            items: Vec::new(),
        }
    }

    /// Builds a list, rejecting items of another kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] on the first foreign item.
    pub fn from_items(object_type: ObjectType, items: Vec<Resource>) -> Result<Self> {
        let mut list = Self::new(object_type);
        for item in items {
            list.push(item)?;
        }
        Ok(list)
    }

    /// Decodes a JSON array of `object_type` items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the value is not an array of that kind.
    pub fn from_json(object_type: ObjectType, value: Value) -> Result<Self> {
        let values = match value {
            Value::Array(values) => values,
            Value::Null => Vec::new(),
            other => {
                return Err(Error::Custom(format!(
                    "expected a JSON array of {object_type}, got {other}"
                )));
            }
        };
        let items = values
            .into_iter()
            .map(|v| Resource::from_json(object_type, v))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { object_type, items })
    }

    #[must_use]
    pub const fn object_type(&self) -> ObjectType {
        self.object_type
    }

    #[must_use]
    pub fn items(&self) -> &[Resource] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<Resource> {
        self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends an item of this list's kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] when `item` is of another kind.
    pub fn push(&mut self, item: Resource) -> Result<()> {
        if item.object_type() != self.object_type {
            return Err(Error::TypeMismatch {
                expected: self.object_type,
                found: item.object_type(),
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Narrows every item to a concrete kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `T` is not this list's kind.
    pub fn into_objects<T: Object>(self) -> Result<Vec<T>> {
        self.items.into_iter().map(T::try_from_resource).collect()
    }
}

/// The top-level fields that differ between the current and the desired
/// value of one object. This is the body of a remote update.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub object_type: ObjectType,
    pub key: ObjectKey,
    pub fields: Map<String, Value>,
}

impl Patch {
    /// Computes the delta from `current` to `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUpdate`] when the two values are not the same
    /// object (kind or key differ).
    pub fn between(current: &Resource, desired: &Resource) -> Result<Self> {
        if current.object_type() != desired.object_type() {
            return Err(Error::TypeMismatch {
                expected: current.object_type(),
                found: desired.object_type(),
            });
        }
        let key = desired.key();
        if current.key() != key {
            return Err(Error::InvalidUpdate(format!(
                "cannot turn {} {} into {key}",
                current.object_type(),
                current.key()
            )));
        }

        let (Value::Object(before), Value::Object(after)) = (current.to_json()?, desired.to_json()?)
        else {
            return Err(Error::InvalidUpdate(format!(
                "{} does not serialize to a JSON object",
                desired.object_type()
            )));
        };

        let fields = after
            .into_iter()
            .filter(|(name, value)| before.get(name) != Some(value))
            .collect();

        Ok(Self {
            object_type: desired.object_type(),
            key,
            fields,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
