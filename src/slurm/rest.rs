//! slurmrestd backend for one protocol version
//!
//! The endpoint layout is the same across the supported revisions apart from
//! the version segment, so one implementation serves all of them:
//! `/slurm/{version}/{nodes,node/{name},jobs,job/{id},job/submit,partitions,partition/{name},ping}`.
//! Every response is an envelope `{ "<items>": [...], "errors": [...], "warnings": [...] }`.

use super::backend::{ApiVersion, Backend};
use super::object::{Object, ObjectKey, ObjectType, Patch, Resource, ResourceList};
use super::resources::JobInfo;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// Header slurmrestd reads the JWT from
pub const TOKEN_HEADER: &str = "x-slurm-user-token";

/// Errors reported by slurmrestd inside an otherwise well-formed reply
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("slurmrestd returned {status}: {}", .errors.join("; "))]
pub struct ApiError {
    pub status: u16,
    pub errors: Vec<String>,
}

/// Create the HTTP client shared by every backend version
///
/// An invalid user agent or token is logged and left out rather than failing
/// client creation.
///
/// # Errors
///
/// Will return `Err` if the underlying TLS/HTTP client cannot be built
pub fn http_client(user_agent: Option<&str>, token: Option<&str>) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();

    if let Some(token) = token {
        match HeaderValue::from_str(token) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(HeaderName::from_static(TOKEN_HEADER), value);
            }
            Err(e) => warn!("ignoring malformed auth token: {}", e),
        }
    }

    let mut builder = reqwest::Client::builder().default_headers(headers);
    if let Some(user_agent) = user_agent {
        match HeaderValue::from_str(user_agent) {
            Ok(value) => builder = builder.user_agent(value),
            Err(e) => warn!("ignoring invalid user agent {:?}: {}", user_agent, e),
        }
    }

    Ok(builder.build()?)
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    errors: Vec<Message>,
    #[serde(default)]
    warnings: Vec<Message>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Message {
    description: String,
    error: String,
    error_number: i64,
}

impl Message {
    fn text(&self) -> String {
        match (self.error.is_empty(), self.description.is_empty()) {
            (false, false) => format!("{} ({})", self.error, self.description),
            (false, true) => self.error.clone(),
            (true, false) => self.description.clone(),
            (true, true) => format!("error {}", self.error_number),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestBackend {
    version: ApiVersion,
    base_url: String,
    http: reqwest::Client,
}

impl RestBackend {
    #[must_use]
    pub fn new(version: ApiVersion, base_url: &str, http: reqwest::Client) -> Self {
        Self {
            version,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    #[must_use]
    pub const fn api_version(&self) -> ApiVersion {
        self.version
    }

    fn url(&self, path: &str) -> String {
        format!("{}/slurm/{}/{}", self.base_url, self.version, path)
    }

    /// Collection path and envelope field for a kind
    const fn collection(object_type: ObjectType) -> (&'static str, &'static str) {
        match object_type {
            ObjectType::Node => ("nodes", "nodes"),
            ObjectType::JobInfo => ("jobs", "jobs"),
            ObjectType::PartitionInfo => ("partitions", "partitions"),
            ObjectType::ControllerPing => ("ping", "pings"),
        }
    }

    /// Single-object path, for the kinds that have one
    fn item_path(object_type: ObjectType, key: &ObjectKey) -> Option<String> {
        match object_type {
            ObjectType::Node => Some(format!("node/{key}")),
            ObjectType::JobInfo => Some(format!("job/{key}")),
            ObjectType::PartitionInfo => Some(format!("partition/{key}")),
            ObjectType::ControllerPing => None,
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        target: Option<(ObjectType, &ObjectKey)>,
    ) -> Result<Envelope> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if status == StatusCode::NO_CONTENT {
            return Err(Error::NoContent);
        }

        let envelope = if bytes.is_empty() {
            Envelope::default()
        } else {
            match serde_json::from_slice::<Envelope>(&bytes) {
                Ok(envelope) => envelope,
                // A plain-text 404 means this version's endpoint does not exist
                Err(_) if !status.is_success() => {
                    return Err(Error::Api(ApiError {
                        status: status.as_u16(),
                        errors: vec![String::from_utf8_lossy(&bytes).trim().to_string()],
                    }));
                }
                Err(e) => return Err(e.into()),
            }
        };

        for warning in &envelope.warnings {
            debug!("{} {}: {}", self.version, path, warning.text());
        }

        if status == StatusCode::NOT_FOUND && !envelope.errors.is_empty() {
            if let Some((object_type, key)) = target {
                return Err(Error::not_found(object_type, key.clone()));
            }
        }

        if !status.is_success() || !envelope.errors.is_empty() {
            return Err(Error::Api(ApiError {
                status: status.as_u16(),
                errors: envelope.errors.iter().map(Message::text).collect(),
            }));
        }

        Ok(envelope)
    }

    fn items(object_type: ObjectType, mut envelope: Envelope) -> Result<ResourceList> {
        let (_, field) = Self::collection(object_type);
        let value = envelope.payload.remove(field).unwrap_or(Value::Null);
        ResourceList::from_json(object_type, value)
    }
}

#[async_trait]
impl Backend for RestBackend {
    fn version(&self) -> &str {
        self.version.as_str()
    }

    async fn get(&self, object_type: ObjectType, key: &ObjectKey) -> Result<Resource> {
        let Some(path) = Self::item_path(object_type, key) else {
            // no single-object endpoint: pick it out of the collection
            let list = self.list(object_type).await?;
            return list
                .into_items()
                .into_iter()
                .find(|item| &item.key() == key)
                .ok_or_else(|| Error::not_found(object_type, key.clone()));
        };

        let envelope = self
            .call(Method::GET, &path, None, Some((object_type, key)))
            .await?;
        Self::items(object_type, envelope)?
            .into_items()
            .into_iter()
            .find(|item| &item.key() == key)
            .ok_or_else(|| Error::not_found(object_type, key.clone()))
    }

    async fn list(&self, object_type: ObjectType) -> Result<ResourceList> {
        let (path, _) = Self::collection(object_type);
        let envelope = self.call(Method::GET, path, None, None).await?;
        Self::items(object_type, envelope)
    }

    async fn create(&self, object: &Resource) -> Result<Resource> {
        let Resource::JobInfo(job) = object else {
            return Err(Error::unimplemented(object.object_type(), "create"));
        };

        let body = json!({ "job": job });
        let mut envelope = self.call(Method::POST, "job/submit", Some(&body), None).await?;
        let job_id = envelope
            .payload
            .remove("job_id")
            .and_then(|v| v.as_u64())
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| Error::Custom("job submission returned no job_id".to_string()))?;

        debug!("submitted job {} via {}", job_id, self.version);
        let created = JobInfo {
            job_id,
            ..job.clone()
        };
        Ok(created.into_resource())
    }

    async fn update(&self, patch: &Patch) -> Result<()> {
        let path = match patch.object_type {
            ObjectType::Node | ObjectType::JobInfo => Self::item_path(patch.object_type, &patch.key),
            ObjectType::PartitionInfo | ObjectType::ControllerPing => None,
        }
        .ok_or_else(|| Error::unimplemented(patch.object_type, "update"))?;

        let body = Value::Object(patch.fields.clone());
        self.call(Method::POST, &path, Some(&body), Some((patch.object_type, &patch.key)))
            .await?;
        Ok(())
    }

    async fn delete(&self, object_type: ObjectType, key: &ObjectKey) -> Result<()> {
        let path = match object_type {
            ObjectType::Node | ObjectType::JobInfo => Self::item_path(object_type, key),
            ObjectType::PartitionInfo | ObjectType::ControllerPing => None,
        }
        .ok_or_else(|| Error::unimplemented(object_type, "delete"))?;

        self.call(Method::DELETE, &path, None, Some((object_type, key)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RestBackend {
        RestBackend::new(ApiVersion::V0042, "http://slurm:6820/", reqwest::Client::new())
    }

    #[test]
    fn test_url_layout() {
        let b = backend();
        assert_eq!(b.url("nodes"), "http://slurm:6820/slurm/v0.0.42/nodes");
        assert_eq!(
            RestBackend::item_path(ObjectType::JobInfo, &ObjectKey::from(17u32)).as_deref(),
            Some("job/17")
        );
        assert!(RestBackend::item_path(ObjectType::ControllerPing, &ObjectKey::from("c1")).is_none());
    }

    #[test]
    fn test_envelope_items_decode() {
        let envelope: Envelope = serde_json::from_value(json!({
            "nodes": [{"name": "n1", "state": ["IDLE"]}],
            "warnings": [{"description": "deprecated field"}],
            "errors": []
        }))
        .unwrap();
        assert_eq!(envelope.warnings.len(), 1);
        let list = RestBackend::items(ObjectType::Node, envelope).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.items()[0].key().as_str(), "n1");
    }

    #[test]
    fn test_missing_collection_field_is_empty_list() {
        let list = RestBackend::items(ObjectType::JobInfo, Envelope::default()).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_message_text() {
        let msg = Message {
            error: "Invalid job id".to_string(),
            description: "job 9 not found".to_string(),
            error_number: 2017,
        };
        assert_eq!(msg.text(), "Invalid job id (job 9 not found)");
        assert_eq!(Message::default().text(), "error 0");
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError {
            status: 500,
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "slurmrestd returned 500: a; b");
    }

    #[test]
    fn test_http_client_tolerates_bad_headers() {
        assert!(http_client(Some("slurm-informer/1.0"), Some("token")).is_ok());
        assert!(http_client(Some("bad\nagent"), Some("bad\ntoken")).is_ok());
    }
}
