//! Storage driver trait definition.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use stratus_common::{ContentLength, DownloadTarget, Error, MetaData, Result, UploadSource};

use crate::object::{Blob, Container};

/// Payload recovered from a validated signed token.
pub type SignedPayload = Map<String, Value>;

/// Outcome of an optional backend capability.
///
/// Backends either perform the operation or report it as unsupported;
/// genuine failures use the error channel. This keeps "the backend cannot
/// do this" distinguishable from "the backend tried and failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The operation was performed.
    Done,
    /// The backend does not support the operation.
    Unsupported,
}

impl Capability {
    /// True if the backend performed the operation.
    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Done)
    }
}

/// Options accepted by [`Driver::upload_blob`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Canned access control. Not supported by every backend.
    pub acl: Option<String>,
    /// Key/value metadata stored alongside the blob.
    pub meta_data: MetaData,
    /// MIME type. Probed from content when absent.
    pub content_type: Option<String>,
    /// Content-Disposition header value.
    pub content_disposition: Option<String>,
    /// Cache-Control header value.
    pub cache_control: Option<String>,
    /// Backend-specific extra parameters, normalized per driver.
    pub extra: Map<String, Value>,
}

/// Options accepted by [`Driver::generate_container_upload_url`].
#[derive(Debug, Clone, Default)]
pub struct UploadUrlOptions {
    /// Canned access control for the uploaded blob.
    pub acl: Option<String>,
    /// Key/value metadata the upload must carry.
    pub meta_data: MetaData,
    /// Content-Disposition the upload must carry.
    pub content_disposition: Option<String>,
    /// Accepted content length range (min, max) in bytes.
    pub content_length: Option<ContentLength>,
    /// MIME type the upload must carry.
    pub content_type: Option<String>,
    /// Cache-Control the upload must carry.
    pub cache_control: Option<String>,
    /// Caller-supplied extra payload fields.
    pub extra: Map<String, Value>,
}

/// Options accepted by [`Driver::generate_blob_download_url`].
#[derive(Debug, Clone)]
pub struct DownloadUrlOptions {
    /// HTTP method the URL is valid for.
    pub method: String,
    /// Content-Disposition to apply on download.
    pub content_disposition: Option<String>,
    /// Caller-supplied extra payload fields.
    pub extra: Map<String, Value>,
}

impl Default for DownloadUrlOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            content_disposition: None,
            extra: Map::new(),
        }
    }
}

/// Pre-signed POST form: the URL to post to plus the form fields the
/// client must include.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormPost {
    /// Endpoint URL. Empty for backends without one (local driver).
    pub url: String,
    /// Form fields, including the `signature` field.
    pub fields: Map<String, Value>,
}

/// Storage driver contract: one vocabulary over heterogeneous backends.
///
/// All operations are synchronous and block the calling thread; drivers
/// spawn no background work. Concurrency arises only from independent
/// callers invoking the same driver, and each backend documents what it
/// guarantees in that case.
pub trait Driver: Send + Sync {
    /// Driver name (e.g. "local", "memory").
    fn name(&self) -> &str;

    /// Verify the driver's credentials/configuration are usable.
    ///
    /// # Errors
    /// - `Error::Credentials` if the backend cannot be written to.
    fn validate_credentials(&self) -> Result<()>;

    /// Regions offered by the backend. Empty for region-less backends.
    fn regions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Create a container, idempotently.
    ///
    /// # Postconditions
    /// - The container exists; creating an existing container is not an
    ///   error.
    ///
    /// # Errors
    /// - `Error::Storage` if the name is invalid for the backend.
    fn create_container(
        &self,
        name: &str,
        meta_data: Option<MetaData>,
        acl: Option<&str>,
    ) -> Result<Container>;

    /// Fetch an existing container.
    ///
    /// # Errors
    /// - `Error::NotFound` if the container does not exist.
    fn get_container(&self, name: &str) -> Result<Container>;

    /// Update mutable container attributes in place.
    ///
    /// Optional capability; backends without attribute patching reject the
    /// call outright rather than silently dropping changes.
    fn patch_container(&self, container: &Container) -> Result<()> {
        Err(Error::NotSupported(format!(
            "Driver '{}' does not support patch_container",
            self.name()
        )))
    }

    /// Delete an empty container.
    ///
    /// # Errors
    /// - `Error::NotFound` if the container does not exist.
    /// - `Error::NotEmpty` if any blob remains in the container.
    fn delete_container(&self, container: &Container) -> Result<()>;

    /// Iterate over all containers.
    ///
    /// The iterator is lazy; calling this method again restarts the
    /// traversal. Listings are not isolated from concurrent mutation.
    fn containers(&self) -> Result<Box<dyn Iterator<Item = Result<Container>> + '_>>;

    /// Content delivery URL for a container.
    fn container_cdn_url(&self, container: &Container) -> Result<String>;

    /// Enable content delivery for a container.
    fn enable_container_cdn(&self, _container: &Container) -> Result<Capability> {
        warn!("Feature is not supported by driver '{}': {}", self.name(), "enable_container_cdn");
        Ok(Capability::Unsupported)
    }

    /// Disable content delivery for a container.
    fn disable_container_cdn(&self, _container: &Container) -> Result<Capability> {
        warn!("Feature is not supported by driver '{}': {}", self.name(), "disable_container_cdn");
        Ok(Capability::Unsupported)
    }

    /// Upload a blob into a container, overwriting any existing blob of
    /// the same name.
    ///
    /// # Preconditions
    /// - The container must exist.
    /// - `blob_name` is required when `source` is an anonymous reader.
    ///
    /// # Postconditions
    /// - Either the blob is fully stored and returned, or the canonical
    ///   blob name is observably unchanged.
    fn upload_blob(
        &self,
        container: &Container,
        source: UploadSource<'_>,
        blob_name: Option<&str>,
        options: &UploadOptions,
    ) -> Result<Blob>;

    /// Fetch a single blob.
    ///
    /// # Errors
    /// - `Error::NotFound` if the blob does not exist.
    fn get_blob(&self, container: &Container, blob_name: &str) -> Result<Blob>;

    /// Iterate over all blobs in a container.
    ///
    /// The iterator is lazy and restartable; backend bookkeeping entries
    /// are never yielded.
    fn blobs<'a>(
        &'a self,
        container: &'a Container,
    ) -> Result<Box<dyn Iterator<Item = Result<Blob>> + 'a>>;

    /// Download a blob's content to a path or writer.
    fn download_blob(&self, blob: &Blob, destination: DownloadTarget<'_>) -> Result<()>;

    /// Update mutable blob attributes in place.
    ///
    /// Optional capability; see [`Driver::patch_container`].
    fn patch_blob(&self, blob: &Blob) -> Result<()> {
        Err(Error::NotSupported(format!(
            "Driver '{}' does not support patch_blob",
            self.name()
        )))
    }

    /// Delete a blob.
    ///
    /// # Errors
    /// - `Error::NotFound` if the blob does not exist.
    fn delete_blob(&self, blob: &Blob) -> Result<()>;

    /// Content delivery URL for a blob.
    fn blob_cdn_url(&self, blob: &Blob) -> Result<String>;

    /// Generate a pre-signed form POST for uploading into a container.
    ///
    /// `expires` is the validity window in seconds from now.
    fn generate_container_upload_url(
        &self,
        container: &Container,
        blob_name: &str,
        expires: i64,
        options: &UploadUrlOptions,
    ) -> Result<FormPost>;

    /// Generate a pre-signed download token for a blob.
    ///
    /// `expires` is the validity window in seconds from now.
    fn generate_blob_download_url(
        &self,
        blob: &Blob,
        expires: i64,
        options: &DownloadUrlOptions,
    ) -> Result<String>;

    /// Validate a signed token and return its payload.
    ///
    /// # Errors
    /// - `Error::InvalidSignature` if the token is tampered or malformed.
    /// - `Error::SignatureExpired` if the token is past its validity
    ///   window.
    fn validate_signature(&self, signature: &str) -> Result<SignedPayload>;
}
