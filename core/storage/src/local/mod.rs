//! Local filesystem driver.
//!
//! The one backend that has to rebuild, from filesystem primitives, what
//! cloud providers hand out for free: namespaced extended-attribute
//! metadata, crash-safe atomic upload, advisory per-path locking, and
//! signed/timed tokens emulating pre-signed URLs.
//!
//! Containers map to first-level directories under the configured base
//! path and blobs to regular files below them. Lock sidecars (`*.lock`),
//! staged uploads (`*.tmp`) and attribute sidecars (`.*.xattr`) share the
//! directory tree with blob content and are excluded from every listing
//! and emptiness check.

mod attrs;
mod lock;

use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use stratus_common::{DownloadTarget, Error, MetaData, Result, UploadSource};
use stratus_signing::TokenSigner;

use crate::driver::{
    Driver, DownloadUrlOptions, FormPost, SignedPayload, UploadOptions, UploadUrlOptions,
};
use crate::helpers::{
    file_checksum, guess_content_type, normalize_parameters, path_etag, validate_file_or_path,
    ChecksumAlgorithm,
};
use crate::object::{Blob, Container};

use attrs::{AttributeBackend, FileAttributes};
use lock::PathLock;

/// Directory names never traversed when listing blobs.
const IGNORED_DIRS: &[&str] = &[".lock", ".hash", ".DS_Store"];

/// Suffix of staged, not-yet-committed uploads.
const TMP_SUFFIX: &str = ".tmp";

/// Extra-parameter normalization table for uploads.
const PUT_OBJECT_KEYS: &[(&str, &str)] = &[("metadata", "meta_data")];

fn default_lock_timeout_ms() -> u64 {
    100
}

/// Configuration for [`LocalDriver`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Base directory all containers live under. Created if absent; must
    /// end up being a directory.
    pub base_path: PathBuf,
    /// Secret for pre-signed upload and download URLs. Required only when
    /// signed-URL generation is used.
    #[serde(default)]
    pub secret: Option<String>,
    /// Salt for namespacing pre-signed URLs.
    #[serde(default)]
    pub salt: Option<String>,
    /// Checksum algorithm for blob materialization.
    #[serde(default)]
    pub checksum: ChecksumAlgorithm,
    /// Force JSON sidecar attribute storage even where native extended
    /// attributes exist. Useful on filesystems that reject user xattrs
    /// (tmpfs, FAT).
    #[serde(default)]
    pub sidecar_attributes: bool,
    /// How long to wait for a contended path lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl LocalConfig {
    /// Configuration with defaults for the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            secret: None,
            salt: None,
            checksum: ChecksumAlgorithm::default(),
            sidecar_attributes: false,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Driver for interacting with the local filesystem.
///
/// ```no_run
/// use stratus_storage::local::{LocalConfig, LocalDriver};
///
/// let mut config = LocalConfig::new("/home/user/webapp/storage");
/// config.secret = Some("my-secret".to_string());
/// let driver = LocalDriver::new(config).unwrap();
/// ```
#[derive(Debug)]
pub struct LocalDriver {
    base_path: PathBuf,
    secret: Option<String>,
    salt: Option<String>,
    checksum: ChecksumAlgorithm,
    attributes: AttributeBackend,
    lock_timeout: Duration,
}

impl LocalDriver {
    /// Create a driver rooted at `config.base_path`.
    ///
    /// # Postconditions
    /// - The base directory exists.
    ///
    /// # Errors
    /// - `Error::Credentials` if the base directory cannot be created for
    ///   lack of permission.
    /// - `Error::InvalidInput` if the base path exists but is not a
    ///   directory.
    pub fn new(config: LocalConfig) -> Result<Self> {
        let base_path = config.base_path;

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|err| {
                if err.kind() == ErrorKind::PermissionDenied {
                    Error::Credentials(err.to_string())
                } else {
                    err.into()
                }
            })?;
        }

        if !base_path.is_dir() {
            return Err(Error::InvalidInput(format!(
                "The base path '{}' is not a directory",
                base_path.display()
            )));
        }

        let attributes = if config.sidecar_attributes {
            AttributeBackend::Sidecar
        } else {
            AttributeBackend::for_platform()
        };

        Ok(Self {
            base_path,
            secret: config.secret,
            salt: config.salt,
            checksum: config.checksum,
            attributes,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        })
    }

    /// Base directory this driver is rooted at.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn signer(&self) -> Result<TokenSigner> {
        let secret = self.secret.as_deref().ok_or_else(|| {
            Error::InvalidInput("A signing secret is required for pre-signed URLs".to_string())
        })?;
        Ok(TokenSigner::new(secret, self.salt.as_deref()))
    }

    /// Resolve a container name to its directory path.
    ///
    /// Names must be a single normal path segment: anything that would
    /// resolve outside the base path is rejected before touching the
    /// filesystem. With `validate`, the directory must also exist.
    fn container_path(&self, name: &str, validate: bool) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        let valid = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !valid || is_reserved_entry(name) {
            return Err(Error::Storage(format!("Invalid container name: {}", name)));
        }

        let full_path = self.base_path.join(name);
        if validate && !full_path.is_dir() {
            return Err(Error::NotFound(format!("container '{}'", name)));
        }

        Ok(full_path)
    }

    /// Resolve a blob name to its file path inside a container.
    ///
    /// Every component must be a normal segment; `..`, absolute paths and
    /// platform prefixes are rejected so a blob can never escape its
    /// container.
    fn blob_path(&self, container: &str, blob_name: &str) -> Result<PathBuf> {
        let mut resolved = self.container_path(container, false)?;
        let mut components = 0usize;

        for component in Path::new(blob_name).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    components += 1;
                }
                _ => {
                    return Err(Error::Storage(format!("Invalid blob name: {}", blob_name)));
                }
            }
        }

        if components == 0 {
            return Err(Error::Storage(format!("Invalid blob name: {}", blob_name)));
        }

        Ok(resolved)
    }

    /// Convert a directory under the base path into a [`Container`].
    fn make_container(&self, name: &str) -> Result<Container> {
        let full_path = self.container_path(name, false)?;
        let meta = fs::metadata(&full_path)
            .map_err(|_| Error::NotFound(format!("container '{}'", name)))?;
        if !meta.is_dir() {
            return Err(Error::NotFound(format!("container '{}'", name)));
        }

        Ok(Container {
            name: name.to_string(),
            created_at: meta.created().ok().map(DateTime::<Utc>::from),
            meta_data: MetaData::new(),
        })
    }

    /// Convert a file inside a container into a [`Blob`].
    ///
    /// Bookkeeping entries (lock sidecars, staged uploads, attribute
    /// sidecars) are not blobs and materialize as `NotFound`.
    fn make_blob(&self, container: &str, blob_name: &str) -> Result<Blob> {
        let full_path = self.blob_path(container, blob_name)?;

        let file_name = full_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_reserved_entry(&file_name) {
            return Err(Error::NotFound(blob_not_found(blob_name, container)));
        }

        let meta = fs::metadata(&full_path)
            .map_err(|_| Error::NotFound(blob_not_found(blob_name, container)))?;
        if !meta.is_file() {
            return Err(Error::NotFound(blob_not_found(blob_name, container)));
        }

        let attributes = self.attributes.get_attributes(&full_path);
        let checksum = file_checksum(&full_path, self.checksum)?;

        Ok(Blob {
            name: blob_name.to_string(),
            container: container.to_string(),
            size: meta.len(),
            checksum,
            etag: path_etag(&full_path),
            meta_data: attributes.meta_data,
            content_type: attributes.content_type,
            content_disposition: attributes.content_disposition,
            cache_control: attributes.cache_control,
            created_at: meta.created().ok().map(DateTime::<Utc>::from),
            modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    fn attributes_from_options(&self, options: &UploadOptions) -> FileAttributes {
        let normalized = normalize_parameters(&options.extra, PUT_OBJECT_KEYS);

        // Metadata passed through `extra` wins over the direct argument.
        let meta_data = match normalized.get("meta_data") {
            Some(Value::Object(entries)) => entries
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|value| (key.clone(), value.to_string()))
                })
                .collect(),
            _ => options.meta_data.clone(),
        };

        FileAttributes {
            meta_data,
            content_type: None,
            content_disposition: options.content_disposition.clone(),
            cache_control: options.cache_control.clone(),
        }
    }
}

impl Driver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    fn validate_credentials(&self) -> Result<()> {
        let probe = self.base_path.join(".credentials-probe.tmp");
        let outcome = File::create(&probe).and_then(|mut file| file.write_all(b"probe"));
        let _ = fs::remove_file(&probe);

        outcome.map_err(|err| {
            Error::Credentials(format!("{}: '{}'", err, self.base_path.display()))
        })
    }

    fn create_container(
        &self,
        name: &str,
        meta_data: Option<MetaData>,
        acl: Option<&str>,
    ) -> Result<Container> {
        if acl.is_some() {
            info!("Option is not supported by the local driver: acl");
        }
        if meta_data.is_some_and(|meta| !meta.is_empty()) {
            info!("Option is not supported by the local driver: meta_data");
        }

        let full_path = self.container_path(name, false)?;
        {
            let _lock = PathLock::acquire(&full_path, self.lock_timeout)?;
            if !full_path.exists() {
                fs::create_dir_all(&full_path)?;
            }
        }

        self.make_container(name)
    }

    fn get_container(&self, name: &str) -> Result<Container> {
        self.make_container(name)
    }

    fn delete_container(&self, container: &Container) -> Result<()> {
        let full_path = self.container_path(&container.name, true)?;

        {
            let mut blobs = self.blobs(container)?;
            if let Some(entry) = blobs.next() {
                entry?;
                return Err(Error::NotEmpty(container.name.clone()));
            }
        }

        let _lock = PathLock::acquire(&full_path, self.lock_timeout)?;
        fs::remove_dir_all(&full_path)?;
        Ok(())
    }

    fn containers(&self) -> Result<Box<dyn Iterator<Item = Result<Container>> + '_>> {
        let entries = fs::read_dir(&self.base_path)?;

        let iter = entries.filter_map(move |entry| match entry {
            Ok(entry) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if !is_dir || is_reserved_entry(&name) || IGNORED_DIRS.contains(&name.as_str())
                {
                    return None;
                }
                Some(self.make_container(&name))
            }
            Err(err) => Some(Err(err.into())),
        });

        Ok(Box::new(iter))
    }

    fn container_cdn_url(&self, container: &Container) -> Result<String> {
        let full_path = self.container_path(&container.name, true)?;
        Ok(full_path.display().to_string())
    }

    fn upload_blob(
        &self,
        container: &Container,
        source: UploadSource<'_>,
        blob_name: Option<&str>,
        options: &UploadOptions,
    ) -> Result<Blob> {
        if options.acl.is_some() {
            info!("Option is not supported by the local driver: acl");
        }

        self.container_path(&container.name, true)?;

        let blob_name = match blob_name {
            Some(name) => name.to_string(),
            None => validate_file_or_path(&source)?.ok_or_else(|| {
                Error::InvalidInput(
                    "A blob name is required when uploading from a reader".to_string(),
                )
            })?,
        };

        let blob_path = self.blob_path(&container.name, &blob_name)?;
        let file_name = blob_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_reserved_entry(&file_name) {
            return Err(Error::Storage(format!("Invalid blob name: {}", blob_name)));
        }

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut attributes = self.attributes_from_options(options);
        let tmp_path = staging_path(&blob_path);

        {
            let _lock = PathLock::acquire(&blob_path, self.lock_timeout)?;

            // Stage to a temp sibling and sync before the rename so a crash
            // mid-write leaves the canonical name untouched.
            let mut staged = File::create(&tmp_path)?;
            match source {
                UploadSource::Path(path) => {
                    let mut reader = File::open(path)?;
                    io::copy(&mut reader, &mut staged)?;
                }
                UploadSource::Reader(reader) => {
                    io::copy(reader, &mut staged)?;
                }
            }
            staged.flush()?;
            staged.sync_all()?;
            drop(staged);

            // Commit point: readers only ever observe the old blob or the
            // new one, never a partial write.
            fs::rename(&tmp_path, &blob_path)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&blob_path, fs::Permissions::from_mode(0o664))?;
        }

        attributes.content_type = options
            .content_type
            .clone()
            .or_else(|| guess_content_type(&blob_path));
        self.attributes.set_attributes(&blob_path, &attributes);

        self.make_blob(&container.name, &blob_name)
    }

    fn get_blob(&self, container: &Container, blob_name: &str) -> Result<Blob> {
        self.make_blob(&container.name, blob_name)
    }

    fn blobs<'a>(
        &'a self,
        container: &'a Container,
    ) -> Result<Box<dyn Iterator<Item = Result<Blob>> + 'a>> {
        let container_path = self.container_path(&container.name, true)?;
        let walker = BlobWalker::new(container_path)?;

        Ok(Box::new(walker.map(move |entry| {
            entry.and_then(|name| self.make_blob(&container.name, &name))
        })))
    }

    fn download_blob(&self, blob: &Blob, destination: DownloadTarget<'_>) -> Result<()> {
        let blob_path = self.blob_path(&blob.container, &blob.name)?;
        if !blob_path.is_file() {
            return Err(Error::NotFound(blob_not_found(&blob.name, &blob.container)));
        }

        match destination {
            DownloadTarget::Path(dest) => {
                let target = if dest.is_dir() {
                    dest.join(&blob.name)
                } else {
                    dest.to_path_buf()
                };
                if let Some(parent) = target.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        return Err(Error::Storage(format!(
                            "Path {} does not exist",
                            parent.display()
                        )));
                    }
                }
                fs::copy(&blob_path, &target)?;
            }
            DownloadTarget::Writer(writer) => {
                let mut file = File::open(&blob_path)?;
                io::copy(&mut file, writer)?;
            }
        }

        Ok(())
    }

    fn delete_blob(&self, blob: &Blob) -> Result<()> {
        let blob_path = self.blob_path(&blob.container, &blob.name)?;
        if !blob_path.is_file() {
            return Err(Error::NotFound(blob_not_found(&blob.name, &blob.container)));
        }

        {
            let _lock = PathLock::acquire(&blob_path, self.lock_timeout)?;
            fs::remove_file(&blob_path)?;
        }

        self.attributes.remove_attributes(&blob_path);
        Ok(())
    }

    fn blob_cdn_url(&self, blob: &Blob) -> Result<String> {
        let blob_path = self.blob_path(&blob.container, &blob.name)?;
        Ok(blob_path.display().to_string())
    }

    fn generate_container_upload_url(
        &self,
        container: &Container,
        blob_name: &str,
        expires: i64,
        options: &UploadUrlOptions,
    ) -> Result<FormPost> {
        let signer = self.signer()?;
        let expires_at = Utc::now().timestamp() + expires;

        let mut fields = Map::new();
        fields.insert("blob_name".to_string(), json!(blob_name));
        fields.insert("container".to_string(), json!(container.name));
        fields.insert("expires".to_string(), json!(expires_at));

        let mut payload = Map::new();
        payload.insert("acl".to_string(), json!(options.acl));
        payload.insert("meta_data".to_string(), json!(options.meta_data));
        payload.insert(
            "content_disposition".to_string(),
            json!(options.content_disposition),
        );
        payload.insert("content_length".to_string(), json!(options.content_length));
        payload.insert("content_type".to_string(), json!(options.content_type));
        payload.insert("cache_control".to_string(), json!(options.cache_control));
        payload.insert("max_age".to_string(), json!(expires));
        for (key, value) in &fields {
            payload.insert(key.clone(), value.clone());
        }
        for (key, value) in &options.extra {
            payload.insert(key.clone(), value.clone());
        }

        let token = signer.encode(&Value::Object(payload))?;
        fields.insert("signature".to_string(), json!(token));

        Ok(FormPost {
            url: String::new(),
            fields,
        })
    }

    fn generate_blob_download_url(
        &self,
        blob: &Blob,
        expires: i64,
        options: &DownloadUrlOptions,
    ) -> Result<String> {
        let signer = self.signer()?;
        let expires_at = Utc::now().timestamp() + expires;

        let mut payload = Map::new();
        payload.insert("max_age".to_string(), json!(expires));
        payload.insert("expires".to_string(), json!(expires_at));
        payload.insert("blob_name".to_string(), json!(blob.name));
        payload.insert("container".to_string(), json!(blob.container));
        payload.insert("method".to_string(), json!(options.method));
        payload.insert(
            "content_disposition".to_string(),
            json!(options.content_disposition),
        );
        for (key, value) in &options.extra {
            payload.insert(key.clone(), value.clone());
        }

        signer.encode(&Value::Object(payload))
    }

    fn validate_signature(&self, signature: &str) -> Result<SignedPayload> {
        let signer = self.signer()?;

        // The age limit is a property of the payload itself, so it is not
        // known before a first verification pass recovers it.
        let payload = signer.decode(signature, None)?;
        let max_age = payload.get("max_age").and_then(Value::as_i64).unwrap_or(0);

        match signer.decode(signature, Some(max_age))? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::InvalidSignature(
                "Payload is not an object".to_string(),
            )),
        }
    }
}

/// True if `name` is backend bookkeeping rather than blob content.
fn is_reserved_entry(name: &str) -> bool {
    lock::is_lock_name(name) || name.ends_with(TMP_SUFFIX) || attrs::is_sidecar_name(name)
}

/// Staging path for an in-flight upload (`<path>.tmp`).
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

fn blob_not_found(blob_name: &str, container: &str) -> String {
    format!("blob '{}' in container '{}'", blob_name, container)
}

/// Depth-first lazy traversal of a container directory, yielding blob
/// names relative to the container with `/` separators.
struct BlobWalker {
    root: PathBuf,
    stack: Vec<fs::ReadDir>,
}

impl BlobWalker {
    fn new(root: PathBuf) -> Result<Self> {
        let first = fs::read_dir(&root)?;
        Ok(Self {
            root,
            stack: vec![first],
        })
    }

    fn relative_name(&self, path: &Path) -> Result<String> {
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            Error::Storage(format!(
                "Path '{}' escapes container '{}'",
                path.display(),
                self.root.display()
            ))
        })?;

        Ok(relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }
}

impl Iterator for BlobWalker {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            let entry = match top.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Err(err)) => return Some(Err(err.into())),
                Some(Ok(entry)) => entry,
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => return Some(Err(err.into())),
            };

            if file_type.is_dir() {
                if !IGNORED_DIRS.contains(&name.as_str()) {
                    match fs::read_dir(entry.path()) {
                        Ok(read_dir) => self.stack.push(read_dir),
                        Err(err) => return Some(Err(err.into())),
                    }
                }
            } else if !is_reserved_entry(&name) {
                return Some(self.relative_name(&entry.path()));
            }
        }
    }
}
