//! In-memory storage driver for testing.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use stratus_common::{DownloadTarget, Error, MetaData, Result, UploadSource};

use crate::driver::{
    Driver, DownloadUrlOptions, FormPost, SignedPayload, UploadOptions, UploadUrlOptions,
};
use crate::helpers::{checksum_reader, guess_content_type, validate_file_or_path, ChecksumAlgorithm};
use crate::object::{Blob, Container};

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    blob: Blob,
}

#[derive(Debug)]
struct StoredContainer {
    created_at: DateTime<Utc>,
    blobs: HashMap<String, StoredBlob>,
}

/// In-memory storage driver.
///
/// Useful for testing and development. All data is stored in memory and
/// lost on drop. Pre-signed URLs are not supported: there is no secret
/// and no endpoint for a purely in-process backend.
pub struct MemoryDriver {
    containers: RwLock<HashMap<String, StoredContainer>>,
    checksum: ChecksumAlgorithm,
}

impl MemoryDriver {
    /// Create a new empty memory driver.
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            checksum: ChecksumAlgorithm::default(),
        }
    }

    fn make_container(name: &str, stored: &StoredContainer) -> Container {
        Container {
            name: name.to_string(),
            created_at: Some(stored.created_at),
            meta_data: MetaData::new(),
        }
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::NotSupported(format!(
            "Driver '{}' does not support {}",
            self.name(),
            operation
        ))
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn validate_credentials(&self) -> Result<()> {
        Ok(())
    }

    fn create_container(
        &self,
        name: &str,
        meta_data: Option<MetaData>,
        acl: Option<&str>,
    ) -> Result<Container> {
        if acl.is_some() {
            info!("Option is not supported by the memory driver: acl");
        }
        if meta_data.is_some_and(|meta| !meta.is_empty()) {
            info!("Option is not supported by the memory driver: meta_data");
        }
        if name.is_empty() {
            return Err(Error::Storage(format!("Invalid container name: {}", name)));
        }

        let mut containers = self.containers.write().unwrap();
        let stored = containers
            .entry(name.to_string())
            .or_insert_with(|| StoredContainer {
                created_at: Utc::now(),
                blobs: HashMap::new(),
            });

        Ok(Self::make_container(name, stored))
    }

    fn get_container(&self, name: &str) -> Result<Container> {
        let containers = self.containers.read().unwrap();
        let stored = containers
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("container '{}'", name)))?;
        Ok(Self::make_container(name, stored))
    }

    fn delete_container(&self, container: &Container) -> Result<()> {
        let mut containers = self.containers.write().unwrap();
        let stored = containers
            .get(&container.name)
            .ok_or_else(|| Error::NotFound(format!("container '{}'", container.name)))?;

        if !stored.blobs.is_empty() {
            return Err(Error::NotEmpty(container.name.clone()));
        }

        containers.remove(&container.name);
        Ok(())
    }

    fn containers(&self) -> Result<Box<dyn Iterator<Item = Result<Container>> + '_>> {
        let containers = self.containers.read().unwrap();
        let snapshot: Vec<Container> = containers
            .iter()
            .map(|(name, stored)| Self::make_container(name, stored))
            .collect();

        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn container_cdn_url(&self, container: &Container) -> Result<String> {
        self.get_container(&container.name)?;
        Ok(format!("memory://{}", container.name))
    }

    fn upload_blob(
        &self,
        container: &Container,
        source: UploadSource<'_>,
        blob_name: Option<&str>,
        options: &UploadOptions,
    ) -> Result<Blob> {
        if options.acl.is_some() {
            info!("Option is not supported by the memory driver: acl");
        }

        let blob_name = match blob_name {
            Some(name) => name.to_string(),
            None => validate_file_or_path(&source)?.ok_or_else(|| {
                Error::InvalidInput(
                    "A blob name is required when uploading from a reader".to_string(),
                )
            })?,
        };

        let data = match source {
            UploadSource::Path(path) => fs::read(path)?,
            UploadSource::Reader(reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer)?;
                buffer
            }
        };

        let checksum = checksum_reader(&mut data.as_slice(), self.checksum)?;
        let content_type = options
            .content_type
            .clone()
            .or_else(|| guess_content_type(Path::new(&blob_name)));
        let now = Utc::now();

        let blob = Blob {
            name: blob_name.clone(),
            container: container.name.clone(),
            size: data.len() as u64,
            checksum,
            etag: Uuid::new_v4().simple().to_string(),
            meta_data: options.meta_data.clone(),
            content_type,
            content_disposition: options.content_disposition.clone(),
            cache_control: options.cache_control.clone(),
            created_at: Some(now),
            modified_at: Some(now),
        };

        let mut containers = self.containers.write().unwrap();
        let stored = containers
            .get_mut(&container.name)
            .ok_or_else(|| Error::NotFound(format!("container '{}'", container.name)))?;
        stored.blobs.insert(
            blob_name,
            StoredBlob {
                data,
                blob: blob.clone(),
            },
        );

        Ok(blob)
    }

    fn get_blob(&self, container: &Container, blob_name: &str) -> Result<Blob> {
        let containers = self.containers.read().unwrap();
        let stored = containers
            .get(&container.name)
            .ok_or_else(|| Error::NotFound(format!("container '{}'", container.name)))?;

        stored
            .blobs
            .get(blob_name)
            .map(|entry| entry.blob.clone())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "blob '{}' in container '{}'",
                    blob_name, container.name
                ))
            })
    }

    fn blobs<'a>(
        &'a self,
        container: &'a Container,
    ) -> Result<Box<dyn Iterator<Item = Result<Blob>> + 'a>> {
        let containers = self.containers.read().unwrap();
        let stored = containers
            .get(&container.name)
            .ok_or_else(|| Error::NotFound(format!("container '{}'", container.name)))?;

        let snapshot: Vec<Blob> = stored
            .blobs
            .values()
            .map(|entry| entry.blob.clone())
            .collect();

        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn download_blob(&self, blob: &Blob, destination: DownloadTarget<'_>) -> Result<()> {
        let containers = self.containers.read().unwrap();
        let data = containers
            .get(&blob.container)
            .and_then(|stored| stored.blobs.get(&blob.name))
            .map(|entry| entry.data.clone())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "blob '{}' in container '{}'",
                    blob.name, blob.container
                ))
            })?;
        drop(containers);

        match destination {
            DownloadTarget::Path(dest) => {
                let target = if dest.is_dir() {
                    dest.join(&blob.name)
                } else {
                    dest.to_path_buf()
                };
                fs::write(target, data)?;
            }
            DownloadTarget::Writer(writer) => {
                writer.write_all(&data)?;
            }
        }

        Ok(())
    }

    fn delete_blob(&self, blob: &Blob) -> Result<()> {
        let mut containers = self.containers.write().unwrap();
        let stored = containers
            .get_mut(&blob.container)
            .ok_or_else(|| Error::NotFound(format!("container '{}'", blob.container)))?;

        stored.blobs.remove(&blob.name).ok_or_else(|| {
            Error::NotFound(format!(
                "blob '{}' in container '{}'",
                blob.name, blob.container
            ))
        })?;
        Ok(())
    }

    fn blob_cdn_url(&self, blob: &Blob) -> Result<String> {
        Ok(format!("memory://{}/{}", blob.container, blob.name))
    }

    fn generate_container_upload_url(
        &self,
        _container: &Container,
        _blob_name: &str,
        _expires: i64,
        _options: &UploadUrlOptions,
    ) -> Result<FormPost> {
        Err(self.unsupported("generate_container_upload_url"))
    }

    fn generate_blob_download_url(
        &self,
        _blob: &Blob,
        _expires: i64,
        _options: &DownloadUrlOptions,
    ) -> Result<String> {
        Err(self.unsupported("generate_blob_download_url"))
    }

    fn validate_signature(&self, _signature: &str) -> Result<SignedPayload> {
        Err(self.unsupported("validate_signature"))
    }
}
