//! Container and blob value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratus_common::MetaData;

/// A named grouping of blobs.
///
/// On the local driver a container maps to a first-level directory under
/// the base path. Containers are plain values: they carry no handle back
/// to the driver that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Container name, unique per driver instance.
    pub name: String,
    /// Creation time, where the backend can report one.
    pub created_at: Option<DateTime<Utc>>,
    /// Key/value metadata. Not persisted by every backend.
    #[serde(default)]
    pub meta_data: MetaData,
}

/// An object stored inside a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    /// Name relative to the container. May contain `/` to emulate nesting.
    pub name: String,
    /// Name of the container holding this blob.
    pub container: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex-encoded content hash, recomputed from the stored bytes on every
    /// materialization.
    pub checksum: String,
    /// Derived from the blob's storage path, not its content. Callers must
    /// not assume the etag changes when the content does.
    pub etag: String,
    /// Key/value metadata.
    #[serde(default)]
    pub meta_data: MetaData,
    /// MIME type.
    pub content_type: Option<String>,
    /// Content-Disposition header value.
    pub content_disposition: Option<String>,
    /// Cache-Control header value.
    pub cache_control: Option<String>,
    /// Creation time, where the backend can report one.
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_serialization() {
        let blob = Blob {
            name: "a.txt".to_string(),
            container: "photos".to_string(),
            size: 5,
            checksum: "5d41402abc4b2a76b9719d911017c592".to_string(),
            etag: "abc123".to_string(),
            meta_data: MetaData::new(),
            content_type: Some("text/plain".to_string()),
            content_disposition: None,
            cache_control: None,
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
        };

        let json = serde_json::to_string(&blob).unwrap();
        let deserialized: Blob = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, blob);
    }

    #[test]
    fn test_container_metadata_defaults_empty() {
        let container: Container =
            serde_json::from_str(r#"{"name": "photos", "created_at": null}"#).unwrap();
        assert!(container.meta_data.is_empty());
    }
}
