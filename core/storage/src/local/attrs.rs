//! Extended-attribute metadata storage for blobs.
//!
//! Metadata keys are flattened to `user.metadata.<key>` and singleton
//! attributes to `user.<name>`, either as native extended attributes or
//! inside a hidden JSON sidecar file on filesystems without xattr
//! support. Attribute storage is best-effort: failures degrade to a
//! logged warning, never to a failed blob operation.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use stratus_common::MetaData;

/// Namespace prefix for every attribute written by this driver.
pub(crate) const ATTR_PREFIX: &str = "user.";

/// Prefix for flattened metadata keys.
pub(crate) const META_PREFIX: &str = "user.metadata.";

/// Suffix of attribute sidecar files.
const SIDECAR_SUFFIX: &str = ".xattr";

/// Attributes persisted alongside a stored blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FileAttributes {
    pub meta_data: MetaData,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
}

/// Storage mechanism for extended attributes, selected once per driver at
/// construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttributeBackend {
    /// Native extended attributes.
    #[cfg(unix)]
    Xattr,
    /// Hidden `.<filename>.xattr` JSON sidecar next to the target file.
    Sidecar,
}

impl AttributeBackend {
    /// Pick the native mechanism for the current platform.
    pub fn for_platform() -> Self {
        #[cfg(unix)]
        {
            AttributeBackend::Xattr
        }
        #[cfg(not(unix))]
        {
            AttributeBackend::Sidecar
        }
    }

    /// Persist `attrs` for `path`, skipping empty values.
    ///
    /// Failures are logged as a capability warning and swallowed; metadata
    /// is best-effort on this backend.
    pub fn set_attributes(&self, path: &Path, attrs: &FileAttributes) {
        if let Err(err) = self.try_set(path, attrs) {
            warn!(
                "File system does not support extended attributes ({}): {}",
                path.display(),
                err
            );
        }
    }

    /// Read every stored attribute for `path`.
    ///
    /// Any I/O failure degrades to "no metadata" plus a warning.
    pub fn get_attributes(&self, path: &Path) -> FileAttributes {
        match self.try_get(path) {
            Ok(entries) => parse_entries(entries),
            Err(err) => {
                warn!(
                    "File system does not support extended attributes ({}): {}",
                    path.display(),
                    err
                );
                FileAttributes::default()
            }
        }
    }

    /// Remove stored attributes after a blob is deleted.
    ///
    /// Native extended attributes vanish with the file; only the sidecar
    /// variant has anything left to clean up.
    pub fn remove_attributes(&self, path: &Path) {
        if let AttributeBackend::Sidecar = self {
            let sidecar = sidecar_path(path);
            if sidecar.exists() {
                if let Err(err) = std::fs::remove_file(&sidecar) {
                    warn!("Failed to remove attribute sidecar {}: {}", sidecar.display(), err);
                }
            }
        }
    }

    fn try_set(&self, path: &Path, attrs: &FileAttributes) -> io::Result<()> {
        let entries = flatten(attrs);

        match self {
            #[cfg(unix)]
            AttributeBackend::Xattr => {
                for (key, value) in entries {
                    xattr::set(path, &key, value.as_bytes())?;
                }
                Ok(())
            }
            AttributeBackend::Sidecar => {
                if entries.is_empty() {
                    return Ok(());
                }

                let sidecar = sidecar_path(path);
                let mut stored = load_sidecar(&sidecar)?;
                stored.extend(entries);

                let file = File::create(&sidecar)?;
                serde_json::to_writer(file, &stored)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
            }
        }
    }

    fn try_get(&self, path: &Path) -> io::Result<Vec<(String, String)>> {
        match self {
            #[cfg(unix)]
            AttributeBackend::Xattr => {
                let mut entries = Vec::new();
                for name in xattr::list(path)? {
                    let Some(key) = name.to_str().map(str::to_string) else {
                        continue;
                    };
                    if !key.starts_with(ATTR_PREFIX) {
                        continue;
                    }
                    if let Some(value) = xattr::get(path, &name)? {
                        match String::from_utf8(value) {
                            Ok(value) => entries.push((key, value)),
                            Err(_) => warn!("Attribute '{}' is not valid UTF-8", key),
                        }
                    }
                }
                Ok(entries)
            }
            AttributeBackend::Sidecar => {
                Ok(load_sidecar(&sidecar_path(path))?.into_iter().collect())
            }
        }
    }
}

/// Sidecar file path for `path` (`.<name>.xattr` in the same directory).
pub(crate) fn sidecar_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}{}", name, SIDECAR_SUFFIX))
}

/// True if `name` is an attribute sidecar file name.
pub(crate) fn is_sidecar_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(SIDECAR_SUFFIX)
}

fn flatten(attrs: &FileAttributes) -> Vec<(String, String)> {
    let mut entries = Vec::new();

    for (key, value) in &attrs.meta_data {
        if value.is_empty() {
            continue;
        }
        entries.push((format!("{}{}", META_PREFIX, key), value.clone()));
    }

    let singletons = [
        ("content_type", &attrs.content_type),
        ("content_disposition", &attrs.content_disposition),
        ("cache_control", &attrs.cache_control),
    ];
    for (key, value) in singletons {
        if let Some(value) = value {
            if !value.is_empty() {
                entries.push((format!("{}{}", ATTR_PREFIX, key), value.clone()));
            }
        }
    }

    entries
}

fn parse_entries(entries: Vec<(String, String)>) -> FileAttributes {
    let mut attrs = FileAttributes::default();

    for (key, value) in entries {
        if let Some(meta_key) = key.strip_prefix(META_PREFIX) {
            // Nested keys keep only their final segment.
            let meta_key = meta_key.rsplit('.').next().unwrap_or(meta_key);
            attrs.meta_data.insert(meta_key.to_string(), value);
        } else if key.ends_with("content_type") {
            attrs.content_type = Some(value);
        } else if key.ends_with("content_disposition") {
            attrs.content_disposition = Some(value);
        } else if key.ends_with("cache_control") {
            attrs.cache_control = Some(value);
        } else {
            warn!("Unknown file attribute '{}'", key);
        }
    }

    attrs
}

fn load_sidecar(sidecar: &Path) -> io::Result<HashMap<String, String>> {
    if !sidecar.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(sidecar)?;
    serde_json::from_reader(file).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_attrs() -> FileAttributes {
        let mut meta_data = MetaData::new();
        meta_data.insert("owner".to_string(), "ops".to_string());
        meta_data.insert("kind".to_string(), "report".to_string());

        FileAttributes {
            meta_data,
            content_type: Some("text/plain".to_string()),
            content_disposition: Some("attachment; filename=a.txt".to_string()),
            cache_control: Some("max-age=60".to_string()),
        }
    }

    #[test]
    fn test_sidecar_round_trip() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("a.txt");
        fs::write(&target, b"hello").unwrap();

        let backend = AttributeBackend::Sidecar;
        backend.set_attributes(&target, &sample_attrs());

        assert_eq!(backend.get_attributes(&target), sample_attrs());
        assert!(temp.path().join(".a.txt.xattr").exists());
    }

    #[test]
    fn test_sidecar_merges_on_rewrite() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("a.txt");
        fs::write(&target, b"hello").unwrap();

        let backend = AttributeBackend::Sidecar;
        backend.set_attributes(&target, &sample_attrs());

        let mut update = FileAttributes::default();
        update
            .meta_data
            .insert("owner".to_string(), "sre".to_string());
        backend.set_attributes(&target, &update);

        let stored = backend.get_attributes(&target);
        assert_eq!(stored.meta_data["owner"], "sre");
        assert_eq!(stored.meta_data["kind"], "report");
        assert_eq!(stored.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("a.txt");
        fs::write(&target, b"hello").unwrap();

        let mut attrs = FileAttributes::default();
        attrs.meta_data.insert("empty".to_string(), String::new());
        attrs.content_type = Some(String::new());

        let backend = AttributeBackend::Sidecar;
        backend.set_attributes(&target, &attrs);

        assert_eq!(backend.get_attributes(&target), FileAttributes::default());
        assert!(!sidecar_path(&target).exists());
    }

    #[test]
    fn test_unknown_attribute_keys_are_ignored() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("a.txt");
        fs::write(&target, b"hello").unwrap();

        let mut stored = HashMap::new();
        stored.insert("user.surprise".to_string(), "value".to_string());
        stored.insert("user.content_type".to_string(), "text/plain".to_string());
        let file = File::create(sidecar_path(&target)).unwrap();
        serde_json::to_writer(file, &stored).unwrap();

        let attrs = AttributeBackend::Sidecar.get_attributes(&target);
        assert_eq!(attrs.content_type.as_deref(), Some("text/plain"));
        assert!(attrs.meta_data.is_empty());
    }

    #[test]
    fn test_missing_attributes_degrade_to_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("a.txt");
        fs::write(&target, b"hello").unwrap();

        let attrs = AttributeBackend::Sidecar.get_attributes(&target);
        assert_eq!(attrs, FileAttributes::default());
    }

    #[test]
    fn test_remove_attributes_deletes_sidecar() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("a.txt");
        fs::write(&target, b"hello").unwrap();

        let backend = AttributeBackend::Sidecar;
        backend.set_attributes(&target, &sample_attrs());
        assert!(sidecar_path(&target).exists());

        backend.remove_attributes(&target);
        assert!(!sidecar_path(&target).exists());
    }

    #[test]
    fn test_sidecar_names() {
        assert!(is_sidecar_name(".a.txt.xattr"));
        assert!(!is_sidecar_name("a.txt"));
        assert!(!is_sidecar_name(".hidden"));
        assert_eq!(
            sidecar_path(Path::new("/store/photos/a.txt")),
            PathBuf::from("/store/photos/.a.txt.xattr")
        );
    }
}
