//! Helper routines shared by storage drivers.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::digest::DynDigest;
use md5::Md5;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use stratus_common::{Error, Result, UploadSource};

/// Block size for streamed reads.
pub const BLOCK_SIZE: usize = 4096;

/// Hash algorithm used for blob checksums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// 128-bit MD5 digest (the default, matching common provider etags).
    #[default]
    Md5,
    /// 256-bit SHA-2 digest.
    Sha256,
}

impl ChecksumAlgorithm {
    fn digest(&self) -> Box<dyn DynDigest> {
        match self {
            ChecksumAlgorithm::Md5 => Box::new(Md5::default()),
            ChecksumAlgorithm::Sha256 => Box::new(Sha256::default()),
        }
    }
}

/// Hex-encoded checksum of a stream, read in fixed-size blocks.
///
/// The content is never held in memory whole; cost is O(stream length).
pub fn checksum_reader<R: Read + ?Sized>(
    reader: &mut R,
    algorithm: ChecksumAlgorithm,
) -> Result<String> {
    let mut hasher = algorithm.digest();
    let mut block = [0u8; BLOCK_SIZE];

    loop {
        let read = reader.read(&mut block)?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encoded checksum of a file on disk.
pub fn file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let mut file = File::open(path)?;
    checksum_reader(&mut file, algorithm)
}

/// Deterministic etag for a storage path.
///
/// Hashes the path string, not the content: re-uploading a blob keeps its
/// etag, and two blobs with identical content have distinct etags.
pub fn path_etag(path: &Path) -> String {
    hex::encode(Sha256::digest(path.to_string_lossy().as_bytes()))
}

/// Guess the content type for a file path or bare file name.
///
/// Existing files are sniffed by content first; extension mapping is the
/// fallback for unrecognized content and for names without a backing file.
pub fn guess_content_type(path: &Path) -> Option<String> {
    if path.is_file() {
        if let Ok(Some(kind)) = infer::get_from_path(path) {
            return Some(kind.mime_type().to_string());
        }
    }

    mime_guess::from_path(path)
        .first_raw()
        .map(|mime| mime.to_string())
}

/// Resolve the blob name implied by an upload source.
///
/// # Errors
/// - `Error::NotFound` if the source is a path that does not exist.
pub fn validate_file_or_path(source: &UploadSource<'_>) -> Result<Option<String>> {
    if let UploadSource::Path(path) = source {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }
    }

    Ok(source.file_name())
}

/// Normalize caller-supplied extra parameters against a driver's
/// normalizer table.
///
/// Keys are snake-cased before lookup, so `Metadata`, `metadata` and
/// `metaData` all hit the same table entry. Keys absent from the table
/// and empty values are dropped.
pub fn normalize_parameters(
    params: &Map<String, Value>,
    normalizers: &[(&str, &str)],
) -> Map<String, Value> {
    let mut normalized = Map::new();

    for (key, value) in params {
        if is_empty_value(value) {
            continue;
        }

        let key_inflected = snake_case(key);
        if let Some((_, target)) = normalizers
            .iter()
            .find(|(name, _)| *name == key_inflected)
        {
            normalized.insert((*target).to_string(), value.clone());
        }
    }

    normalized
}

/// Convert `camelCase`/`PascalCase`/`kebab-case` to `snake_case`.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;

    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c == '-' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }

    out
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_checksum_reader_md5() {
        let mut bytes: &[u8] = b"hello";
        let checksum = checksum_reader(&mut bytes, ChecksumAlgorithm::Md5).unwrap();
        assert_eq!(checksum, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_checksum_reader_sha256() {
        let mut bytes: &[u8] = b"hello";
        let checksum = checksum_reader(&mut bytes, ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(
            checksum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_file_checksum_streams_large_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content = vec![7u8; BLOCK_SIZE * 3 + 17];
        file.write_all(&content).unwrap();
        file.flush().unwrap();

        let from_file = file_checksum(file.path(), ChecksumAlgorithm::Md5).unwrap();
        let from_slice = checksum_reader(&mut content.as_slice(), ChecksumAlgorithm::Md5).unwrap();
        assert_eq!(from_file, from_slice);
    }

    #[test]
    fn test_path_etag_deterministic() {
        let a = path_etag(Path::new("/store/photos/a.txt"));
        let b = path_etag(Path::new("/store/photos/a.txt"));
        let c = path_etag(Path::new("/store/photos/b.txt"));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_guess_content_type_by_extension() {
        assert_eq!(
            guess_content_type(Path::new("report.txt")).as_deref(),
            Some("text/plain")
        );
        assert_eq!(
            guess_content_type(Path::new("photo.jpg")).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(guess_content_type(Path::new("mystery")), None);
    }

    #[test]
    fn test_guess_content_type_sniffs_content() {
        let mut file = tempfile::Builder::new().suffix(".dat").tempfile().unwrap();
        file.write_all(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0])
            .unwrap();
        file.flush().unwrap();

        assert_eq!(
            guess_content_type(file.path()).as_deref(),
            Some("image/png")
        );
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("Metadata"), "metadata");
        assert_eq!(snake_case("metaData"), "meta_data");
        assert_eq!(snake_case("cache-control"), "cache_control");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_normalize_parameters() {
        let normalizers = &[("metadata", "meta_data")];
        let mut params = Map::new();
        params.insert("Metadata".to_string(), json!({"owner": "ops"}));
        params.insert("unrelated".to_string(), json!("dropped"));
        params.insert("metaData".to_string(), json!(null));

        let normalized = normalize_parameters(&params, normalizers);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized["meta_data"], json!({"owner": "ops"}));
    }

    #[test]
    fn test_normalize_parameters_skips_empty_values() {
        let normalizers = &[("metadata", "meta_data")];
        let mut params = Map::new();
        params.insert("metadata".to_string(), json!({}));

        assert!(normalize_parameters(&params, normalizers).is_empty());
    }
}
