//! Common types shared across Stratus crates.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

/// Arbitrary key/value metadata attached to containers and blobs.
pub type MetaData = HashMap<String, String>;

/// Accepted content length range for signed uploads, in bytes (min, max).
pub type ContentLength = (u64, u64);

/// Source of bytes for an upload.
///
/// Drivers accept either a filesystem path or an already-open reader,
/// mirroring the two ways callers typically hold file content.
pub enum UploadSource<'a> {
    /// Path to an existing file.
    Path(&'a Path),
    /// Open byte stream.
    Reader(&'a mut dyn Read),
}

impl<'a> UploadSource<'a> {
    /// Best-effort file name for this source.
    ///
    /// Only a path source carries a usable name; readers are anonymous and
    /// callers must supply an explicit blob name for them.
    pub fn file_name(&self) -> Option<String> {
        match self {
            UploadSource::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            UploadSource::Reader(_) => None,
        }
    }
}

impl<'a> From<&'a Path> for UploadSource<'a> {
    fn from(path: &'a Path) -> Self {
        UploadSource::Path(path)
    }
}

/// Destination for a download.
///
/// A path destination may point at a directory, in which case the blob's
/// own file name is appended by the driver.
pub enum DownloadTarget<'a> {
    /// Filesystem path (file or existing directory).
    Path(&'a Path),
    /// Open byte sink.
    Writer(&'a mut dyn Write),
}

impl<'a> From<&'a Path> for DownloadTarget<'a> {
    fn from(path: &'a Path) -> Self {
        DownloadTarget::Path(path)
    }
}
