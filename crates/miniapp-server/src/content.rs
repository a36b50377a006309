//! Bundle content resolution.
//!
//! Maps a request path `/{version_id}/{relative}` onto
//! `{bundle_root}/{relative}` and refuses anything that would land outside
//! the bundle root.

use std::path::{Path, PathBuf};

use miniapp_common::VersionId;
use tracing::warn;

/// A file inside the bundle that a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleAsset {
    /// Canonical path on disk.
    pub path: PathBuf,
    pub mime: &'static str,
}

/// Resolves request paths against one version's bundle directory.
#[derive(Debug, Clone)]
pub struct BundleProvider {
    bundle_root: PathBuf,
    version_id: VersionId,
}

impl BundleProvider {
    pub fn new(bundle_root: impl Into<PathBuf>, version_id: VersionId) -> Self {
        Self {
            bundle_root: bundle_root.into(),
            version_id,
        }
    }

    pub fn bundle_root(&self) -> &Path {
        &self.bundle_root
    }

    pub fn version_id(&self) -> &VersionId {
        &self.version_id
    }

    /// Resolve a raw (still percent-encoded) URI path to a bundle file.
    ///
    /// `None` covers every not-found case: wrong version prefix, missing
    /// bundle root, missing file, directories, and traversal attempts.
    pub async fn resolve(&self, uri_path: &str) -> Option<BundleAsset> {
        let decoded = urlencoding::decode(uri_path).ok()?;
        let relative = self.strip_version(&decoded)?;
        if relative.is_empty() || relative.contains('\0') {
            return None;
        }

        let file_path = self.bundle_root.join(relative);

        // Canonicalize both sides so `..`, symlinks and absolute joins are
        // judged by where they actually land.
        let canonical_root = tokio::fs::canonicalize(&self.bundle_root).await.ok()?;
        let canonical_file = tokio::fs::canonicalize(&file_path).await.ok()?;
        if !canonical_file.starts_with(&canonical_root) {
            warn!(path = %uri_path, "request escapes bundle root, refusing");
            return None;
        }

        let metadata = tokio::fs::metadata(&canonical_file).await.ok()?;
        if !metadata.is_file() {
            return None;
        }

        let mime = mime_from_extension(&canonical_file);
        Some(BundleAsset {
            path: canonical_file,
            mime,
        })
    }

    fn strip_version<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.trim_start_matches('/');
        let (version, relative) = rest.split_once('/')?;
        (version == self.version_id.as_str()).then_some(relative)
    }
}

/// Guess MIME type from file extension.
pub(crate) fn mime_from_extension(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
