use std::path::{Component, Path, PathBuf};

use url::form_urlencoded;

use crate::error::{MetadataError, Result};
use crate::metadata::{
    DirectoryMetadata, FileMetadata, GitMetadata, HttpMetadata, Metadata, OciMetadata,
};

impl Metadata {
    /// Rewrites `original` so that it refers to exactly the content this
    /// metadata describes.
    pub fn pinned_url(&self, original: &str) -> Result<String> {
        match self {
            Metadata::Git(m) => m.pinned_url(original),
            Metadata::Http(m) => m.pinned_url(original),
            Metadata::File(m) => m.pinned_url(original),
            Metadata::Directory(m) => m.pinned_url(original),
            Metadata::Oci(m) => m.pinned_url(original),
        }
    }
}

impl GitMetadata {
    /// `git::<host>/<path>[//<subdir>]?ref=<commit>[&depth=<depth>]`
    ///
    /// Any ref in `original` is replaced with the fetched commit. A
    /// subdirectory written inside the old ref value is kept, unless the path
    /// already names one.
    pub fn pinned_url(&self, original: &str) -> Result<String> {
        if original.is_empty() {
            return Err(MetadataError::EmptyUrl);
        }
        if self.latest_commit.is_empty() {
            return Err(MetadataError::LatestCommitNotSet);
        }

        let source = original.strip_prefix("git::").unwrap_or(original);
        let source = source.strip_prefix("git+").unwrap_or(source);
        let (body, query) = match source.split_once('?') {
            Some((body, query)) => (body, Some(query)),
            None => (source, None),
        };

        let mut location = if body.starts_with("file://") {
            body.to_owned()
        } else {
            host_and_path(body)
        };

        let mut depth = String::new();
        for (key, value) in query
            .map(|q| form_urlencoded::parse(q.as_bytes()).collect::<Vec<_>>())
            .unwrap_or_default()
        {
            if key != "ref" && key != "depth" {
                continue;
            }
            let (value, subdir) = match value.split_once("//") {
                Some((value, subdir)) => (value.to_owned(), Some(subdir.to_owned())),
                None => (value.to_string(), None),
            };
            if let Some(subdir) = subdir {
                if !location.trim_start_matches("file://").contains("//") {
                    location.push_str("//");
                    location.push_str(&subdir);
                }
            }
            if key == "depth" {
                depth = value;
            }
        }

        let mut pinned = format!("git::{location}?ref={}", self.latest_commit);
        if !depth.is_empty() {
            pinned.push_str("&depth=");
            pinned.push_str(&depth);
        }
        Ok(pinned)
    }
}

/// Drops the scheme and user from a git location and turns scp-style
/// `host:path` into `host/path`.
fn host_and_path(body: &str) -> String {
    if let Some((_, rest)) = body.split_once("://") {
        return strip_user(rest).to_owned();
    }
    let location = strip_user(body);
    let first_segment = location.split('/').next().unwrap_or_default();
    match first_segment.split_once(':') {
        Some((host, _)) => {
            let path = &location[host.len() + 1..];
            format!("{host}/{}", path.trim_start_matches('/'))
        }
        None => location.to_owned(),
    }
}

fn strip_user(location: &str) -> &str {
    let first_segment = location.split('/').next().unwrap_or_default();
    match first_segment.split_once('@') {
        Some((user, _)) => &location[user.len() + 1..],
        None => location,
    }
}

impl OciMetadata {
    /// `oci::<registry>/<repository>[:<tag>]@<digest>`, replacing any digest
    /// already present.
    pub fn pinned_url(&self, original: &str) -> Result<String> {
        if original.is_empty() {
            return Err(MetadataError::EmptyUrl);
        }
        if self.digest.is_empty() {
            return Err(MetadataError::DigestNotSet);
        }
        let reference = original.strip_prefix("oci::").unwrap_or(original);
        let reference = reference.strip_prefix("oci://").unwrap_or(reference);
        let reference = match reference.split_once('@') {
            Some((reference, _)) => reference,
            None => reference,
        };
        Ok(format!("oci::{reference}@{}", self.digest))
    }
}

impl FileMetadata {
    /// `file::<absolute path>`
    pub fn pinned_url(&self, original: &str) -> Result<String> {
        if original.is_empty() {
            return Err(MetadataError::EmptyUrl);
        }
        pin_file(original)
    }
}

impl DirectoryMetadata {
    /// `file::<absolute path>`. An empty locator is an empty path here.
    pub fn pinned_url(&self, original: &str) -> Result<String> {
        pin_file(original)
    }
}

impl HttpMetadata {
    /// An HTTP download has no content reference to embed, so this only
    /// normalizes the protocol prefix.
    pub fn pinned_url(&self, original: &str) -> Result<String> {
        let url = original.strip_prefix("http::").unwrap_or(original);
        if url.is_empty() {
            return Err(MetadataError::EmptyUrl);
        }
        Ok(format!("http::{url}"))
    }
}

fn pin_file(original: &str) -> Result<String> {
    let path = original.strip_prefix("file::").unwrap_or(original);
    let path = path.strip_prefix("file://").unwrap_or(path);
    if path.is_empty() {
        return Err(MetadataError::EmptyFilePath);
    }
    let path = Path::new(path);
    let absolute = if path.is_absolute() {
        path.to_owned()
    } else {
        std::env::current_dir()
            .map_err(MetadataError::CurrentDir)?
            .join(path)
    };
    Ok(format!("file::{}", normalize(&absolute).display()))
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(out.components().next_back(), Some(Component::RootDir) | None) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
