use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// What a fetch reports about the content it retrieved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Metadata {
    Git(GitMetadata),
    Http(HttpMetadata),
    File(FileMetadata),
    Directory(DirectoryMetadata),
    Oci(OciMetadata),
}

/// A cloned git repository.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMetadata {
    /// Full hash of the commit that was checked out.
    pub latest_commit: String,
}

/// A downloaded HTTP(S) resource.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMetadata {
    pub status_code: u16,
    /// `None` when the server didn't say.
    pub content_length: Option<u64>,
    /// The file the body was written to.
    pub destination: PathBuf,
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
}

/// A single copied file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: u64,
    pub path: PathBuf,
    /// Modification time of the written copy.
    pub timestamp: DateTime<Utc>,
    /// Hex-encoded SHA-256 of the content.
    pub sha: String,
}

/// A copied directory tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMetadata {
    /// Total size of every copied file.
    pub size: u64,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

/// A pulled OCI artifact.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OciMetadata {
    /// Manifest digest, `<algorithm>:<hex>`.
    pub digest: String,
}

impl Metadata {
    /// Key/value view of the metadata, for generic reporting.
    pub fn get(&self) -> HashMap<String, Value> {
        match self {
            Metadata::Git(m) => m.get(),
            Metadata::Http(m) => m.get(),
            Metadata::File(m) => m.get(),
            Metadata::Directory(m) => m.get(),
            Metadata::Oci(m) => m.get(),
        }
    }

    pub fn latest_commit(&self) -> Option<&str> {
        match self {
            Metadata::Git(m) => Some(&m.latest_commit),
            _ => None,
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match self {
            Metadata::Oci(m) => Some(&m.digest),
            _ => None,
        }
    }

    /// Content hashes known for the fetched content, keyed by algorithm.
    pub fn hashes(&self) -> BTreeMap<String, String> {
        let mut hashes = BTreeMap::new();
        match self {
            Metadata::Git(m) if !m.latest_commit.is_empty() => {
                // 40 hex digits for SHA-1 repositories, 64 for SHA-256 ones.
                let algorithm = if m.latest_commit.len() == 64 {
                    "sha256"
                } else {
                    "sha1"
                };
                hashes.insert(algorithm.into(), m.latest_commit.clone());
            }
            Metadata::File(m) if !m.sha.is_empty() => {
                hashes.insert("sha256".into(), m.sha.clone());
            }
            Metadata::Oci(m) => {
                if let Some((algorithm, hex)) = m.digest.split_once(':') {
                    hashes.insert(algorithm.to_lowercase(), hex.into());
                }
            }
            _ => {}
        }
        hashes
    }
}

impl GitMetadata {
    pub fn get(&self) -> HashMap<String, Value> {
        HashMap::from([("latest_commit".into(), json!(self.latest_commit))])
    }
}

impl HttpMetadata {
    pub fn get(&self) -> HashMap<String, Value> {
        HashMap::from([
            ("statusCode".into(), json!(self.status_code)),
            ("contentLength".into(), json!(self.content_length)),
            ("destination".into(), json!(self.destination)),
            ("headers".into(), json!(self.headers)),
        ])
    }
}

impl FileMetadata {
    pub fn get(&self) -> HashMap<String, Value> {
        HashMap::from([
            ("size".into(), json!(self.size)),
            ("path".into(), json!(self.path)),
            ("timestamp".into(), json!(self.timestamp)),
            ("sha".into(), json!(self.sha)),
        ])
    }
}

impl DirectoryMetadata {
    pub fn get(&self) -> HashMap<String, Value> {
        HashMap::from([
            ("size".into(), json!(self.size)),
            ("path".into(), json!(self.path)),
            ("timestamp".into(), json!(self.timestamp)),
        ])
    }
}

impl OciMetadata {
    pub fn get(&self) -> HashMap<String, Value> {
        HashMap::from([("digest".into(), json!(self.digest))])
    }
}

macro_rules! impl_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Metadata {
                fn from(value: $ty) -> Self {
                    Metadata::$variant(value)
                }
            }
        )*
    };
}

impl_from!(
    Git(GitMetadata),
    Http(HttpMetadata),
    File(FileMetadata),
    Directory(DirectoryMetadata),
    Oci(OciMetadata),
);

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_get() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let meta = FileMetadata {
            size: 100,
            path: "/path/to/file".into(),
            timestamp,
            sha: "ef4e93945f5b3d481abe655d6ce3870132994c0bd5840e312d7ac97cde021050".into(),
        };
        let map = meta.get();
        assert_eq!(map.len(), 4);
        assert_eq!(map["size"], json!(100));
        assert_eq!(map["path"], json!("/path/to/file"));
        assert_eq!(map["timestamp"], json!("2024-01-01T12:00:00Z"));
        assert_eq!(map["sha"], json!(meta.sha));
    }

    #[test]
    fn directory_get() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let meta = DirectoryMetadata {
            size: 100,
            path: "/path/to/dir/".into(),
            timestamp,
        };
        let map = meta.get();
        assert_eq!(map.len(), 3);
        assert_eq!(map["path"], json!("/path/to/dir/"));
    }

    #[test]
    fn http_get() {
        let meta = HttpMetadata {
            status_code: 200,
            content_length: Some(12),
            destination: "/tmp/x".into(),
            headers: BTreeMap::from([("content-type".into(), vec!["text/plain".into()])]),
        };
        let map = meta.get();
        assert_eq!(map["statusCode"], json!(200));
        assert_eq!(map["contentLength"], json!(12));
        assert_eq!(map["headers"], json!({"content-type": ["text/plain"]}));
    }

    #[test]
    fn accessors() {
        let git: Metadata = GitMetadata {
            latest_commit: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4".into(),
        }
        .into();
        assert_eq!(
            git.latest_commit(),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4")
        );
        assert_eq!(git.digest(), None);
        assert_eq!(
            git.hashes(),
            BTreeMap::from([(
                "sha1".to_string(),
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4".to_string()
            )])
        );

        let oci: Metadata = OciMetadata {
            digest: "sha256:c04c1f5ea75e869e2da7150c927d0c8649790b2e3c82e6ff317d4cfa068c1649"
                .into(),
        }
        .into();
        assert_eq!(oci.latest_commit(), None);
        assert_eq!(
            oci.hashes()["sha256"],
            "c04c1f5ea75e869e2da7150c927d0c8649790b2e3c82e6ff317d4cfa068c1649"
        );
        assert_eq!(oci.get()["digest"], json!(oci.digest().unwrap()));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let meta: Metadata = OciMetadata {
            digest: "sha256:abc".into(),
        }
        .into();
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value, json!({"kind": "oci", "digest": "sha256:abc"}));
        let back: Metadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);
    }
}
