use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_std::fs::File;
use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{GatherError, IoContext, Result};

/// Writes a byte stream to a destination.
#[async_trait]
pub trait Saver: fmt::Debug + Send + Sync {
    /// Streams everything in `reader` to `destination`, creating parent
    /// directories as needed. Returns the number of bytes written.
    async fn save(
        &self,
        cancel: &CancellationToken,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        destination: &Path,
    ) -> Result<u64>;
}

/// Saves to the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSaver;

#[async_trait]
impl Saver for FileSaver {
    async fn save(
        &self,
        cancel: &CancellationToken,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        destination: &Path,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(GatherError::Cancelled);
        }
        let destination = local_path(destination);
        if let Some(parent) = destination.parent() {
            async_std::fs::create_dir_all(parent)
                .await
                .io_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let mut file = File::create(&destination)
            .await
            .io_context(|| format!("Failed to create file {}", destination.display()))?;
        let written = futures::io::copy(reader, &mut file)
            .await
            .io_context(|| format!("Failed to write {}", destination.display()))?;
        file.flush()
            .await
            .io_context(|| format!("Failed to flush {}", destination.display()))?;
        Ok(written)
    }
}

/// Picks the saver for a destination protocol.
///
/// Both the scheme name (`file`) and the classifier's display name
/// (`FileURI`) are accepted.
pub fn saver_for(protocol: &str) -> Result<Arc<dyn Saver>> {
    match protocol {
        "file" | "FileURI" => Ok(Arc::new(FileSaver)),
        other => Err(GatherError::UnsupportedSaver(other.into())),
    }
}

/// The protocol a destination should be saved through. Plain paths are
/// local files.
pub fn destination_protocol(destination: &Path) -> &str {
    destination
        .to_str()
        .and_then(|d| d.split_once("://"))
        .map(|(scheme, _)| scheme)
        .unwrap_or("file")
}

fn local_path(destination: &Path) -> PathBuf {
    match destination.to_str().and_then(|d| d.strip_prefix("file://")) {
        Some(path) => PathBuf::from(path),
        None => destination.to_owned(),
    }
}
