use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use futures::io::AsyncRead;
use futures::{FutureExt, SinkExt, StreamExt};
use gather_locator::Classifier;
use gather_metadata::{DirectoryMetadata, FileMetadata, Metadata};
use ssri::{Algorithm, IntegrityOpts};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{GatherError, IoContext, Result};
use crate::expand::TarExpander;
use crate::fetch::Gatherer;
use crate::saver::{destination_protocol, saver_for};

/// How many files a directory copy writes at once unless told otherwise.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Copies local files and directories, and expands local `.tar` archives.
#[derive(Debug, Clone)]
pub struct FileGatherer {
    classifier: Classifier,
    concurrency: usize,
}

impl Default for FileGatherer {
    fn default() -> Self {
        Self::new(Classifier::default(), DEFAULT_CONCURRENCY)
    }
}

impl FileGatherer {
    pub fn new(classifier: Classifier, concurrency: usize) -> Self {
        Self {
            classifier,
            concurrency,
        }
    }

    /// Turns a file locator (`file::path`, `file:///path`, `~/path`, or a
    /// plain path) into a local path.
    fn source_path(&self, source: &str) -> Result<PathBuf> {
        let source = source.strip_prefix("file::").unwrap_or(source);
        if source.starts_with("file://") {
            let url = Url::parse(source)
                .map_err(|e| GatherError::ParseSource(source.into(), e))?;
            return url
                .to_file_path()
                .map_err(|_| GatherError::UnsupportedProtocol(source.into()));
        }
        Ok(PathBuf::from(self.classifier.expand_tilde(source)))
    }

    async fn copy_file(
        &self,
        cancel: &CancellationToken,
        source: &Path,
        destination: &Path,
    ) -> Result<Metadata> {
        if cancel.is_cancelled() {
            return Err(GatherError::Cancelled);
        }
        let destination = match (source.file_name(), async_std::fs::metadata(destination).await) {
            (Some(name), Ok(meta)) if meta.is_dir() => destination.join(name),
            _ => destination.to_owned(),
        };

        let file = async_std::fs::File::open(source)
            .await
            .io_context(|| format!("failed to open source file {}", source.display()))?;
        let saver = saver_for(destination_protocol(&destination))?;
        let mut reader = HashingReader::new(file);
        let size = saver.save(cancel, &mut reader, &destination).await?;
        let sha = reader.sha256();

        let info = async_std::fs::metadata(&destination)
            .await
            .io_context(|| format!("failed to get file info for {}", destination.display()))?;
        let timestamp = info
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        tracing::debug!(
            "Copied {} to {} ({size} bytes)",
            source.display(),
            destination.display()
        );
        Ok(FileMetadata {
            size,
            path: destination,
            timestamp,
            sha,
        }
        .into())
    }

    async fn expand_tar(&self, source: &Path, destination: &Path) -> Result<Metadata> {
        let archive = source.to_owned();
        let dest = destination.to_owned();
        let size = async_std::task::spawn_blocking(move || TarExpander::new().expand(&archive, &dest))
            .await?;
        Ok(DirectoryMetadata {
            size,
            path: destination.to_owned(),
            timestamp: Utc::now(),
        }
        .into())
    }
}

#[async_trait]
impl Gatherer for FileGatherer {
    async fn gather(
        &self,
        cancel: &CancellationToken,
        source: &str,
        destination: &Path,
    ) -> Result<Metadata> {
        let path = self.source_path(source)?;
        let kind = async_std::fs::metadata(&path)
            .await
            .io_context(|| format!("failed to determine source kind of {}", path.display()))?;

        if path.extension().map(|ext| ext == "tar").unwrap_or(false) && kind.is_file() {
            self.expand_tar(&path, destination).await
        } else if kind.is_dir() {
            copy_directory(cancel, &path, destination, self.concurrency).await
        } else {
            self.copy_file(cancel, &path, destination).await
        }
    }
}

/// One file for a copy worker to write.
#[derive(Debug)]
struct CopyTask {
    source: PathBuf,
    destination: PathBuf,
}

/// Mirrors the tree under `source_root` into `dest_root`.
///
/// A single walk creates each destination directory before anything below
/// it is queued, and hands files to at most `concurrency` concurrent
/// copies. Every failure is collected, and once the walk and all copies
/// have finished the first one is returned as
/// [`GatherError::CopyDirectory`]. Nothing is rolled back, so the
/// destination may be left partially written.
///
/// Cancellation is checked before each walk entry and before each copy
/// starts. Copies that are already streaming run to completion.
pub async fn copy_directory(
    cancel: &CancellationToken,
    source_root: &Path,
    dest_root: &Path,
    concurrency: usize,
) -> Result<Metadata> {
    let concurrency = concurrency.max(1);
    let start = std::time::Instant::now();
    let (task_tx, task_rx) = mpsc::channel::<CopyTask>(concurrency);
    let (err_tx, err_rx) = mpsc::unbounded::<GatherError>();
    let copied = AtomicU64::new(0);
    let files = AtomicU64::new(0);

    let walk = {
        let err_tx = err_tx.clone();
        async move {
            if let Err(e) = queue_tree(cancel, source_root, dest_root, task_tx).await {
                let _ = err_tx.unbounded_send(e);
            }
        }
    };
    let copy = task_rx.for_each_concurrent(concurrency, |task: CopyTask| {
        let err_tx = err_tx.clone();
        let copied = &copied;
        let files = &files;
        async move {
            match copy_one(cancel, &task).await {
                Ok(bytes) => {
                    copied.fetch_add(bytes, Ordering::SeqCst);
                    files.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    let _ = err_tx.unbounded_send(e);
                }
            }
        }
    })
    .boxed();
    futures::join!(walk, copy);
    drop(err_tx);

    let errors: Vec<GatherError> = err_rx.collect().await;
    if let Some(err) = errors.into_iter().next() {
        return Err(GatherError::CopyDirectory(Box::new(err)));
    }

    let size = copied.into_inner();
    tracing::debug!(
        "Copied {} file{} ({size} bytes) from {} to {} in {}ms",
        files.load(Ordering::SeqCst),
        if files.load(Ordering::SeqCst) == 1 { "" } else { "s" },
        source_root.display(),
        dest_root.display(),
        start.elapsed().as_millis()
    );
    Ok(DirectoryMetadata {
        size,
        path: dest_root.to_owned(),
        timestamp: Utc::now(),
    }
    .into())
}

async fn queue_tree(
    cancel: &CancellationToken,
    source_root: &Path,
    dest_root: &Path,
    mut tasks: mpsc::Sender<CopyTask>,
) -> Result<()> {
    let root = async_std::fs::metadata(source_root)
        .await
        .io_context(|| format!("failed to read {}", source_root.display()))?;
    if !root.is_dir() {
        return tasks
            .send(CopyTask {
                source: source_root.to_owned(),
                destination: dest_root.to_owned(),
            })
            .await
            .map_err(|_| GatherError::Cancelled);
    }

    // Directories are created before anything below them is queued.
    let mut pending = vec![(source_root.to_owned(), dest_root.to_owned())];
    while let Some((dir, destination)) = pending.pop() {
        if cancel.is_cancelled() {
            return Err(GatherError::Cancelled);
        }
        async_std::fs::create_dir_all(&destination)
            .await
            .io_context(|| format!("failed to create directory {}", destination.display()))?;
        let mut entries = async_std::fs::read_dir(&dir)
            .await
            .io_context(|| format!("failed to read directory {}", dir.display()))?;
        while let Some(entry) = entries.next().await {
            if cancel.is_cancelled() {
                return Err(GatherError::Cancelled);
            }
            let entry = entry
                .io_context(|| format!("failed to read directory entry in {}", dir.display()))?;
            let source: PathBuf = entry.path().into();
            let ty = entry
                .file_type()
                .await
                .io_context(|| format!("failed to get file type of {}", source.display()))?;
            let target = destination.join(entry.file_name());
            if ty.is_dir() {
                pending.push((source, target));
            } else {
                tasks
                    .send(CopyTask {
                        source,
                        destination: target,
                    })
                    .await
                    .map_err(|_| GatherError::Cancelled)?;
            }
        }
    }
    Ok(())
}

async fn copy_one(cancel: &CancellationToken, task: &CopyTask) -> Result<u64> {
    if cancel.is_cancelled() {
        return Err(GatherError::Cancelled);
    }
    let mut file = async_std::fs::File::open(&task.source)
        .await
        .io_context(|| format!("failed to open {}", task.source.display()))?;
    let saver = saver_for(destination_protocol(&task.destination))?;
    let written = saver.save(cancel, &mut file, &task.destination).await?;
    tracing::trace!(
        "Copied {} to {}",
        task.source.display(),
        task.destination.display()
    );
    Ok(written)
}

/// Computes the SHA-256 of everything read through it.
struct HashingReader<R> {
    reader: R,
    opts: IntegrityOpts,
}

impl<R: AsyncRead + Unpin> HashingReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            opts: IntegrityOpts::new().algorithm(Algorithm::Sha256),
        }
    }

    fn sha256(self) -> String {
        self.opts.result().to_hex().1
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        let amt = futures::ready!(Pin::new(&mut self.reader).poll_read(cx, buf))?;
        self.opts.input(&buf[..amt]);
        Poll::Ready(Ok(amt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[async_std::test]
    async fn hashing_reader() {
        let mut reader = HashingReader::new(futures::io::Cursor::new(b"hello".to_vec()));
        let mut out = Vec::new();
        futures::io::copy(&mut reader, &mut out).await.unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(
            reader.sha256(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn source_paths() {
        let gatherer = FileGatherer::new(
            Classifier::new(|| Some(PathBuf::from("/home/user"))),
            DEFAULT_CONCURRENCY,
        );
        assert_eq!(
            gatherer.source_path("file::/srv/policy").unwrap(),
            PathBuf::from("/srv/policy")
        );
        assert_eq!(
            gatherer.source_path("file:///srv/policy").unwrap(),
            PathBuf::from("/srv/policy")
        );
        assert_eq!(
            gatherer.source_path("~/policy").unwrap(),
            PathBuf::from("/home/user/policy")
        );
        assert_eq!(
            gatherer.source_path("./policy").unwrap(),
            PathBuf::from("./policy")
        );
    }
}
