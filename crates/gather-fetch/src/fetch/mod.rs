use std::path::Path;

use async_trait::async_trait;
use futures::future::{self, Either};
use futures::Future;
use gather_metadata::Metadata;
use tokio_util::sync::CancellationToken;

use crate::error::{GatherError, Result};

pub use file::{copy_directory, FileGatherer, DEFAULT_CONCURRENCY};
pub use git::{AgentAuthenticator, GitGatherer, SshAgentAuth, SshAuthenticator};
pub use http::{validate_file_destination, HttpGatherer};
pub use oci::{OciGatherer, OciPuller, OciReference, RegistryPuller, RegistryTls};

mod file;
mod git;
mod http;
mod oci;

/// Fetches one kind of source to a local destination.
#[async_trait]
pub trait Gatherer: std::fmt::Debug + Send + Sync {
    /// Retrieves `source` into `destination` and reports what was fetched.
    ///
    /// `source` is handed over exactly as the caller wrote it, including
    /// any `xxx::` protocol prefix.
    async fn gather(
        &self,
        cancel: &CancellationToken,
        source: &str,
        destination: &Path,
    ) -> Result<Metadata>;
}

/// Runs `fut` until it finishes or `cancel` fires, whichever is first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    if cancel.is_cancelled() {
        return Err(GatherError::Cancelled);
    }
    futures::pin_mut!(fut);
    let cancelled = cancel.cancelled();
    futures::pin_mut!(cancelled);
    match future::select(fut, cancelled).await {
        Either::Left((res, _)) => res,
        Either::Right(_) => Err(GatherError::Cancelled),
    }
}
