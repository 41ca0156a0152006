use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use gather_locator::Classifier;
use gather_metadata::{HttpMetadata, Metadata};
use reqwest::{Client, ClientBuilder, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{GatherError, Result};
use crate::fetch::{cancellable, Gatherer};
use crate::saver::{destination_protocol, saver_for};

/// Downloads a single file over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpGatherer {
    client: Client,
    classifier: Classifier,
}

impl HttpGatherer {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(classifier: Classifier, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: ClientBuilder::new()
                .user_agent("gather")
                .timeout(timeout)
                .build()?,
            classifier,
        })
    }

    /// Works out which file the download should be written to.
    ///
    /// A destination ending in a path separator, naming an existing
    /// directory, or without an extension is treated as a directory, and the
    /// source's file name is appended to it.
    fn resolve_destination(&self, destination: &Path, file_name: &str) -> PathBuf {
        let raw = destination.to_string_lossy();
        let expanded = PathBuf::from(self.classifier.expand_tilde(&raw));
        if raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR) || expanded.is_dir() {
            return expanded.join(file_name);
        }
        if expanded.extension().is_none() {
            return expanded.join(file_name);
        }
        expanded
    }
}

#[async_trait]
impl Gatherer for HttpGatherer {
    async fn gather(
        &self,
        cancel: &CancellationToken,
        source: &str,
        destination: &Path,
    ) -> Result<Metadata> {
        let source = source.strip_prefix("http::").unwrap_or(source);
        let url = Url::parse(source).map_err(|e| match e {
            url::ParseError::RelativeUrlWithoutBase => GatherError::NoScheme,
            e => GatherError::ParseSource(source.into(), e),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(GatherError::UnsupportedProtocol(url.scheme().into()));
        }

        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or(GatherError::NoFileName)?
            .to_owned();

        let destination = self.resolve_destination(destination, &file_name);
        validate_file_destination(&destination, &self.classifier)?;

        tracing::debug!("Downloading {url} to {}", destination.display());
        let response = cancellable(cancel, async {
            self.client
                .get(url.clone())
                .send()
                .await
                .map_err(GatherError::from)
        })
        .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(GatherError::ResponseCode(status.as_u16()));
        }

        let content_length = response.content_length();
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in response.headers() {
            headers
                .entry(name.as_str().to_owned())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let saver = saver_for(destination_protocol(&destination))?;
        let mut body = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        )
        .into_async_read();
        let written = cancellable(cancel, saver.save(cancel, &mut body, &destination)).await?;

        tracing::debug!("Downloaded {written} bytes to {}", destination.display());
        Ok(HttpMetadata {
            status_code: status.as_u16(),
            content_length,
            destination,
            headers,
        }
        .into())
    }
}

/// Refuses destinations that already exist, so a download never clobbers a
/// file.
pub fn validate_file_destination(destination: &Path, classifier: &Classifier) -> Result<()> {
    let expanded = PathBuf::from(classifier.expand_tilde(&destination.to_string_lossy()));
    if expanded.exists() {
        return Err(GatherError::DestinationExists(expanded));
    }
    Ok(())
}
