use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gather_locator::{Classifier, UriKind};
use gather_metadata::Metadata;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{GatherError, Result};
use crate::fetch::{
    AgentAuthenticator, FileGatherer, Gatherer, GitGatherer, HttpGatherer, OciGatherer,
    OciPuller, RegistryPuller, RegistryTls, SshAuthenticator, DEFAULT_CONCURRENCY,
};

/// Build a new [`Gather`] instance with specified options.
#[derive(Clone, Debug, Default)]
pub struct GatherOpts {
    concurrency: Option<usize>,
    http_timeout: Option<Duration>,
    tls: Option<bool>,
    classifier: Option<Classifier>,
    ssh_authenticator: Option<Arc<dyn SshAuthenticator>>,
    oci_puller: Option<Arc<dyn OciPuller>>,
}

impl GatherOpts {
    pub fn new() -> Self {
        Default::default()
    }

    /// Maximum number of files a directory copy writes at once.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Request timeout for HTTP downloads and registry calls.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Force (`true`) or disable (`false`) TLS for OCI registries. Left
    /// unset, loopback registries are spoken to over plain HTTP.
    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn ssh_authenticator(mut self, auth: Arc<dyn SshAuthenticator>) -> Self {
        self.ssh_authenticator = Some(auth);
        self
    }

    pub fn oci_puller(mut self, puller: Arc<dyn OciPuller>) -> Self {
        self.oci_puller = Some(puller);
        self
    }

    pub fn build(self) -> Result<Gather> {
        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1);
        let timeout = self.http_timeout.unwrap_or(HttpGatherer::DEFAULT_TIMEOUT);
        let classifier = self.classifier.unwrap_or_default();
        let oci_puller = match self.oci_puller {
            Some(puller) => puller,
            None => {
                let tls = match self.tls {
                    None => RegistryTls::Auto,
                    Some(true) => RegistryTls::Always,
                    Some(false) => RegistryTls::Never,
                };
                Arc::new(RegistryPuller::new(tls, timeout)?)
            }
        };

        let file: Arc<dyn Gatherer> =
            Arc::new(FileGatherer::new(classifier.clone(), concurrency));
        let http: Arc<dyn Gatherer> = Arc::new(HttpGatherer::new(classifier.clone(), timeout)?);
        let git: Arc<dyn Gatherer> = Arc::new(GitGatherer::new(
            classifier.clone(),
            self.ssh_authenticator
                .unwrap_or_else(|| Arc::new(AgentAuthenticator)),
            concurrency,
        ));
        let oci: Arc<dyn Gatherer> = Arc::new(OciGatherer::new(oci_puller));

        let mut gatherers = HashMap::new();
        gatherers.insert("file".to_owned(), file);
        gatherers.insert("http".to_owned(), http.clone());
        gatherers.insert("https".to_owned(), http);
        gatherers.insert("git".to_owned(), git.clone());
        gatherers.insert("ssh".to_owned(), git);
        gatherers.insert("oci".to_owned(), oci);

        Ok(Gather {
            classifier,
            gatherers: Arc::new(gatherers),
        })
    }
}

/// Toplevel dispatcher: picks a [`Gatherer`] by the source's scheme.
#[derive(Clone, Debug)]
pub struct Gather {
    classifier: Classifier,
    gatherers: Arc<HashMap<String, Arc<dyn Gatherer>>>,
}

impl Gather {
    /// Creates a new `Gather` with default settings. To configure it, use
    /// [`GatherOpts`].
    pub fn new() -> Result<Self> {
        GatherOpts::new().build()
    }

    /// The gatherer registered for `scheme`, if any.
    pub fn gatherer(&self, scheme: &str) -> Option<&Arc<dyn Gatherer>> {
        self.gatherers.get(scheme)
    }

    /// Fetches `source` into `destination`, choosing a gatherer by the
    /// source's URL scheme.
    ///
    /// A leading `<scheme>::` prefix (`git::`, `http::`, `file::`, `oci::`)
    /// picks the gatherer directly. Anything else must parse as a URL. The
    /// source is handed to the gatherer unchanged.
    pub async fn gather(
        &self,
        cancel: &CancellationToken,
        source: &str,
        destination: impl AsRef<Path>,
    ) -> Result<Metadata> {
        let scheme = match forced_scheme(source) {
            Some(scheme) => scheme.to_ascii_lowercase(),
            None => Url::parse(source)
                .map_err(|e| GatherError::ParseSource(source.into(), e))?
                .scheme()
                .to_owned(),
        };
        let scheme = scheme.as_str();
        let gatherer = self
            .gatherers
            .get(scheme)
            .ok_or_else(|| GatherError::UnsupportedProtocol(scheme.into()))?;
        self.run(gatherer, cancel, source, destination.as_ref())
            .await
    }

    /// Like [`Gather::gather`], but classifies `locator` first, so shorthand
    /// forms like `github.com/org/repo` or `./policy` work too.
    pub async fn gather_locator(
        &self,
        cancel: &CancellationToken,
        locator: &str,
        destination: impl AsRef<Path>,
    ) -> Result<Metadata> {
        let kind = self.classifier.classify(locator)?;
        let scheme = match kind {
            UriKind::Unknown => return Err(GatherError::UnknownLocator(locator.into())),
            kind => kind.scheme().unwrap_or_default(),
        };
        let gatherer = self
            .gatherers
            .get(scheme)
            .ok_or_else(|| GatherError::UnsupportedProtocol(scheme.into()))?;
        tracing::debug!("Classified `{locator}` as {kind}");
        self.run(gatherer, cancel, locator, destination.as_ref())
            .await
    }

    async fn run(
        &self,
        gatherer: &Arc<dyn Gatherer>,
        cancel: &CancellationToken,
        source: &str,
        destination: &Path,
    ) -> Result<Metadata> {
        let start = std::time::Instant::now();
        tracing::debug!("Gathering {source} into {}", destination.display());
        let metadata = gatherer.gather(cancel, source, destination).await?;
        tracing::info!(
            "Gathered {source} into {} in {}ms",
            destination.display(),
            start.elapsed().as_millis()
        );
        Ok(metadata)
    }
}

/// The `<scheme>` of a `<scheme>::<rest>` source.
fn forced_scheme(source: &str) -> Option<&str> {
    let (scheme, _) = source.split_once("::")?;
    let mut chars = scheme.chars();
    let valid = chars.next().map_or(false, |c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}
