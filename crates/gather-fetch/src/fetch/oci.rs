use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::{Component, Path};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gather_metadata::{Metadata, OciMetadata};
use reqwest::header::{ACCEPT, WWW_AUTHENTICATE};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::Deserialize;
use ssri::{Algorithm, IntegrityOpts};
use tokio_util::sync::CancellationToken;

use crate::error::{GatherError, IoContext, Result};
use crate::expand::TarExpander;
use crate::fetch::{cancellable, Gatherer};

const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";
const UNPACK_ANNOTATION: &str = "io.deis.oras.content.unpack";
const MANIFEST_TYPES: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

/// A parsed `registry/repository[:tag|@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OciReference {
    /// Registry host, with port if one was given.
    pub registry: String,
    pub repository: String,
    /// Tag or digest. Never empty; defaults to `latest`.
    pub reference: String,
}

impl OciReference {
    /// Parses a source locator as written by a user: strips any `oci::` or
    /// `oci://` prefix and points `localhost` at `127.0.0.1`.
    pub fn from_source(source: &str) -> Result<Self> {
        let source = source.replace("localhost", "127.0.0.1");
        let source = match source.split_once("::") {
            Some((_, rest)) => rest,
            None => &source,
        };
        let source = match source.split_once("://") {
            Some((_, rest)) => rest,
            None => source,
        };
        source.parse()
    }

    /// Whether `reference` names a digest rather than a tag.
    pub fn is_digest(&self) -> bool {
        self.reference.contains(':')
    }

    /// The registry host without its port.
    pub fn hostname(&self) -> &str {
        let registry = self.registry.as_str();
        if let Some(rest) = registry.strip_prefix('[') {
            return rest.split(']').next().unwrap_or(rest);
        }
        registry.split(':').next().unwrap_or(registry)
    }
}

impl FromStr for OciReference {
    type Err = GatherError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GatherError::OciReference(s.into());
        let (registry, rest) = s.split_once('/').ok_or_else(invalid)?;
        if registry.is_empty() || rest.is_empty() {
            return Err(invalid());
        }
        let (repository, reference) = match rest.split_once('@') {
            Some((repository, digest)) => {
                if !valid_digest(digest) {
                    return Err(invalid());
                }
                (repository, digest)
            }
            None => match rest.rsplit_once(':') {
                Some((repository, tag)) if !tag.contains('/') => {
                    if !valid_tag(tag) {
                        return Err(invalid());
                    }
                    (repository, tag)
                }
                _ => (rest, ""),
            },
        };
        if !valid_repository(repository) {
            return Err(invalid());
        }
        Ok(Self {
            registry: registry.into(),
            repository: repository.into(),
            reference: if reference.is_empty() {
                "latest".into()
            } else {
                reference.into()
            },
        })
    }
}

impl fmt::Display for OciReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.is_digest() { '@' } else { ':' };
        write!(
            f,
            "{}/{}{sep}{}",
            self.registry, self.repository, self.reference
        )
    }
}

fn valid_repository(repository: &str) -> bool {
    !repository.is_empty()
        && repository.split('/').all(|part| {
            !part.is_empty()
                && part.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
                })
        })
}

fn valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn valid_digest(digest: &str) -> bool {
    match digest.split_once(':') {
        Some((algorithm, hex)) => {
            !algorithm.is_empty()
                && !hex.is_empty()
                && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Copies an OCI artifact's files into a directory.
#[async_trait]
pub trait OciPuller: fmt::Debug + Send + Sync {
    /// Pulls `reference` into `destination`, returning the manifest digest.
    async fn pull(
        &self,
        cancel: &CancellationToken,
        reference: &OciReference,
        destination: &Path,
    ) -> Result<String>;
}

/// Whether the registry puller talks HTTPS or plain HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegistryTls {
    /// TLS everywhere except loopback registries.
    #[default]
    Auto,
    Always,
    Never,
}

/// Talks to an OCI distribution registry over HTTP(S) with anonymous bearer
/// token auth.
///
/// Each layer with an `org.opencontainers.image.title` annotation is written
/// to that name under the destination. Layers marked for unpacking are
/// gzipped tarballs and get expanded instead.
#[derive(Debug, Clone)]
pub struct RegistryPuller {
    client: Client,
    tls: RegistryTls,
}

impl Default for RegistryPuller {
    fn default() -> Self {
        Self {
            client: Client::new(),
            tls: RegistryTls::Auto,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    digest: String,
    #[serde(default)]
    annotations: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct Challenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

impl RegistryPuller {
    pub fn new(tls: RegistryTls, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: ClientBuilder::new()
                .user_agent("gather")
                .timeout(timeout)
                .build()?,
            tls,
        })
    }

    fn base_url(&self, reference: &OciReference) -> String {
        let plain = match self.tls {
            RegistryTls::Always => false,
            RegistryTls::Never => true,
            RegistryTls::Auto => is_loopback(reference.hostname()),
        };
        let scheme = if plain { "http" } else { "https" };
        format!(
            "{scheme}://{}/v2/{}",
            reference.registry, reference.repository
        )
    }

    async fn get(
        &self,
        cancel: &CancellationToken,
        reference: &OciReference,
        url: &str,
        accept: Option<&str>,
        token: &mut Option<String>,
    ) -> Result<Response> {
        let send = |token: Option<&str>| {
            let mut req = self.client.get(url);
            if let Some(accept) = accept {
                req = req.header(ACCEPT, accept);
            }
            if let Some(token) = token {
                req = req.bearer_auth(token);
            }
            req.send()
        };

        let mut response = cancellable(cancel, async {
            send(token.as_deref()).await.map_err(GatherError::from)
        })
        .await?;

        if response.status() == StatusCode::UNAUTHORIZED && token.is_none() {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_bearer_challenge)
                .ok_or_else(|| {
                    GatherError::OciPull(
                        reference.to_string(),
                        "registry requires credentials".into(),
                    )
                })?;
            *token = Some(self.fetch_token(cancel, reference, &challenge).await?);
            response = cancellable(cancel, async {
                send(token.as_deref()).await.map_err(GatherError::from)
            })
            .await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(GatherError::OciPull(
                reference.to_string(),
                format!("GET {url} returned {status}"),
            ));
        }
        Ok(response)
    }

    async fn fetch_token(
        &self,
        cancel: &CancellationToken,
        reference: &OciReference,
        challenge: &Challenge,
    ) -> Result<String> {
        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", reference.repository));
        let mut query = vec![("scope", scope)];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }
        tracing::debug!("Requesting registry token from {}", challenge.realm);
        let response = cancellable(cancel, async {
            self.client
                .get(&challenge.realm)
                .query(&query)
                .send()
                .await
                .map_err(GatherError::from)
        })
        .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatherError::OciPull(
                reference.to_string(),
                format!("token request returned {status}"),
            ));
        }
        let body: TokenResponse = response.json().await?;
        body.token.or(body.access_token).ok_or_else(|| {
            GatherError::OciPull(
                reference.to_string(),
                "token response carried no token".into(),
            )
        })
    }

    async fn save_layer(
        &self,
        cancel: &CancellationToken,
        reference: &OciReference,
        layer: &Descriptor,
        title: &str,
        destination: &Path,
        token: &mut Option<String>,
    ) -> Result<u64> {
        let relative = Path::new(title);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(GatherError::OciPull(
                reference.to_string(),
                format!("layer title `{title}` escapes the destination"),
            ));
        }

        let url = format!("{}/blobs/{}", self.base_url(reference), layer.digest);
        let response = self.get(cancel, reference, &url, None, token).await?;
        let blob = cancellable(cancel, async {
            response.bytes().await.map_err(GatherError::from)
        })
        .await?;

        let actual = format!("sha256:{}", sha256_hex(&blob));
        if layer.digest.starts_with("sha256:") && layer.digest != actual {
            return Err(GatherError::OciPull(
                reference.to_string(),
                format!("layer {title} has digest {actual}, expected {}", layer.digest),
            ));
        }

        let unpack = layer
            .annotations
            .get(UNPACK_ANNOTATION)
            .map(|v| v == "true")
            .unwrap_or(false);
        if unpack {
            let tmp = tempfile::tempdir().io_context(|| "Failed to create temp dir".into())?;
            let archive = tmp.path().join("layer.tar.gz");
            async_std::fs::write(&archive, &blob)
                .await
                .io_context(|| format!("Failed to write {}", archive.display()))?;
            let dest = destination.to_owned();
            return async_std::task::spawn_blocking(move || {
                let res = TarExpander::new().expand_gzip(&archive, &dest);
                drop(tmp);
                res
            })
            .await;
        }

        let path = destination.join(relative);
        if let Some(parent) = path.parent() {
            async_std::fs::create_dir_all(parent)
                .await
                .io_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        async_std::fs::write(&path, &blob)
            .await
            .io_context(|| format!("Failed to write {}", path.display()))?;
        tracing::trace!("Wrote layer {} to {}", layer.digest, path.display());
        Ok(blob.len() as u64)
    }
}

#[async_trait]
impl OciPuller for RegistryPuller {
    async fn pull(
        &self,
        cancel: &CancellationToken,
        reference: &OciReference,
        destination: &Path,
    ) -> Result<String> {
        let mut token = None;
        let url = format!(
            "{}/manifests/{}",
            self.base_url(reference),
            reference.reference
        );
        tracing::debug!("Fetching manifest {url}");
        let response = self
            .get(cancel, reference, &url, Some(MANIFEST_TYPES), &mut token)
            .await?;
        let header_digest = response
            .headers()
            .get("docker-content-digest")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = cancellable(cancel, async {
            response.bytes().await.map_err(GatherError::from)
        })
        .await?;
        let digest = header_digest.unwrap_or_else(|| format!("sha256:{}", sha256_hex(&body)));
        let manifest: Manifest = serde_json::from_slice(&body)?;

        let mut total = 0;
        for layer in &manifest.layers {
            match layer.annotations.get(TITLE_ANNOTATION) {
                Some(title) => {
                    total += self
                        .save_layer(cancel, reference, layer, title, destination, &mut token)
                        .await?;
                }
                None => tracing::debug!("Skipping untitled layer {}", layer.digest),
            }
        }
        tracing::debug!("Pulled {reference} ({digest}, {total} bytes)");
        Ok(digest)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    IntegrityOpts::new()
        .algorithm(Algorithm::Sha256)
        .chain(data)
        .result()
        .to_hex()
        .1
}

fn is_loopback(host: &str) -> bool {
    host == "localhost"
        || host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

/// Parses `Bearer realm="…",service="…",scope="…"`.
fn parse_bearer_challenge(header: &str) -> Option<Challenge> {
    let (scheme, params) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let mut fields = HashMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after) = rest.split_once('=')?;
        let (value, after) = match after.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted.find('"')?;
                (&quoted[..end], &quoted[end + 1..])
            }
            None => match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            },
        };
        fields.insert(key.trim().to_ascii_lowercase(), value.to_owned());
        rest = after.trim_start_matches([',', ' ']);
    }
    Some(Challenge {
        realm: fields.remove("realm")?,
        service: fields.remove("service"),
        scope: fields.remove("scope"),
    })
}

/// Gathers OCI artifacts through an [`OciPuller`].
#[derive(Debug, Clone)]
pub struct OciGatherer {
    puller: Arc<dyn OciPuller>,
}

impl Default for OciGatherer {
    fn default() -> Self {
        Self::new(Arc::new(RegistryPuller::default()))
    }
}

impl OciGatherer {
    pub fn new(puller: Arc<dyn OciPuller>) -> Self {
        Self { puller }
    }
}

#[async_trait]
impl Gatherer for OciGatherer {
    async fn gather(
        &self,
        cancel: &CancellationToken,
        source: &str,
        destination: &Path,
    ) -> Result<Metadata> {
        let reference = OciReference::from_source(source)?;
        async_std::fs::create_dir_all(destination)
            .await
            .io_context(|| format!("failed to create directory {}", destination.display()))?;
        let digest = self
            .puller
            .pull(cancel, &reference, destination)
            .await
            .map_err(|e| match e {
                e @ (GatherError::OciPull(..) | GatherError::Cancelled) => e,
                e => GatherError::OciPull(reference.to_string(), e.to_string()),
            })?;
        tracing::debug!("Pulled {reference} into {}", destination.display());
        Ok(OciMetadata { digest }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn reference(registry: &str, repository: &str, reference: &str) -> OciReference {
        OciReference {
            registry: registry.into(),
            repository: repository.into(),
            reference: reference.into(),
        }
    }

    #[test]
    fn parses_sources() -> Result<()> {
        assert_eq!(
            OciReference::from_source("oci::quay.io/org/policy:v1")?,
            reference("quay.io", "org/policy", "v1")
        );
        assert_eq!(
            OciReference::from_source("oci://quay.io/org/policy")?,
            reference("quay.io", "org/policy", "latest")
        );
        assert_eq!(
            OciReference::from_source("localhost:5000/policy:dev")?,
            reference("127.0.0.1:5000", "policy", "dev")
        );
        let digest = format!("sha256:{}", "a".repeat(64));
        assert_eq!(
            OciReference::from_source(&format!("registry.io/org/policy@{digest}"))?,
            reference("registry.io", "org/policy", &digest)
        );
        Ok(())
    }

    #[test]
    fn rejects_bad_references() {
        for bad in ["policy", "quay.io/", "quay.io/Org/Policy", "quay.io/org/p@nope"] {
            let err = OciReference::from_source(bad).unwrap_err();
            assert_eq!(err.to_string(), format!("failed to parse reference: `{bad}`"));
        }
    }

    #[test]
    fn displays_tags_and_digests() {
        assert_eq!(
            reference("quay.io", "org/policy", "v1").to_string(),
            "quay.io/org/policy:v1"
        );
        assert_eq!(
            reference("quay.io", "org/policy", "sha256:abc").to_string(),
            "quay.io/org/policy@sha256:abc"
        );
    }

    #[test]
    fn registry_scheme() {
        let puller = RegistryPuller::default();
        assert_eq!(
            puller.base_url(&reference("127.0.0.1:5000", "policy", "latest")),
            "http://127.0.0.1:5000/v2/policy"
        );
        assert_eq!(
            puller.base_url(&reference("quay.io", "org/policy", "latest")),
            "https://quay.io/v2/org/policy"
        );
        let forced = RegistryPuller::new(RegistryTls::Always, Duration::from_secs(5)).unwrap();
        assert_eq!(
            forced.base_url(&reference("127.0.0.1:5000", "policy", "latest")),
            "https://127.0.0.1:5000/v2/policy"
        );
    }

    #[test]
    fn bearer_challenges() {
        assert_eq!(
            parse_bearer_challenge(
                r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:org/policy:pull""#
            ),
            Some(Challenge {
                realm: "https://auth.example.com/token".into(),
                service: Some("registry.example.com".into()),
                scope: Some("repository:org/policy:pull".into()),
            })
        );
        assert_eq!(parse_bearer_challenge(r#"Basic realm="x""#), None);
    }

    #[test]
    fn loopback_hosts() {
        assert!(is_loopback("localhost"));
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(!is_loopback("quay.io"));
        assert_eq!(reference("[::1]:5000", "p", "latest").hostname(), "::1");
    }
}
