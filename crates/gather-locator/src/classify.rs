use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use url::Url;

use crate::error::{LocatorError, Result};
use crate::home::{expand_tilde, HomeDir, SystemHome};
use crate::kind::UriKind;

static GIT_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(",
        r"git@[\w.\-]+:[\w.\-]+/[\w.\-]+(\.git)?",
        r"|https?://[\w.\-]+/[\w.\-]+/[\w.\-]+(\.git)?",
        r"|git://[\w.\-]+/[\w.\-]+/[\w.\-]+(\.git)?",
        r"|ssh://([\w.\-]+@)?[\w.\-]+(:\d+)?/[\w.\-]+/[\w.\-]+(\.git)?",
        r"|((git|ssh)://)?[\w.\-]+/[\w.\-]+/[\w.\-]+//.*",
        r"|file://.*\.git",
        r"|[\w.\-]+/[\w.\-]+(\.git)?",
        r")$"
    ))
    .unwrap()
});

static HTTP_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^((http://|https://)[\w\-]+(\.[\w\-]+)+.*)$").unwrap());

pub(crate) static FILE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\./|\.\./|/|[a-zA-Z]:\\|~/|file://).*").unwrap());

static OCI_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^((oci://)[\w\-]+(\.[\w\-]+)+.*)$").unwrap());

static OCI_REGISTRIES: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"azurecr\.io",
        r"gcr\.io",
        r"registry\.gitlab\.com",
        r"pkg\.dev",
        r"[0-9]{12}\.dkr\.ecr\.[a-z0-9-]*\.amazonaws\.com",
        r"^quay\.io",
        // Registries served from the local machine.
        r"(?:::1|127\.0\.0\.1|(?i:localhost)):\d{1,5}",
    ])
    .unwrap()
});

/// Decides which protocol a locator refers to.
///
/// Classification is a fixed cascade of checks where the first match wins.
/// Several of the patterns overlap (a bare `org/repo` is both a git shorthand
/// and a dotted string without a scheme), so the order of the checks in
/// [`Classifier::classify`] is significant.
#[derive(Clone)]
pub struct Classifier {
    home: Arc<dyn HomeDir>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(SystemHome)
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier").finish_non_exhaustive()
    }
}

impl Classifier {
    /// Creates a classifier that resolves `~/` through `home`.
    pub fn new(home: impl HomeDir + 'static) -> Self {
        Self {
            home: Arc::new(home),
        }
    }

    pub(crate) fn home(&self) -> &dyn HomeDir {
        &*self.home
    }

    /// Expands a leading `~/` using this classifier's home directory lookup.
    pub fn expand_tilde(&self, path: &str) -> String {
        expand_tilde(path, self.home())
    }

    /// Classifies `input` as a git, HTTP(S), file or OCI locator.
    ///
    /// Returns [`UriKind::Unknown`] without an error for inputs that are
    /// simply ambiguous (a bare word), and [`UriKind::Unknown`] with an error
    /// for inputs that look like URLs we can't handle.
    pub fn classify(&self, input: &str) -> Result<UriKind> {
        if input.starts_with("git::") {
            return Ok(UriKind::Git);
        }
        if input.starts_with("file::") {
            return Ok(UriKind::File);
        }
        if input.starts_with("http::") {
            return Ok(UriKind::Http);
        }
        if input.starts_with("oci::") {
            return Ok(UriKind::Oci);
        }

        if input.starts_with("github.com") || input.starts_with("gitlab.com") {
            return Ok(UriKind::Git);
        }

        if FILE_PATH.is_match(input) {
            let expanded = self.expand_tilde(input);
            if expanded.ends_with(".git") {
                return Ok(UriKind::Git);
            }
            return Ok(UriKind::File);
        }

        if GIT_URI.is_match(input) {
            return Ok(UriKind::Git);
        }

        if HTTP_URI.is_match(input) {
            if let Ok(url) = Url::parse(input) {
                if url.scheme() == "http" || url.scheme() == "https" {
                    return Ok(UriKind::Http);
                }
            }
        }

        if OCI_URI.is_match(input) {
            return Ok(UriKind::Oci);
        }

        if contains_oci_registry(input) {
            return Ok(UriKind::Oci);
        }

        if let Ok(url) = Url::parse(input) {
            let scheme = url.scheme();
            if !scheme.is_empty() && scheme != "http" && scheme != "https" {
                return Err(LocatorError::UnsupportedProtocol(scheme.into()));
            }
        }

        if input.contains('.') {
            return Err(LocatorError::MissingScheme(input.into()));
        }

        Ok(UriKind::Unknown)
    }
}

/// Classifies `input` using the system home directory for `~/` expansion.
/// See [`Classifier::classify`].
pub fn classify(input: &str) -> Result<UriKind> {
    Classifier::default().classify(input)
}

/// Whether `input` mentions a well-known container registry host.
pub fn contains_oci_registry(input: &str) -> bool {
    OCI_REGISTRIES.is_match(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_registries() {
        for (input, expected) in [
            ("azurecr.io", true),
            ("gcr.io", true),
            ("registry.gitlab.com", true),
            ("pkg.dev", true),
            ("123456789012.dkr.ecr.us-west-2.amazonaws.com", true),
            ("quay.io", true),
            ("::1", false),
            ("127.0.0.1", false),
            ("123.123.123.123", false),
            ("127.0.0.1:8080", true),
            ("localhost:8080", true),
            ("LocalHost:5000", true),
            ("example.com", false),
            ("my.quay.io", false),
        ] {
            assert_eq!(contains_oci_registry(input), expected, "{input}");
        }
    }

    #[test]
    fn patterns_compile() {
        Lazy::force(&GIT_URI);
        Lazy::force(&HTTP_URI);
        Lazy::force(&FILE_PATH);
        Lazy::force(&OCI_URI);
        Lazy::force(&OCI_REGISTRIES);
    }
}
