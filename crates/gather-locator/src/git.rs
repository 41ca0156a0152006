use std::fmt;
use std::path::Path;
use std::str::FromStr;

use url::Url;

use crate::classify::{Classifier, FILE_PATH};
use crate::error::{LocatorError, Result};
use crate::home::HomeDir;
use crate::kind::UriKind;
use crate::parsers::scp::scp_location;

/// A git locator broken down into what `git clone` needs.
///
/// Every field is a plain string; an empty string means the caller did not
/// ask for it (default branch, repository root, full history).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GitLocator {
    /// Fully qualified clone URL. Always carries a scheme and always ends in
    /// `.git`.
    pub clone_url: String,
    /// Branch, tag or commit to check out.
    pub git_ref: String,
    /// Repository-relative path to copy out of the clone.
    pub subdirectory: String,
    /// Shallow clone depth, as written in the locator.
    pub depth: String,
}

impl GitLocator {
    /// Whether cloning needs SSH credentials.
    pub fn is_ssh(&self) -> bool {
        self.clone_url.starts_with("ssh://")
    }

    /// The requested clone depth, if any.
    pub fn depth(&self) -> Result<Option<u32>> {
        if self.depth.is_empty() {
            return Ok(None);
        }
        self.depth
            .parse()
            .map(Some)
            .map_err(|e| LocatorError::InvalidDepth(self.depth.clone(), e))
    }
}

impl fmt::Display for GitLocator {
    /// Renders the locator back into the `git::` form that
    /// [`process_git_url`] accepts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut url = match Url::parse(&self.clone_url) {
            Ok(url) => url,
            Err(_) => return write!(f, "git::{}", self.clone_url),
        };
        if !self.subdirectory.is_empty() {
            let path = format!("{}//{}", url.path(), self.subdirectory);
            url.set_path(&path);
        }
        if !self.git_ref.is_empty() || !self.depth.is_empty() {
            let mut query = url.query_pairs_mut();
            if !self.git_ref.is_empty() {
                query.append_pair("ref", &self.git_ref);
            }
            if !self.depth.is_empty() {
                query.append_pair("depth", &self.depth);
            }
        }
        write!(f, "git::{url}")
    }
}

impl FromStr for GitLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self> {
        process_git_url(s)
    }
}

impl Classifier {
    /// Normalizes a git-style locator into a [`GitLocator`].
    ///
    /// Accepts explicit `git::` prefixes, scp-style `user@host:path`
    /// locations, bare `host/org/repo` shorthands (which become `https://`
    /// URLs), `//subdir` suffixes on the path, and `ref`/`depth` query
    /// parameters. A `//` inside a `ref` or `depth` value also splits off a
    /// subdirectory, but a `//` in the path takes precedence.
    pub fn process_git_url(&self, raw: &str) -> Result<GitLocator> {
        let kind = self
            .classify(raw)
            .map_err(|e| LocatorError::Classify(Box::new(e)))?;

        // The protocol hint has done its job once we've classified.
        let source = match raw.split_once("::") {
            Some((_, rest)) => rest,
            None => raw,
        };

        let source = if kind == UriKind::Git
            && !source.contains("git@")
            && !source.contains("://")
            && !FILE_PATH.is_match(source)
        {
            format!("https://{source}")
        } else {
            source.to_owned()
        };

        let normalized = parse_git_url(&source, self.home())?;
        let mut url = Url::parse(normalized.as_str()).map_err(LocatorError::ReparseUrl)?;

        let mut subdirectory = String::new();
        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let git_ref = take_query_value(&mut pairs, "ref", &mut subdirectory);
        let depth = take_query_value(&mut pairs, "depth", &mut subdirectory);
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(&pairs);
        }

        let path = url.path().to_owned();
        if let Some((repo, subdir)) = path.split_once("//") {
            subdirectory = subdir.to_owned();
            url.set_path(repo);
        }

        if !url.path().ends_with(".git") {
            let path = format!("{}.git", url.path());
            url.set_path(&path);
        }

        tracing::trace!(
            "Processed git locator `{raw}` into `{url}` (ref: {git_ref:?}, subdirectory: {subdirectory:?}, depth: {depth:?})"
        );

        Ok(GitLocator {
            clone_url: url.to_string(),
            git_ref,
            subdirectory,
            depth,
        })
    }
}

/// Normalizes a git-style locator using the system home directory. See
/// [`Classifier::process_git_url`].
pub fn process_git_url(raw: &str) -> Result<GitLocator> {
    Classifier::default().process_git_url(raw)
}

/// Git-aware parse: understands scheme URLs, `git+ssh://`, scp-style
/// `user@host:path` and local repository paths, and renders all of them as
/// a single URL form.
fn parse_git_url(source: &str, home: &dyn HomeDir) -> Result<Url> {
    if let Some(rest) = source.strip_prefix("git+") {
        if rest.contains("://") {
            return Url::parse(rest).map_err(LocatorError::ParseSourceUrl);
        }
    }
    if source.contains("://") {
        return Url::parse(source).map_err(LocatorError::ParseSourceUrl);
    }
    if let Ok((_, location)) = scp_location(source) {
        return Url::parse(&location.to_ssh_url()).map_err(LocatorError::ParseSourceUrl);
    }
    local_repo_url(source, home)
}

fn local_repo_url(source: &str, home: &dyn HomeDir) -> Result<Url> {
    let expanded = crate::home::expand_tilde(source, home);
    let path = Path::new(&expanded);
    let absolute = if path.is_absolute() {
        path.to_owned()
    } else {
        std::env::current_dir()
            .map_err(|_| LocatorError::LocalPath(source.into()))?
            .join(path)
    };
    Url::from_file_path(&absolute).map_err(|_| LocatorError::LocalPath(source.into()))
}

/// Removes `key` from `pairs` and returns its first value. A `//` inside the
/// value splits off a subdirectory, which is written to `subdirectory`.
fn take_query_value(pairs: &mut Vec<(String, String)>, key: &str, subdirectory: &mut String) -> String {
    let value = pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .unwrap_or_default();
    pairs.retain(|(k, _)| k != key);
    match value.split_once("//") {
        Some((value, subdir)) => {
            *subdirectory = subdir.to_owned();
            value.to_owned()
        }
        None => value,
    }
}
