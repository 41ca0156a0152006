use std::num::ParseIntError;

use miette::Diagnostic;
use thiserror::Error;

/// Error type returned while classifying or normalizing a locator.
#[derive(Debug, Error, Diagnostic)]
pub enum LocatorError {
    /// The locator parsed as a URL, but its scheme is not one we know how to
    /// gather from.
    #[error("unsupported source protocol: {0}")]
    #[diagnostic(
        code(gather_locator::unsupported_protocol),
        url(docsrs),
        help("Supported protocols are git, http(s), file and oci.")
    )]
    UnsupportedProtocol(String),

    /// The locator looks like a host name or a dotted file name, but it has
    /// no scheme and matched none of the known shapes.
    #[error("got {0}. HTTP(S) URIs require a scheme (http:// or https://)")]
    #[diagnostic(
        code(gather_locator::missing_scheme),
        url(docsrs),
        help("Prefix the locator with `https://`, or use `git::`, `oci::` or `file::` to pick a protocol explicitly.")
    )]
    MissingScheme(String),

    /// Classification failed while processing a git locator.
    #[error("failed to classify URI: {0}")]
    #[diagnostic(code(gather_locator::git::classify), url(docsrs))]
    Classify(#[source] Box<LocatorError>),

    /// The git-aware parse of the locator failed.
    #[error("failed to parse source URL: {0}")]
    #[diagnostic(code(gather_locator::git::parse), url(docsrs))]
    ParseSourceUrl(#[source] url::ParseError),

    /// The normalized git URL could not be parsed again as a generic URL.
    #[error("failed to reparse URL: {0}")]
    #[diagnostic(code(gather_locator::git::reparse), url(docsrs))]
    ReparseUrl(#[source] url::ParseError),

    /// A local repository path could not be turned into a `file://` URL.
    #[error("failed to parse source URL: `{0}` is not a valid local repository path")]
    #[diagnostic(code(gather_locator::git::local_path), url(docsrs))]
    LocalPath(String),

    /// The `depth` query parameter was not a number.
    #[error("failed to parse depth: `{0}`")]
    #[diagnostic(
        code(gather_locator::git::depth),
        url(docsrs),
        help("`depth` must be a positive integer, for example `?depth=1`.")
    )]
    InvalidDepth(String, #[source] ParseIntError),
}

/// The result type returned by calls to this library
pub type Result<T> = std::result::Result<T, LocatorError>;
