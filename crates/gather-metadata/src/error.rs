use miette::Diagnostic;
use thiserror::Error;

/// Error returned when a locator can't be pinned to the content that was
/// fetched from it.
#[derive(Debug, Error, Diagnostic)]
pub enum MetadataError {
    /// No locator was given.
    #[error("empty URL")]
    #[diagnostic(code(gather_metadata::empty_url), url(docsrs))]
    EmptyUrl,

    /// A file locator had a prefix but no path after it.
    #[error("empty file path")]
    #[diagnostic(code(gather_metadata::empty_file_path), url(docsrs))]
    EmptyFilePath,

    /// Git metadata without a commit can't pin anything.
    #[error("latest commit not set")]
    #[diagnostic(
        code(gather_metadata::git::no_commit),
        url(docsrs),
        help("Pinning needs the commit that was checked out by the fetch.")
    )]
    LatestCommitNotSet,

    /// OCI metadata without a digest can't pin anything.
    #[error("image digest not set")]
    #[diagnostic(code(gather_metadata::oci::no_digest), url(docsrs))]
    DigestNotSet,

    /// A relative file locator could not be made absolute.
    #[error("failed to resolve the current directory: {0}")]
    #[diagnostic(code(gather_metadata::file::current_dir), url(docsrs))]
    CurrentDir(#[source] std::io::Error),
}

/// The result type returned by calls to this library
pub type Result<T> = std::result::Result<T, MetadataError>;
