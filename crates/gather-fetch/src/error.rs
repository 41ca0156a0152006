use std::path::PathBuf;

use gather_locator::LocatorError;
use miette::Diagnostic;
use thiserror::Error;

/// Error type returned by all API calls.
#[derive(Error, Debug, Diagnostic)]
pub enum GatherError {
    /// Something went wrong while classifying or normalizing a locator.
    #[error(transparent)]
    #[diagnostic(transparent)]
    LocatorError(#[from] LocatorError),

    /// The source could not be parsed as a URL, so there is no scheme to
    /// dispatch on.
    #[error("failed to parse source URL `{0}`: {1}")]
    #[diagnostic(
        code(gather::parse_source),
        url(docsrs),
        help("Use an explicit prefix such as `git::`, `oci::`, `http::` or `file::`.")
    )]
    ParseSource(String, #[source] url::ParseError),

    /// No gatherer is registered for the source's scheme.
    #[error("unsupported source protocol: {0}")]
    #[diagnostic(code(gather::unsupported_protocol), url(docsrs))]
    UnsupportedProtocol(String),

    /// The locator didn't look like anything we know how to gather.
    #[error("could not determine how to gather `{0}`")]
    #[diagnostic(
        code(gather::unknown_locator),
        url(docsrs),
        help("Use an explicit prefix such as `git::`, `oci::`, `http::` or `file::`.")
    )]
    UnknownLocator(String),

    /// No saver exists for the destination's protocol.
    #[error("unsupported protocol: {0}")]
    #[diagnostic(code(gather::saver::unsupported_protocol), url(docsrs))]
    UnsupportedSaver(String),

    /// The operation was cancelled before it could finish.
    #[error("operation cancelled")]
    #[diagnostic(code(gather::cancelled), url(docsrs))]
    Cancelled,

    /// At least one entry of a directory copy failed. The destination may
    /// hold a partial copy.
    #[error("failed to copy directory: {0}")]
    #[diagnostic(code(gather::copy_directory), url(docsrs))]
    CopyDirectory(#[source] Box<GatherError>),

    /// A generic IO error occurred. Refer to the error message for more
    /// details.
    #[error("{0}")]
    #[diagnostic(code(gather::io::generic), url(docsrs))]
    IoError(String, #[source] std::io::Error),

    /// Refusing to overwrite an existing file.
    #[error("destination file already exists: {}", .0.display())]
    #[diagnostic(
        code(gather::destination_exists),
        url(docsrs),
        help("Remove the file first, or pick another destination.")
    )]
    DestinationExists(PathBuf),

    /// An HTTP request failed before a response came back.
    #[error("error downloading file: {0}")]
    #[diagnostic(code(gather::http::request), url(docsrs))]
    HttpError(#[from] reqwest::Error),

    /// The server answered with something other than `200 OK`.
    #[error("response code error: {0}")]
    #[diagnostic(code(gather::http::status), url(docsrs))]
    ResponseCode(u16),

    /// HTTP sources must be absolute URLs.
    #[error("no source scheme provided")]
    #[diagnostic(code(gather::http::no_scheme), url(docsrs))]
    NoScheme,

    /// HTTP sources must name a file.
    #[error("specify a path to a file to download")]
    #[diagnostic(code(gather::http::no_file_name), url(docsrs))]
    NoFileName,

    /// Failed to find git in the user's `$PATH`.
    #[error(transparent)]
    #[diagnostic(
        code(gather::git::which_git_failure),
        url(docsrs),
        help("Are you sure git is installed and available in your $PATH?")
    )]
    WhichGit(#[from] which::Error),

    /// An io-related error occurred while executing git.
    #[error("Failed to execute git subprocess. {0}")]
    #[diagnostic(code(gather::git::io), url(docsrs))]
    GitIoError(#[source] std::io::Error),

    /// The git locator could not be normalized.
    #[error("failed to process URL: {0}")]
    #[diagnostic(code(gather::git::process_url), url(docsrs))]
    ProcessUrl(#[source] LocatorError),

    /// `git clone` exited unsuccessfully.
    #[error("error cloning repository `{0}`")]
    #[diagnostic(code(gather::git::clone), url(docsrs))]
    GitCloneError(String),

    /// `git checkout` exited unsuccessfully.
    #[error("Failed to check out `{0}#{1}`")]
    #[diagnostic(code(gather::git::checkout), url(docsrs))]
    GitCheckoutError(String, String),

    /// `git rev-parse HEAD` failed in a fresh clone.
    #[error("failed to read the latest commit of `{0}`")]
    #[diagnostic(code(gather::git::rev_parse), url(docsrs))]
    GitHeadError(String),

    /// The requested subdirectory isn't in the cloned tree.
    #[error("path {0} does not exist in the repository")]
    #[diagnostic(code(gather::git::missing_path), url(docsrs))]
    MissingRepositoryPath(String),

    /// No SSH agent credential could be obtained for an ssh clone.
    #[error("failed to create SSH auth method: {0}")]
    #[diagnostic(
        code(gather::git::ssh_auth),
        url(docsrs),
        help("Start an ssh-agent and add your key with `ssh-add`.")
    )]
    SshAuth(String),

    /// An OCI reference could not be parsed.
    #[error("failed to parse reference: `{0}`")]
    #[diagnostic(
        code(gather::oci::reference),
        url(docsrs),
        help("OCI references look like `registry.example.com/org/repo[:tag|@digest]`.")
    )]
    OciReference(String),

    /// The registry answered, but not with anything we could pull.
    #[error("pulling {0}: {1}")]
    #[diagnostic(code(gather::oci::pull), url(docsrs))]
    OciPull(String, String),

    /// An archive entry would land outside the destination directory.
    #[error("tar file ({0}) would escape destination directory")]
    #[diagnostic(code(gather::tar::escape), url(docsrs))]
    TarEscape(String),

    /// An archive had no entries.
    #[error("tar file is empty: {}", .0.display())]
    #[diagnostic(code(gather::tar::empty), url(docsrs))]
    TarEmpty(PathBuf),

    /// An archive has more entries than allowed.
    #[error("tar file contains more files than the {0} allowed")]
    #[diagnostic(code(gather::tar::too_many_files), url(docsrs))]
    TarTooManyFiles(usize),

    /// An archive's content is larger than allowed.
    #[error("tar file size exceeds the {0} limit: {1}")]
    #[diagnostic(code(gather::tar::too_large), url(docsrs))]
    TarTooLarge(u64, u64),

    /// A generic serde error.
    #[error(transparent)]
    #[diagnostic(code(gather::serde), url(docsrs))]
    SerdeError(#[from] serde_json::Error),
}

/// The result type returned by calls to this library
pub type Result<T> = std::result::Result<T, GatherError>;

pub trait IoContext {
    type T;

    fn io_context(self, context: impl FnOnce() -> String) -> Result<Self::T>;
}

impl<T> IoContext for std::result::Result<T, std::io::Error> {
    type T = T;

    fn io_context(self, context: impl FnOnce() -> String) -> Result<Self::T> {
        self.map_err(|e| GatherError::IoError(context(), e))
    }
}
