//! Fetches sources named by a locator into a local destination.
//!
//! [`Gather`] looks at a source's scheme and hands it to the matching
//! [`Gatherer`]: git repositories are cloned with the system `git`, HTTP(S)
//! files are downloaded, OCI artifacts are pulled from their registry, and
//! local files, directories and `.tar` archives are copied or expanded.
//! Every gatherer reports a [`Metadata`] describing what it fetched, which
//! can in turn pin the original locator.

pub use gather_locator::{Classifier, GitLocator, HomeDir, UriKind};
pub use gather_metadata::{Metadata, MetadataError};
pub use tokio_util::sync::CancellationToken;

pub use error::{GatherError, IoContext, Result};
pub use expand::TarExpander;
pub use fetch::*;
pub use gather::{Gather, GatherOpts};
pub use saver::{destination_protocol, saver_for, FileSaver, Saver};

mod error;
mod expand;
mod fetch;
mod gather;
mod saver;
