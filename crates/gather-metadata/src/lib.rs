//! Metadata reported after gathering a source, and rewriting of the original
//! locator into a pinned one that refers to exactly that content.

pub use error::{MetadataError, Result};
pub use metadata::*;

mod error;
mod metadata;
mod pin;
