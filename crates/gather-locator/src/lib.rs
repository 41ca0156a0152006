//! Locator classification and git source URL normalization.
//!
//! A locator is whatever a user typed to point at something to fetch: a git
//! repository (`git@github.com:org/repo.git`, `github.com/org/repo//sub`), an
//! HTTP(S) URL, a local path, or an OCI reference (`quay.io/org/img:tag`).
//! [`classify`] decides which of those it is, and [`process_git_url`] breaks
//! git locators down into a clone URL, ref, subdirectory and depth.

pub use classify::{classify, contains_oci_registry, Classifier};
pub use error::{LocatorError, Result};
pub use git::{process_git_url, GitLocator};
pub use home::{expand_tilde, HomeDir, SystemHome};
pub use kind::UriKind;

mod classify;
mod error;
mod git;
mod home;
mod kind;
mod parsers;
