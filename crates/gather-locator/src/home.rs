use std::path::PathBuf;

use directories::BaseDirs;

/// Looks up the current user's home directory for `~/` expansion.
pub trait HomeDir: Send + Sync {
    fn home_dir(&self) -> Option<PathBuf>;
}

/// [`HomeDir`] backed by the platform's notion of a home directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHome;

impl HomeDir for SystemHome {
    fn home_dir(&self) -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().to_owned())
    }
}

impl<F> HomeDir for F
where
    F: Fn() -> Option<PathBuf> + Send + Sync,
{
    fn home_dir(&self) -> Option<PathBuf> {
        self()
    }
}

/// Expands a leading `~/` to the user's home directory. If the home
/// directory can't be found, the path is returned as-is.
pub fn expand_tilde(path: &str, home: &dyn HomeDir) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => match home.home_dir() {
            Some(dir) => dir.join(rest).to_string_lossy().into_owned(),
            None => {
                tracing::debug!("No home directory found, leaving `{path}` unexpanded.");
                path.to_owned()
            }
        },
        None => path.to_owned(),
    }
}
