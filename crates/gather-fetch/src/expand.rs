use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::error::{GatherError, IoContext, Result};

/// Unpacks tar archives into a directory.
///
/// Entries that would land outside the destination are rejected, and the
/// optional limits bound how many entries and how many bytes an archive may
/// expand to. Links are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TarExpander {
    /// Maximum number of entries, if any.
    pub files_limit: Option<usize>,
    /// Maximum total size of all entries, in bytes, if any.
    pub size_limit: Option<u64>,
}

impl TarExpander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files_limit(mut self, limit: usize) -> Self {
        self.files_limit = Some(limit);
        self
    }

    pub fn size_limit(mut self, limit: u64) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Expands the archive at `archive` into `destination`. Returns the
    /// number of bytes extracted.
    ///
    /// This does blocking IO. Async callers should run it on a blocking
    /// thread.
    pub fn expand(&self, archive: &Path, destination: &Path) -> Result<u64> {
        let file = fs::File::open(archive)
            .io_context(|| format!("Failed to open tar file {}", archive.display()))?;
        self.expand_reader(std::io::BufReader::new(file), destination, archive)
    }

    /// Expands a gzip-compressed archive.
    pub fn expand_gzip(&self, archive: &Path, destination: &Path) -> Result<u64> {
        let file = fs::File::open(archive)
            .io_context(|| format!("Failed to open tar file {}", archive.display()))?;
        let gz = flate2::read::GzDecoder::new(std::io::BufReader::new(file));
        self.expand_reader(gz, destination, archive)
    }

    fn expand_reader(&self, reader: impl Read, destination: &Path, label: &Path) -> Result<u64> {
        fs::create_dir_all(destination)
            .io_context(|| format!("Failed to create directory {}", destination.display()))?;

        let mut archive = tar::Archive::new(reader);
        let entries = archive
            .entries()
            .io_context(|| format!("Failed to read tar file {}", label.display()))?;

        let mut dirs: Vec<(PathBuf, u32)> = Vec::new();
        let mut count = 0usize;
        let mut total = 0u64;

        for entry in entries {
            let mut entry =
                entry.io_context(|| format!("Failed to read tar file {}", label.display()))?;
            let header = entry.header();
            let entry_type = header.entry_type();
            if entry_type.is_pax_global_extensions() || entry_type.is_pax_local_extensions() {
                continue;
            }

            count += 1;
            if let Some(limit) = self.files_limit {
                if count > limit {
                    return Err(GatherError::TarTooManyFiles(limit));
                }
            }

            let entry_path = entry
                .path()
                .io_context(|| format!("Invalid entry path in {}", label.display()))?
                .into_owned();
            let relative = contained_path(&entry_path)?;
            let path = destination.join(&relative);

            total += entry.size();
            if let Some(limit) = self.size_limit {
                if total > limit {
                    return Err(GatherError::TarTooLarge(limit, total));
                }
            }

            let mode = entry.header().mode().unwrap_or(0o755);
            if entry_type.is_dir() {
                fs::create_dir_all(&path)
                    .io_context(|| format!("Failed to create directory {}", path.display()))?;
                dirs.push((path, mode));
            } else if entry_type.is_file() {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).io_context(|| {
                        format!("Failed to create directory {}", parent.display())
                    })?;
                }
                entry
                    .unpack(&path)
                    .io_context(|| format!("Failed to extract {}", path.display()))?;
            } else {
                tracing::debug!(
                    "Skipping {:?} entry {} in {}",
                    entry_type,
                    entry_path.display(),
                    label.display()
                );
            }
        }

        if count == 0 {
            return Err(GatherError::TarEmpty(label.to_owned()));
        }

        // Restore directory modes last, so read-only directories don't block
        // the files inside them.
        for (path, mode) in dirs {
            set_mode(&path, mode)?;
        }

        tracing::debug!(
            "Expanded {count} entries ({total} bytes) from {} into {}",
            label.display(),
            destination.display()
        );
        Ok(total)
    }
}

/// Rejects absolute paths and `..` components, returning the path relative
/// to the destination.
fn contained_path(path: &Path) -> Result<PathBuf> {
    relative_path(path).ok_or_else(|| GatherError::TarEscape(path.display().to_string()))
}

/// `path` with `.` components dropped, or `None` if joining it onto a
/// directory could land outside that directory.
pub(crate) fn relative_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .io_context(|| format!("Failed to change directory permissions {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
