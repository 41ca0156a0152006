use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_process::{Command, Stdio};
use async_trait::async_trait;
use gather_locator::{Classifier, GitLocator};
use gather_metadata::{GitMetadata, Metadata};
use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{GatherError, Result};
use crate::expand::relative_path;
use crate::fetch::{cancellable, copy_directory, Gatherer, DEFAULT_CONCURRENCY};
use crate::saver::{destination_protocol, saver_for};

/// Credentials for cloning over SSH through a running agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshAgentAuth {
    /// User to connect as when the clone URL doesn't name one.
    pub user: String,
    /// The agent's socket, exported to git as `SSH_AUTH_SOCK`.
    pub socket: PathBuf,
}

/// Source of SSH credentials for `ssh://` clones.
pub trait SshAuthenticator: std::fmt::Debug + Send + Sync {
    fn ssh_agent_auth(&self, user: &str) -> Result<SshAgentAuth>;
}

/// Uses whatever agent `$SSH_AUTH_SOCK` points at.
#[derive(Debug, Default, Clone, Copy)]
pub struct AgentAuthenticator;

impl SshAuthenticator for AgentAuthenticator {
    fn ssh_agent_auth(&self, user: &str) -> Result<SshAgentAuth> {
        match std::env::var_os("SSH_AUTH_SOCK") {
            Some(socket) if !socket.is_empty() => Ok(SshAgentAuth {
                user: user.into(),
                socket: socket.into(),
            }),
            _ => Err(GatherError::SshAuth(
                "SSH_AUTH_SOCK is not set, no ssh-agent available".into(),
            )),
        }
    }
}

/// Clones git repositories with the system `git`.
#[derive(Debug)]
pub struct GitGatherer {
    classifier: Classifier,
    auth: Arc<dyn SshAuthenticator>,
    git: OnceCell<PathBuf>,
    concurrency: usize,
}

impl Default for GitGatherer {
    fn default() -> Self {
        Self::new(
            Classifier::default(),
            Arc::new(AgentAuthenticator),
            DEFAULT_CONCURRENCY,
        )
    }
}

impl GitGatherer {
    pub fn new(
        classifier: Classifier,
        auth: Arc<dyn SshAuthenticator>,
        concurrency: usize,
    ) -> Self {
        Self {
            classifier,
            auth,
            git: OnceCell::new(),
            concurrency,
        }
    }

    fn command(&self, auth: Option<&SshAgentAuth>) -> Result<Command> {
        let git = self
            .git
            .get_or_try_init(|| which::which("git").map_err(GatherError::WhichGit))?;
        let mut cmd = Command::new(git);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);
        if let Some(auth) = auth {
            cmd.env("SSH_AUTH_SOCK", &auth.socket)
                .env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
        }
        Ok(cmd)
    }

    async fn clone_into(
        &self,
        cancel: &CancellationToken,
        locator: &GitLocator,
        auth: Option<&SshAgentAuth>,
        dir: &Path,
    ) -> Result<()> {
        let depth = locator.depth().map_err(GatherError::ProcessUrl)?;
        let commit = is_commit_hash(&locator.git_ref);
        let repo = clone_url(locator, auth);

        let mut clone = self.command(auth)?;
        clone.arg("clone").arg("--quiet");
        if !locator.git_ref.is_empty() && !commit {
            clone.arg("--branch").arg(&locator.git_ref);
        }
        match depth {
            Some(depth) if !commit => {
                clone.arg("--depth").arg(depth.to_string());
            }
            Some(_) => {
                tracing::debug!(
                    "Ignoring depth for {repo}: commit {} needs the full history",
                    locator.git_ref
                );
            }
            None => {}
        }
        clone.arg(&repo).arg(dir);

        tracing::debug!("Cloning {repo} into {}", dir.display());
        let status = cancellable(cancel, async {
            clone.status().await.map_err(GatherError::GitIoError)
        })
        .await?;
        if !status.success() {
            return Err(GatherError::GitCloneError(repo));
        }

        if commit {
            let mut checkout = self.command(auth)?;
            checkout
                .arg("checkout")
                .arg("--quiet")
                .arg(&locator.git_ref)
                .current_dir(dir);
            let status = cancellable(cancel, async {
                checkout.status().await.map_err(GatherError::GitIoError)
            })
            .await?;
            if !status.success() {
                return Err(GatherError::GitCheckoutError(
                    repo,
                    locator.git_ref.clone(),
                ));
            }
        }
        Ok(())
    }

    async fn head_commit(&self, dir: &Path) -> Result<String> {
        let output = self
            .command(None)?
            .arg("rev-parse")
            .arg("HEAD")
            .current_dir(dir)
            .stdout(Stdio::piped())
            .output()
            .await
            .map_err(GatherError::GitIoError)?;
        let commit = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if !output.status.success() || commit.is_empty() {
            return Err(GatherError::GitHeadError(dir.display().to_string()));
        }
        Ok(commit)
    }
}

#[async_trait]
impl Gatherer for GitGatherer {
    async fn gather(
        &self,
        cancel: &CancellationToken,
        source: &str,
        destination: &Path,
    ) -> Result<Metadata> {
        let locator = self
            .classifier
            .process_git_url(source)
            .map_err(GatherError::ProcessUrl)?;
        let auth = if locator.is_ssh() {
            Some(self.auth.ssh_agent_auth("git")?)
        } else {
            None
        };
        let destination = PathBuf::from(
            self.classifier
                .expand_tilde(&destination.to_string_lossy()),
        );

        let latest_commit = if locator.subdirectory.is_empty() {
            self.clone_into(cancel, &locator, auth.as_ref(), &destination)
                .await?;
            self.head_commit(&destination).await?
        } else {
            let tmp = tempfile::tempdir().map_err(GatherError::GitIoError)?;
            let repo = tmp.path().join("repo");
            self.clone_into(cancel, &locator, auth.as_ref(), &repo)
                .await?;
            let commit = self.head_commit(&repo).await?;

            let subdir = match relative_path(Path::new(&locator.subdirectory)) {
                Some(relative) => repo.join(relative),
                None => {
                    return Err(GatherError::MissingRepositoryPath(
                        locator.subdirectory.clone(),
                    ))
                }
            };
            match async_std::fs::metadata(&subdir).await {
                Ok(meta) if meta.is_dir() => {
                    copy_directory(cancel, &subdir, &destination, self.concurrency).await?;
                }
                Ok(_) => {
                    let name = subdir.file_name().unwrap_or_default();
                    let target = destination.join(name);
                    let mut file = async_std::fs::File::open(&subdir)
                        .await
                        .map_err(GatherError::GitIoError)?;
                    saver_for(destination_protocol(&target))?
                        .save(cancel, &mut file, &target)
                        .await?;
                }
                Err(_) => {
                    return Err(GatherError::MissingRepositoryPath(
                        locator.subdirectory.clone(),
                    ))
                }
            }
            commit
        };

        tracing::debug!("Checked out {} at {latest_commit}", locator.clone_url);
        Ok(GitMetadata { latest_commit }.into())
    }
}

/// Full SHA-1 or SHA-256 object names can't be passed to `--branch`, so
/// they get checked out after a full clone instead.
fn is_commit_hash(git_ref: &str) -> bool {
    matches!(git_ref.len(), 40 | 64) && git_ref.chars().all(|c| c.is_ascii_hexdigit())
}

/// The URL handed to `git clone`. SSH URLs without a user get the agent's.
fn clone_url(locator: &GitLocator, auth: Option<&SshAgentAuth>) -> String {
    if let Some(auth) = auth {
        if let Ok(mut url) = Url::parse(&locator.clone_url) {
            if url.username().is_empty() && url.set_username(&auth.user).is_ok() {
                return url.to_string();
            }
        }
    }
    locator.clone_url.clone()
}
