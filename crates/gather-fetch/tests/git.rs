use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use gather_fetch::{CancellationToken, Gather, GatherError, GatherOpts, Metadata, Result};
use pretty_assertions::assert_eq;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Could not run git");
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8(output.stdout).unwrap().trim().to_owned()
}

/// A repository with two commits: `v1` and the current `main`.
struct Fixture {
    _dir: tempfile::TempDir,
    repo: PathBuf,
    first: String,
    head: String,
}

fn setup_git_repo() -> Option<Fixture> {
    if which::which("git").is_err() {
        eprintln!("git not found, skipping");
        return None;
    }
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("policy.git");
    fs::create_dir_all(repo.join("lib")).unwrap();

    git(&repo, &["init", "--initial-branch", "main"]);
    git(&repo, &["config", "user.name", "Gather Tester"]);
    git(&repo, &["config", "user.email", "gather.tester@example.com"]);

    fs::write(repo.join("main.rego"), "package main # v1\n").unwrap();
    fs::write(repo.join("lib/util.rego"), "package lib\n").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "First version", "--no-gpg-sign"]);
    git(&repo, &["tag", "--no-sign", "v1"]);
    let first = git(&repo, &["rev-parse", "HEAD"]);

    fs::write(repo.join("main.rego"), "package main # v2\n").unwrap();
    git(&repo, &["commit", "-a", "-m", "Second version", "--no-gpg-sign"]);
    let head = git(&repo, &["rev-parse", "HEAD"]);

    Some(Fixture {
        _dir: dir,
        repo,
        first,
        head,
    })
}

fn gather() -> Gather {
    GatherOpts::new().concurrency(2).build().unwrap()
}

fn locator(fixture: &Fixture, suffix: &str) -> String {
    format!("git::file://{}{suffix}", fixture.repo.display())
}

#[async_std::test]
async fn clones_default_branch() -> Result<()> {
    let Some(fixture) = setup_git_repo() else {
        return Ok(());
    };
    let dest = tempfile::tempdir().unwrap();
    let out = dest.path().join("checkout");
    let source = locator(&fixture, "");
    let meta = gather()
        .gather(&CancellationToken::new(), &source, &out)
        .await?;

    assert_eq!(meta, Metadata::Git(gather_metadata::GitMetadata {
        latest_commit: fixture.head.clone(),
    }));
    assert_eq!(
        fs::read_to_string(out.join("main.rego")).unwrap(),
        "package main # v2\n"
    );
    let pinned = meta.pinned_url(&source).unwrap();
    assert!(pinned.starts_with("git::file://"), "{pinned}");
    assert!(pinned.ends_with(&format!("?ref={}", fixture.head)), "{pinned}");
    Ok(())
}

#[async_std::test]
async fn clones_a_tag_shallowly() -> Result<()> {
    let Some(fixture) = setup_git_repo() else {
        return Ok(());
    };
    let dest = tempfile::tempdir().unwrap();
    let out = dest.path().join("checkout");
    let meta = gather()
        .gather(
            &CancellationToken::new(),
            &locator(&fixture, "?ref=v1&depth=1"),
            &out,
        )
        .await?;
    assert_eq!(meta.latest_commit(), Some(fixture.first.as_str()));
    assert_eq!(
        fs::read_to_string(out.join("main.rego")).unwrap(),
        "package main # v1\n"
    );
    Ok(())
}

#[async_std::test]
async fn checks_out_a_commit() -> Result<()> {
    let Some(fixture) = setup_git_repo() else {
        return Ok(());
    };
    let dest = tempfile::tempdir().unwrap();
    let out = dest.path().join("checkout");
    let meta = gather()
        .gather(
            &CancellationToken::new(),
            &locator(&fixture, &format!("?ref={}", fixture.first)),
            &out,
        )
        .await?;
    assert_eq!(meta.latest_commit(), Some(fixture.first.as_str()));
    assert_eq!(
        fs::read_to_string(out.join("main.rego")).unwrap(),
        "package main # v1\n"
    );
    Ok(())
}

#[async_std::test]
async fn copies_a_subdirectory() -> Result<()> {
    let Some(fixture) = setup_git_repo() else {
        return Ok(());
    };
    let dest = tempfile::tempdir().unwrap();
    let out = dest.path().join("lib-only");
    let meta = gather()
        .gather(&CancellationToken::new(), &locator(&fixture, "//lib"), &out)
        .await?;
    assert_eq!(meta.latest_commit(), Some(fixture.head.as_str()));
    assert_eq!(
        fs::read_to_string(out.join("util.rego")).unwrap(),
        "package lib\n"
    );
    assert!(!out.join("main.rego").exists());
    assert!(!out.join(".git").exists());
    Ok(())
}

#[async_std::test]
async fn missing_subdirectory() {
    let Some(fixture) = setup_git_repo() else {
        return;
    };
    let dest = tempfile::tempdir().unwrap();
    let err = gather()
        .gather(
            &CancellationToken::new(),
            &locator(&fixture, "//nope"),
            dest.path().join("x"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "path nope does not exist in the repository");
}

#[async_std::test]
async fn subdirectory_outside_the_clone_is_refused() {
    let Some(fixture) = setup_git_repo() else {
        return;
    };
    let outside = tempfile::tempdir().unwrap();
    fs::create_dir_all(outside.path().join("keys")).unwrap();
    fs::write(outside.path().join("keys/id_rsa"), "PRIVATE").unwrap();
    let dest = tempfile::tempdir().unwrap();
    let out = dest.path().join("x");

    let absolute = locator(&fixture, &format!("//{}", outside.path().join("keys").display()));
    let err = gather()
        .gather(&CancellationToken::new(), &absolute, &out)
        .await
        .unwrap_err();
    assert!(
        matches!(err, GatherError::MissingRepositoryPath(_)),
        "{err:?}"
    );

    let parent = locator(&fixture, "?ref=main//../../keys");
    let err = gather()
        .gather(&CancellationToken::new(), &parent, &out)
        .await
        .unwrap_err();
    assert!(
        matches!(err, GatherError::MissingRepositoryPath(_)),
        "{err:?}"
    );

    assert!(!out.join("id_rsa").exists());
}

#[async_std::test]
async fn unknown_branch_fails_to_clone() {
    let Some(fixture) = setup_git_repo() else {
        return;
    };
    let dest = tempfile::tempdir().unwrap();
    let err = gather()
        .gather(
            &CancellationToken::new(),
            &locator(&fixture, "?ref=does-not-exist"),
            dest.path().join("x"),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("error cloning repository"));
}
