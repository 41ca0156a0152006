use gather_locator::{process_git_url, GitLocator, LocatorError};
use pretty_assertions::assert_eq;

type Result<T> = std::result::Result<T, LocatorError>;

#[test]
fn explicit_prefix_with_subdir_in_ref() -> Result<()> {
    let loc = process_git_url("git::https://example.com/org/repo.git?ref=main//sub")?;
    assert_eq!(
        loc,
        GitLocator {
            clone_url: "https://example.com/org/repo.git".into(),
            git_ref: "main".into(),
            subdirectory: "sub".into(),
            depth: "".into(),
        }
    );
    Ok(())
}

#[test]
fn scp_style_becomes_ssh() -> Result<()> {
    let loc = process_git_url("git@example.com:org/repo")?;
    assert_eq!(loc.clone_url, "ssh://git@example.com/org/repo.git");
    assert!(loc.is_ssh());
    assert_eq!(loc.git_ref, "");
    assert_eq!(loc.subdirectory, "");
    assert_eq!(loc.depth, "");
    Ok(())
}

#[test]
fn scp_style_with_prefix() -> Result<()> {
    let loc = process_git_url("git::git@github.com:user/repo.git")?;
    assert_eq!(loc.clone_url, "ssh://git@github.com/user/repo.git");
    Ok(())
}

#[test]
fn git_plus_ssh() -> Result<()> {
    let loc = process_git_url("git::git+ssh://git@github.com/user/repo.git?ref=v1")?;
    assert_eq!(loc.clone_url, "ssh://git@github.com/user/repo.git");
    assert_eq!(loc.git_ref, "v1");
    Ok(())
}

#[test]
fn bare_host_shorthand_gets_https() -> Result<()> {
    let loc = process_git_url("github.com/org/repo")?;
    assert_eq!(loc.clone_url, "https://github.com/org/repo.git");
    assert!(!loc.is_ssh());

    let loc = process_git_url("git::github.com/org/repo")?;
    assert_eq!(loc.clone_url, "https://github.com/org/repo.git");
    Ok(())
}

#[test]
fn subdirectory_in_path() -> Result<()> {
    let loc = process_git_url("github.com/org/repo//policy/lib?ref=v1.2.0")?;
    assert_eq!(
        loc,
        GitLocator {
            clone_url: "https://github.com/org/repo.git".into(),
            git_ref: "v1.2.0".into(),
            subdirectory: "policy/lib".into(),
            depth: "".into(),
        }
    );
    Ok(())
}

#[test]
fn path_subdirectory_wins_over_query() -> Result<()> {
    let loc =
        process_git_url("https://example.com/org/repo.git//from-path?ref=main//from-query")?;
    assert_eq!(loc.git_ref, "main");
    assert_eq!(loc.subdirectory, "from-path");
    assert_eq!(loc.clone_url, "https://example.com/org/repo.git");
    Ok(())
}

#[test]
fn depth_and_ref() -> Result<()> {
    let loc = process_git_url("git::https://github.com/org/repo.git?depth=1&ref=main")?;
    assert_eq!(loc.depth, "1");
    assert_eq!(loc.depth()?, Some(1));
    assert_eq!(loc.git_ref, "main");
    assert_eq!(loc.clone_url, "https://github.com/org/repo.git");
    Ok(())
}

#[test]
fn subdirectory_in_depth() -> Result<()> {
    let loc = process_git_url("git::https://github.com/org/repo.git?depth=1//policy")?;
    assert_eq!(loc.depth, "1");
    assert_eq!(loc.subdirectory, "policy");
    Ok(())
}

#[test]
fn unrelated_query_parameters_are_kept() -> Result<()> {
    let loc = process_git_url("git::https://github.com/org/repo?ref=main&foo=bar")?;
    assert_eq!(loc.clone_url, "https://github.com/org/repo.git?foo=bar");
    assert_eq!(loc.git_ref, "main");
    Ok(())
}

#[test]
fn bad_depth_is_reported_on_access() -> Result<()> {
    let loc = process_git_url("https://github.com/git-fixtures/basic.git?depth=squiggle")?;
    assert_eq!(loc.depth, "squiggle");
    assert!(matches!(loc.depth(), Err(LocatorError::InvalidDepth(..))));
    Ok(())
}

#[test]
fn local_repository_path() -> Result<()> {
    let loc = process_git_url("/srv/repos/policy.git")?;
    assert_eq!(loc.clone_url, "file:///srv/repos/policy.git");

    let loc = process_git_url("file:///srv/repos/policy.git?ref=main")?;
    assert_eq!(loc.clone_url, "file:///srv/repos/policy.git");
    assert_eq!(loc.git_ref, "main");
    Ok(())
}

#[test]
fn idempotent_on_clone_url() -> Result<()> {
    for raw in [
        "git::https://example.com/org/repo.git?ref=main//sub",
        "git@example.com:org/repo",
        "github.com/org/repo//policy",
        "git::git@github.com:user/repo.git",
    ] {
        let first = process_git_url(raw)?;
        let second = process_git_url(&first.clone_url)?;
        assert_eq!(second.clone_url, first.clone_url, "{raw}");
        assert_eq!(second.git_ref, "");
        assert_eq!(second.subdirectory, "");
        assert_eq!(second.depth, "");
    }
    Ok(())
}

#[test]
fn from_str() -> Result<()> {
    let loc: GitLocator = "github.com/org/repo?ref=main".parse()?;
    assert_eq!(loc.clone_url, "https://github.com/org/repo.git");
    assert_eq!(loc.git_ref, "main");
    Ok(())
}

#[test]
fn classification_errors_are_wrapped() {
    let err = process_git_url("basic.git").unwrap_err();
    assert!(matches!(err, LocatorError::Classify(_)));
    assert_eq!(
        err.to_string(),
        "failed to classify URI: got basic.git. HTTP(S) URIs require a scheme (http:// or https://)"
    );
}

#[test]
fn display_round_trips() -> Result<()> {
    let loc = process_git_url("github.com/org/repo//policy/lib?ref=v1.2.0&depth=1")?;
    let rendered = loc.to_string();
    assert_eq!(
        rendered,
        "git::https://github.com/org/repo.git//policy/lib?ref=v1.2.0&depth=1"
    );
    assert_eq!(process_git_url(&rendered)?, loc);
    Ok(())
}
