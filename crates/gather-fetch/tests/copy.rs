use std::fs;
use std::path::Path;

use gather_fetch::{copy_directory, CancellationToken, GatherError, Metadata, Result};
use pretty_assertions::assert_eq;

fn populate(root: &Path, dirs: usize, files_per_dir: usize) -> u64 {
    let mut total = 0;
    for d in 0..dirs {
        let dir = root.join(format!("dir-{d}")).join("nested");
        fs::create_dir_all(&dir).unwrap();
        for f in 0..files_per_dir {
            let body = format!("dir {d} file {f}\n").repeat(f + 1);
            total += body.len() as u64;
            fs::write(dir.join(format!("file-{f}.txt")), body).unwrap();
        }
    }
    fs::create_dir_all(root.join("empty")).unwrap();
    fs::write(root.join("top.txt"), "top").unwrap();
    total + 3
}

fn assert_same_tree(source: &Path, dest: &Path) {
    for entry in walkdir::WalkDir::new(source) {
        let entry = entry.unwrap();
        let relative = entry.path().strip_prefix(source).unwrap();
        let copied = dest.join(relative);
        if entry.file_type().is_dir() {
            assert!(copied.is_dir(), "missing directory {}", copied.display());
        } else {
            assert_eq!(
                fs::read(entry.path()).unwrap(),
                fs::read(&copied).unwrap(),
                "content mismatch for {}",
                relative.display()
            );
        }
    }
}

#[async_std::test]
async fn copies_trees_at_any_concurrency() -> Result<()> {
    for concurrency in [1, 3, 10, 64] {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        let dest = tmp.path().join("dest");
        let expected = populate(&source, 5, 8);

        let meta = copy_directory(&CancellationToken::new(), &source, &dest, concurrency).await?;
        assert_same_tree(&source, &dest);
        match meta {
            Metadata::Directory(dir) => {
                assert_eq!(dir.size, expected);
                assert_eq!(dir.path, dest);
            }
            other => panic!("expected directory metadata, got {other:?}"),
        }
    }
    Ok(())
}

#[async_std::test]
async fn zero_concurrency_still_copies() -> Result<()> {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    populate(&source, 1, 2);
    copy_directory(&CancellationToken::new(), &source, &dest, 0).await?;
    assert_same_tree(&source, &dest);
    Ok(())
}

#[async_std::test]
async fn copy_failure_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    populate(&source, 2, 2);
    // A directory where a file should go can't be opened for writing.
    fs::create_dir_all(dest.join("top.txt")).unwrap();

    let err = copy_directory(&CancellationToken::new(), &source, &dest, 4)
        .await
        .unwrap_err();
    assert!(matches!(err, GatherError::CopyDirectory(_)));
    assert!(err.to_string().starts_with("failed to copy directory: "));
    // Siblings are still copied.
    assert_eq!(
        fs::read_to_string(dest.join("dir-0/nested/file-0.txt")).unwrap(),
        "dir 0 file 0\n"
    );
}

#[async_std::test]
async fn cancelled_copy_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    populate(&source, 2, 2);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = copy_directory(&cancel, &source, &dest, 4)
        .await
        .unwrap_err();
    match err {
        GatherError::CopyDirectory(inner) => assert!(matches!(*inner, GatherError::Cancelled)),
        other => panic!("expected a copy error, got {other:?}"),
    }
    assert!(!dest.join("top.txt").exists());
}

#[async_std::test]
async fn missing_source_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let err = copy_directory(
        &CancellationToken::new(),
        &tmp.path().join("nope"),
        &tmp.path().join("dest"),
        2,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatherError::CopyDirectory(_)));
}

#[async_std::test]
async fn mirrors_empty_and_deep_directories() -> Result<()> {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let deep = source.join("a/b/c/d/e");
    fs::create_dir_all(&deep).unwrap();
    fs::create_dir_all(source.join("empty")).unwrap();
    fs::write(deep.join("leaf.rego"), "package leaf").unwrap();
    fs::write(source.join("root.rego"), "package root").unwrap();
    let dest = tmp.path().join("dest");

    let meta = copy_directory(&CancellationToken::new(), &source, &dest, 2).await?;
    assert!(dest.join("empty").is_dir());
    assert_eq!(
        fs::read_to_string(dest.join("a/b/c/d/e/leaf.rego")).unwrap(),
        "package leaf"
    );
    match meta {
        Metadata::Directory(dir) => assert_eq!(dir.size, 24),
        other => panic!("expected directory metadata, got {other:?}"),
    }
    Ok(())
}
