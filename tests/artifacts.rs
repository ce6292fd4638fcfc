use std::path::Path;

use tracking_server::artifacts::{ArtifactRepository, LocalArtifactRepository};
use tracking_server::error::TrackingError;

async fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, contents).await.unwrap();
}

#[tokio::test]
async fn test_put_file_and_list() {
    let root = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let repo = LocalArtifactRepository::new(root.path());

    let model = source.path().join("model.txt");
    write_file(&model, "weights").await;

    repo.put(&model, None).await.unwrap();
    repo.put(&model, Some("checkpoints/epoch1")).await.unwrap();

    let files = repo.list(None).await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path, "checkpoints");
    assert!(files[0].is_dir);
    assert_eq!(files[0].file_size, None);
    assert_eq!(files[1].path, "model.txt");
    assert!(!files[1].is_dir);
    assert_eq!(files[1].file_size, Some(7));

    let nested = repo.list(Some("checkpoints/epoch1")).await.unwrap();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].path, "checkpoints/epoch1/model.txt");
}

#[tokio::test]
async fn test_put_directory_copies_tree() {
    let root = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let repo = LocalArtifactRepository::new(root.path());

    write_file(&source.path().join("a.txt"), "a").await;
    write_file(&source.path().join("sub/b.txt"), "bb").await;

    repo.put(source.path(), Some("data")).await.unwrap();

    let files = repo.list(Some("data")).await.unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["data/a.txt", "data/sub"]);

    let sub = repo.list(Some("data/sub")).await.unwrap();
    assert_eq!(sub[0].path, "data/sub/b.txt");
    assert_eq!(sub[0].file_size, Some(2));
}

#[tokio::test]
async fn test_list_missing_directory_is_empty() {
    let root = tempfile::tempdir().unwrap();
    let repo = LocalArtifactRepository::new(root.path().join("never-created"));

    assert!(repo.list(None).await.unwrap().is_empty());
    assert!(repo.list(Some("nested/path")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_paths_escaping_root_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let repo = LocalArtifactRepository::new(root.path());

    let file = source.path().join("f.txt");
    write_file(&file, "x").await;

    let err = repo.put(&file, Some("../outside")).await.unwrap_err();
    assert!(matches!(err, TrackingError::InvalidParameter(_)));

    let err = repo.list(Some("../")).await.unwrap_err();
    assert!(matches!(err, TrackingError::InvalidParameter(_)));

    let err = repo
        .put(&source.path().join("missing.txt"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::InvalidParameter(_)));
}
