use remote_images::cache::{AssociationCache, FieldValue, FileCacheStore};
use std::sync::Arc;
use tempfile::TempDir;

fn file_cache(dir: &std::path::Path) -> AssociationCache {
    AssociationCache::new(Arc::new(FileCacheStore::new(dir)))
}

#[tokio::test]
async fn test_entries_survive_reopening() {
    let temp = TempDir::new().unwrap();

    let cache = file_cache(temp.path());
    cache.record_artifacts("n1", "localImage", FieldValue::One("a1".to_string())).await.unwrap();
    drop(cache);

    let reopened = file_cache(temp.path());
    let fields = reopened.lookup_artifacts("n1").await.unwrap().unwrap();
    assert_eq!(fields["localImage"], FieldValue::One("a1".to_string()));
    assert!(reopened.lookup_artifacts("n2").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_handles_do_not_lose_fields() {
    let temp = TempDir::new().unwrap();
    let first = file_cache(temp.path());
    let second = file_cache(temp.path());

    // Two handles share only the directory, so the file lock is what
    // serializes their read-merge-write cycles.
    let writes = (0..16).map(|i| {
        let cache = if i % 2 == 0 { first.clone() } else { second.clone() };
        tokio::spawn(async move {
            cache
                .record_artifacts("n1", &format!("field{i}"), FieldValue::Many(vec![format!("a{i}")]))
                .await
        })
    });
    for result in futures::future::join_all(writes).await {
        result.unwrap().unwrap();
    }

    let fields = file_cache(temp.path()).lookup_artifacts("n1").await.unwrap().unwrap();
    assert_eq!(fields.len(), 16);
    assert_eq!(fields["field7"], FieldValue::Many(vec!["a7".to_string()]));
}

#[tokio::test]
async fn test_owner_ids_with_path_characters() {
    let temp = TempDir::new().unwrap();
    let cache = file_cache(temp.path());

    cache.record_artifacts("../n/1", "localImage", FieldValue::One("a".to_string())).await.unwrap();
    cache.record_artifacts("n 1", "localImage", FieldValue::One("b".to_string())).await.unwrap();

    let traversal = cache.lookup_artifacts("../n/1").await.unwrap().unwrap();
    let spaced = cache.lookup_artifacts("n 1").await.unwrap().unwrap();
    assert_eq!(traversal["localImage"], FieldValue::One("a".to_string()));
    assert_eq!(spaced["localImage"], FieldValue::One("b".to_string()));
    assert_eq!(temp.path().join("entries").read_dir().unwrap().count(), 2);
}
