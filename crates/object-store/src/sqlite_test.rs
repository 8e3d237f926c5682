//! Unit tests for the SQLite backend

#[cfg(test)]
mod tests {
    use crate::{Document, ObjectStoreTrait, SqliteStore, StoreError, document_version};
    use serde_json::json;
    use std::time::Duration;

    async fn connected_store(dir: &tempfile::TempDir) -> SqliteStore {
        let store = SqliteStore::new(dir.path().join("razor.db"), Duration::from_secs(5));
        store.connect().await.unwrap();
        store
    }

    fn doc(label: &str) -> Document {
        let mut document = Document::new();
        document.insert("label".to_string(), json!(label));
        document
    }

    #[tokio::test]
    async fn test_insert_then_compare_and_swap_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected_store(&dir).await;

        let v1 = store.put("policy", "p1", doc("a")).await.unwrap();
        assert_eq!(document_version(&v1), 1);
        let v2 = store.put("policy", "p1", v1.clone()).await.unwrap();
        assert_eq!(document_version(&v2), 2);

        let err = store.put("policy", "p1", v1).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored = store.get_by_uuid("policy", "p1").await.unwrap().unwrap();
        assert_eq!(document_version(&stored), 2);
    }

    #[tokio::test]
    async fn test_second_insert_of_new_uuid_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected_store(&dir).await;

        store.put("node", "n", doc("first")).await.unwrap();
        let err = store.put("node", "n", doc("second")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_get_all_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected_store(&dir).await;

        store.put("tag", "a", doc("a")).await.unwrap();
        store.put("tag", "b", doc("b")).await.unwrap();
        assert_eq!(store.get_all("tag").await.unwrap().len(), 2);
        assert!(store.get_all("model").await.unwrap().is_empty());

        assert!(store.remove("tag", "a").await.unwrap());
        assert!(!store.remove("tag", "a").await.unwrap());
        assert!(store.remove_all("tag").await.unwrap());
        assert!(store.get_all("tag").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_store_reports_no_connection() {
        let dir = tempfile::tempdir().unwrap();
        let store = connected_store(&dir).await;
        store.put("node", "n", doc("x")).await.unwrap();

        store.close().await;
        assert!(!store.is_connected().await);
        let err = store.get_all("node").await.unwrap_err();
        assert!(matches!(err, StoreError::NoConnection(_)));

        store.connect().await.unwrap();
        assert_eq!(store.get_all("node").await.unwrap().len(), 1);
    }
}
