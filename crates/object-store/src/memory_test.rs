//! Unit tests for the in-memory backend

#[cfg(test)]
mod tests {
    use crate::{Document, MemoryStore, ObjectStoreTrait, StoreError, document_version};
    use serde_json::json;

    fn doc(label: &str) -> Document {
        let mut document = Document::new();
        document.insert("label".to_string(), json!(label));
        document
    }

    #[tokio::test]
    async fn test_versions_increase_on_every_write() {
        let store = MemoryStore::new();
        let mut current = doc("first");
        let mut last = 0;
        for i in 0..5 {
            current.insert("label".to_string(), json!(format!("rev-{i}")));
            current = store.put("node", "n1", current).await.unwrap();
            let version = document_version(&current);
            assert!(version > last);
            last = version;
        }
        assert_eq!(last, 5);
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let store = MemoryStore::new();
        let v1 = store.put("policy", "p1", doc("a")).await.unwrap();
        let _v2 = store.put("policy", "p1", v1.clone()).await.unwrap();

        // v1 still carries version 1, the store is at 2
        let err = store.put("policy", "p1", v1).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_get_all_returns_one_document_per_uuid() {
        let store = MemoryStore::new();
        let a = store.put("tag", "a", doc("a")).await.unwrap();
        store.put("tag", "a", a).await.unwrap();
        store.put("tag", "b", doc("b")).await.unwrap();

        let all = store.get_all("tag").await.unwrap();
        assert_eq!(all.len(), 2);
        let a_latest = all.iter().find(|d| d["uuid"] == "a").unwrap();
        assert_eq!(document_version(a_latest), 2);
    }

    #[tokio::test]
    async fn test_remove_and_remove_all() {
        let store = MemoryStore::new();
        store.put("bmc", "x", doc("x")).await.unwrap();
        store.put("bmc", "y", doc("y")).await.unwrap();

        assert!(store.remove("bmc", "x").await.unwrap());
        assert!(!store.remove("bmc", "x").await.unwrap());
        assert!(store.get_by_uuid("bmc", "x").await.unwrap().is_none());

        assert!(store.remove_all("bmc").await.unwrap());
        assert!(store.get_all("bmc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removed_uuid_can_be_recreated_from_version_zero() {
        let store = MemoryStore::new();
        store.put("node", "n", doc("old")).await.unwrap();
        store.remove("node", "n").await.unwrap();
        let again = store.put("node", "n", doc("new")).await.unwrap();
        assert_eq!(document_version(&again), 1);
    }

    #[tokio::test]
    async fn test_multi_put_applies_versioning_per_document() {
        let store = MemoryStore::new();
        let stored = store
            .multi_put(
                "images",
                vec![("i1".to_string(), doc("one")), ("i2".to_string(), doc("two"))],
            )
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|d| document_version(d) == 1));
    }

    #[tokio::test]
    async fn test_disconnected_store_reports_no_connection() {
        let store = MemoryStore::new();
        store.close().await;
        let err = store.get_all("node").await.unwrap_err();
        assert!(matches!(err, StoreError::NoConnection(_)));

        store.connect().await.unwrap();
        assert!(store.get_all("node").await.is_ok());
    }
}
