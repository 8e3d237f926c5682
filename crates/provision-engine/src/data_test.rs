#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use object_store::{MemoryStore, ObjectStoreTrait, PersistController};
    use provision_model::{Node, Registry, TagRule};

    use crate::data::Data;
    use crate::error::EngineError;

    fn data_with(store: Arc<MemoryStore>) -> Data {
        let store: Arc<dyn ObjectStoreTrait> = store;
        Data::new(PersistController::new(store), Registry::standard())
    }

    #[tokio::test]
    async fn test_persist_bumps_version_and_round_trips() {
        let store = Arc::new(MemoryStore::new());
        store.connect().await.unwrap();
        let data = data_with(store);

        let mut node = Node::new(vec!["AA:BB".to_string()]);
        data.persist(&mut node).await.unwrap();
        assert_eq!(node.version, 1);
        data.persist(&mut node).await.unwrap();
        assert_eq!(node.version, 2);

        let back: Node = data.get(&node.uuid).await.unwrap();
        assert_eq!(back, node);
        assert_eq!(data.fetch_all::<Node>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let store = Arc::new(MemoryStore::new());
        store.connect().await.unwrap();
        let data = data_with(store);

        let mut rule = TagRule::new("web", "web");
        data.persist(&mut rule).await.unwrap();
        let mut stale = rule.clone();
        data.persist(&mut rule).await.unwrap();

        let err = data.persist(&mut stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn test_get_missing_is_invalid_uuid() {
        let store = Arc::new(MemoryStore::new());
        store.connect().await.unwrap();
        let data = data_with(store);
        assert!(matches!(
            data.get::<Node>("nope").await,
            Err(EngineError::InvalidUuid(_))
        ));
        assert!(data.fetch::<Node>("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_no_connection() {
        let store = Arc::new(MemoryStore::new());
        store.set_reachable(false);
        let data = data_with(store);
        let err = data.ensure_connected().await.unwrap_err();
        assert_eq!(err.kind(), "no_connection");
    }
}
