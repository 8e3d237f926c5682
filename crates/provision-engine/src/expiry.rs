//! Node expiry
//!
//! Nodes that stop checking in are forgotten after `node_expire_timeout`
//! seconds. The controller binary runs [`sweep_expired_nodes`] on a timer.

use provision_model::Node;
use tracing::{debug, info};

use crate::data::Data;
use crate::error::EngineError;

/// True when the node's last checkin is more than `timeout` seconds before `now`
pub fn is_expired(node: &Node, now: i64, timeout: i64) -> bool {
    now - node.timestamp > timeout
}

/// Removes expired nodes and returns their uuids
pub async fn sweep_expired_nodes(data: &Data, now: i64, timeout: i64) -> Result<Vec<String>, EngineError> {
    data.ensure_connected().await?;
    let mut removed = Vec::new();
    for node in data.fetch_all::<Node>().await? {
        if !is_expired(&node, now, timeout) {
            continue;
        }
        if data.remove::<Node>(&node.uuid).await? {
            info!(
                "Removed node {} (hw_id: {:?}), last seen {}s ago",
                node.uuid,
                node.hw_id,
                now - node.timestamp
            );
            removed.push(node.uuid);
        }
    }
    debug!("Expiry sweep removed {} node(s)", removed.len());
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::memory_data;

    fn node_seen_at(ts: i64) -> Node {
        let mut node = Node::new(vec![format!("AA{ts}")]);
        node.timestamp = ts;
        node
    }

    #[test]
    fn test_is_expired_boundary() {
        let node = node_seen_at(1_000);
        assert!(!is_expired(&node, 1_300, 300));
        assert!(is_expired(&node, 1_301, 300));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_nodes() {
        let data = memory_data();
        let mut stale = node_seen_at(100);
        let mut fresh = node_seen_at(900);
        data.persist(&mut stale).await.unwrap();
        data.persist(&mut fresh).await.unwrap();

        let removed = sweep_expired_nodes(&data, 1_000, 300).await.unwrap();
        assert_eq!(removed, vec![stale.uuid.clone()]);
        let left = data.fetch_all::<Node>().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].uuid, fresh.uuid);
    }
}
