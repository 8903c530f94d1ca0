//! Read-only cluster health snapshot.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ClusterClient;
use crate::parse;

/// Point-in-time cluster aggregate.
///
/// Not a managed resource: it has no identity and is rebuilt on every
/// query. Each field is populated best-effort and stays at its zero value
/// when the underlying lookup fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Overall health, e.g. `HEALTH_OK`.
    pub health: String,

    /// Object-storage daemon count.
    pub osd_count: u64,

    /// Monitor daemon count.
    pub mon_count: u64,

    /// Manager daemon count.
    pub mgr_count: u64,

    /// Pool count.
    pub pool_count: u64,

    /// When the snapshot was taken, RFC 3339.
    pub sampled_at: String,
}

/// Query cluster health and daemon counts.
///
/// The status document and the pool listing are independent sub-queries;
/// either failing leaves its fields untouched rather than aborting the
/// snapshot.
pub async fn cluster_status(client: &ClusterClient) -> ClusterStatus {
    let mut status = ClusterStatus {
        sampled_at: Utc::now().to_rfc3339(),
        ..ClusterStatus::default()
    };

    if let Ok(output) = client.execute("ceph status --format json").await {
        if let Ok(doc) = serde_json::from_str::<Value>(&output) {
            if let Some(health) =
                parse::json_path(&doc, &["health", "status"]).and_then(Value::as_str)
            {
                status.health = health.to_string();
            }
            status.osd_count = daemon_count(&doc, "osd");
            status.mon_count = daemon_count(&doc, "mon");
            status.mgr_count = daemon_count(&doc, "mgr");
        }
    }

    if let Ok(output) = client.execute("ceph osd pool ls").await {
        status.pool_count = parse::count_lines(&output) as u64;
    }

    status
}

fn daemon_count(doc: &Value, service: &str) -> u64 {
    parse::json_path(doc, &["servicemap", "services", service, "daemons"])
        .and_then(Value::as_object)
        .map(|daemons| daemons.len() as u64)
        .unwrap_or(0)
}
