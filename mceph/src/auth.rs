//! Auth-entity reconciliation via `ceph auth` commands.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::AuditLog;
use crate::client::{ClusterClient, NotFoundMatcher};
use crate::reconcile::{Reconcile, ReconcileError, Result};

/// Error marker the control plane emits for an unknown auth entity.
const ENTITY_NOT_FOUND: NotFoundMatcher = NotFoundMatcher::new(&["entity does not exist"]);

/// Desired auth entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpec {
    /// Entity name in `<type>.<id>` form, e.g. `client.backup`.
    pub name: String,

    /// Capability string per daemon type, e.g. `mon` -> `allow r`.
    pub caps: BTreeMap<String, String>,
}

/// Auth entity state as last read from the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub name: String,
    pub caps: BTreeMap<String, String>,

    /// Secret issued by the cluster when the entity was created. Read back
    /// once at creation and carried forward; never re-derived.
    #[serde(default)]
    pub key: Option<String>,
}

/// Flatten the capability map into `<daemon> <cap>` argument pairs.
fn caps_args(caps: &BTreeMap<String, String>) -> String {
    caps.iter()
        .flat_map(|(daemon, cap)| [daemon.as_str(), cap.as_str()])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scan command output for the `key =` line and return its right-hand side.
///
/// Only the first `=` splits the line; secrets are base64 and may end in
/// `=` padding.
fn extract_key(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        if !line.contains("key =") {
            return None;
        }
        let (_, value) = line.split_once('=')?;
        Some(value.trim().to_string())
    })
}

/// Reconciles auth entities.
pub struct AuthReconciler {
    client: Arc<ClusterClient>,
    audit: Arc<AuditLog>,
}

impl AuthReconciler {
    pub fn new(client: Arc<ClusterClient>, audit: Arc<AuditLog>) -> Self {
        Self { client, audit }
    }
}

impl Reconcile for AuthReconciler {
    type Spec = EntitySpec;
    type State = EntityState;

    async fn create(&self, spec: &EntitySpec) -> Result<EntityState> {
        // The full capability set goes into one invocation; the control
        // plane does not support partial grants.
        let cmd = format!(
            "ceph auth get-or-create {} {}",
            spec.name,
            caps_args(&spec.caps)
        );
        let output = self
            .client
            .execute(&cmd)
            .await
            .map_err(|source| ReconcileError::Create {
                kind: "auth entity",
                name: spec.name.clone(),
                source,
            })?;

        let key = extract_key(&output);

        info!(entity = %spec.name, "Created auth entity");
        self.audit.entity_created(&spec.name);

        Ok(EntityState {
            name: spec.name.clone(),
            caps: spec.caps.clone(),
            key,
        })
    }

    async fn observe(&self, prior: &EntityState) -> Result<Option<EntityState>> {
        let cmd = format!("ceph auth get {}", prior.name);
        let output = match self.client.execute(&cmd).await {
            Ok(output) => output,
            Err(err) if ENTITY_NOT_FOUND.matches(&err) => return Ok(None),
            Err(source) => {
                return Err(ReconcileError::Observe {
                    kind: "auth entity",
                    name: prior.name.clone(),
                    source,
                });
            }
        };

        // A zero exit whose listing does not mention the entity also
        // counts as absent.
        if !output.contains(&prior.name) {
            return Ok(None);
        }

        // Existence check only: capabilities and the secret are carried
        // forward, never re-derived from the listing.
        Ok(Some(prior.clone()))
    }

    async fn update(&self, spec: &EntitySpec, prior: &EntityState) -> Result<EntityState> {
        if spec.caps != prior.caps {
            // Capability grants replace the full set; there is no
            // incremental form.
            let cmd = format!("ceph auth caps {} {}", spec.name, caps_args(&spec.caps));
            self.client
                .execute(&cmd)
                .await
                .map_err(|source| ReconcileError::Update {
                    kind: "auth entity",
                    name: spec.name.clone(),
                    source,
                })?;

            info!(entity = %spec.name, "Replaced auth entity capabilities");
            self.audit.entity_updated(&spec.name);
        }

        Ok(EntityState {
            name: spec.name.clone(),
            caps: spec.caps.clone(),
            key: prior.key.clone(),
        })
    }

    async fn delete(&self, prior: &EntityState) -> Result<()> {
        let cmd = format!("ceph auth del {}", prior.name);
        self.client
            .execute(&cmd)
            .await
            .map_err(|source| ReconcileError::Delete {
                kind: "auth entity",
                name: prior.name.clone(),
                source,
            })?;

        info!(entity = %prior.name, "Deleted auth entity");
        self.audit.entity_deleted(&prior.name);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_args_flattens_in_map_order() {
        let caps = BTreeMap::from([
            ("osd".to_string(), "allow rw pool=rbd".to_string()),
            ("mon".to_string(), "allow r".to_string()),
        ]);
        assert_eq!(caps_args(&caps), "mon allow r osd allow rw pool=rbd");
    }

    #[test]
    fn extract_key_takes_first_equals_rhs() {
        let output = "[client.backup]\n\tkey = AQDLqFNkAAAAABAA5ZZkx2Q0T1hJdA==\n";
        assert_eq!(
            extract_key(output),
            Some("AQDLqFNkAAAAABAA5ZZkx2Q0T1hJdA==".to_string())
        );
    }

    #[test]
    fn extract_key_absent_marker() {
        assert_eq!(extract_key("[client.backup]\n\tcaps mon = \"allow r\"\n"), None);
    }
}
