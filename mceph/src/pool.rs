//! Replication-pool reconciliation via `ceph osd pool` commands.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::AuditLog;
use crate::client::{ClusterClient, NotFoundMatcher};
use crate::parse;
use crate::reconcile::{Reconcile, ReconcileError, Result};

/// Error markers the control plane emits for a pool it does not know.
const POOL_NOT_FOUND: NotFoundMatcher = NotFoundMatcher::new(&["unrecognized pool", "ENOENT"]);

/// Desired pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Pool name (unique key).
    pub name: String,

    /// Placement group count.
    pub pg_num: u32,

    /// Placement group count for placement; defaults to `pg_num`.
    #[serde(default)]
    pub pgp_num: Option<u32>,

    /// Replication size.
    #[serde(default)]
    pub size: Option<u32>,

    /// Minimum replication size.
    #[serde(default)]
    pub min_size: Option<u32>,

    /// Pool type, `replicated` (default) or `erasure`.
    #[serde(default)]
    pub pool_type: Option<String>,

    /// CRUSH rule name.
    #[serde(default)]
    pub crush_rule: Option<String>,
}

/// Pool state as last read from the cluster.
///
/// Same shape as [`PoolSpec`]; fields the read does not return keep their
/// prior values.
pub type PoolState = PoolSpec;

/// Reconciles replication pools.
pub struct PoolReconciler {
    client: Arc<ClusterClient>,
    audit: Arc<AuditLog>,
}

impl PoolReconciler {
    pub fn new(client: Arc<ClusterClient>, audit: Arc<AuditLog>) -> Self {
        Self { client, audit }
    }

    async fn set_property(&self, name: &str, property: &'static str, value: &str) -> Result<()> {
        let cmd = format!("ceph osd pool set {} {} {}", name, property, value);
        self.client
            .execute(&cmd)
            .await
            .map_err(|source| ReconcileError::SetProperty {
                kind: "pool",
                name: name.to_string(),
                property,
                source,
            })?;
        Ok(())
    }
}

impl Reconcile for PoolReconciler {
    type Spec = PoolSpec;
    type State = PoolState;

    async fn create(&self, spec: &PoolSpec) -> Result<PoolState> {
        let pgp_num = spec.pgp_num.unwrap_or(spec.pg_num);
        let pool_type = spec.pool_type.as_deref().unwrap_or("replicated");

        let cmd = format!(
            "ceph osd pool create {} {} {} {}",
            spec.name, spec.pg_num, pgp_num, pool_type
        );
        self.client
            .execute(&cmd)
            .await
            .map_err(|source| ReconcileError::Create {
                kind: "pool",
                name: spec.name.clone(),
                source,
            })?;

        // Optional properties are set one command at a time; a failure
        // aborts here and leaves the pool partially configured (the
        // control plane has no transaction to roll back).
        if let Some(size) = spec.size {
            self.set_property(&spec.name, "size", &size.to_string()).await?;
        }
        if let Some(min_size) = spec.min_size {
            self.set_property(&spec.name, "min_size", &min_size.to_string())
                .await?;
        }
        if let Some(rule) = &spec.crush_rule {
            self.set_property(&spec.name, "crush_rule", rule).await?;
        }

        info!(pool = %spec.name, pg_num = spec.pg_num, "Created pool");
        self.audit.pool_created(&spec.name);

        Ok(spec.clone())
    }

    async fn observe(&self, prior: &PoolState) -> Result<Option<PoolState>> {
        let cmd = format!("ceph osd pool get {} all", prior.name);
        let output = match self.client.execute(&cmd).await {
            Ok(output) => output,
            Err(err) if POOL_NOT_FOUND.matches(&err) => return Ok(None),
            Err(source) => {
                return Err(ReconcileError::Observe {
                    kind: "pool",
                    name: prior.name.clone(),
                    source,
                });
            }
        };

        let mut state = prior.clone();
        if let Some(size) = parse::colon_field_u32(&output, "size") {
            state.size = Some(size);
        }
        if let Some(min_size) = parse::colon_field_u32(&output, "min_size") {
            state.min_size = Some(min_size);
        }
        if let Some(pg_num) = parse::colon_field_u32(&output, "pg_num") {
            state.pg_num = pg_num;
        }
        if let Some(pgp_num) = parse::colon_field_u32(&output, "pgp_num") {
            state.pgp_num = Some(pgp_num);
        }
        if let Some(rule) = parse::colon_field(&output, "crush_rule") {
            state.crush_rule = Some(rule.to_string());
        }

        // The `all` listing does not include the pool type; probe it
        // separately, best-effort.
        let cmd = format!("ceph osd pool get {} type", prior.name);
        if let Ok(output) = self.client.execute(&cmd).await {
            if let Some(pool_type) = parse::colon_field(&output, "type") {
                state.pool_type = Some(pool_type.to_string());
            }
        }

        Ok(Some(state))
    }

    async fn update(&self, spec: &PoolSpec, prior: &PoolState) -> Result<PoolState> {
        let mut changed = false;

        if let Some(size) = spec.size {
            if prior.size != Some(size) {
                self.set_property(&spec.name, "size", &size.to_string()).await?;
                changed = true;
            }
        }
        if let Some(min_size) = spec.min_size {
            if prior.min_size != Some(min_size) {
                self.set_property(&spec.name, "min_size", &min_size.to_string())
                    .await?;
                changed = true;
            }
        }
        if let Some(rule) = &spec.crush_rule {
            if prior.crush_rule.as_deref() != Some(rule.as_str()) {
                self.set_property(&spec.name, "crush_rule", rule).await?;
                changed = true;
            }
        }

        if changed {
            info!(pool = %spec.name, "Updated pool");
            self.audit.pool_updated(&spec.name);
        }

        Ok(spec.clone())
    }

    async fn delete(&self, prior: &PoolState) -> Result<()> {
        // Pool deletion is irreversible; the control plane requires the
        // name twice plus an explicit confirmation flag, preserved exactly.
        let cmd = format!(
            "ceph osd pool delete {} {} --yes-i-really-really-mean-it",
            prior.name, prior.name
        );
        self.client
            .execute(&cmd)
            .await
            .map_err(|source| ReconcileError::Delete {
                kind: "pool",
                name: prior.name.clone(),
                source,
            })?;

        info!(pool = %prior.name, "Deleted pool");
        self.audit.pool_deleted(&prior.name);

        Ok(())
    }
}
