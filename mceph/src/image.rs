//! Block-image reconciliation via `rbd` commands.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::audit::AuditLog;
use crate::client::{ClusterClient, NotFoundMatcher};
use crate::parse;
use crate::reconcile::{Reconcile, ReconcileError, Result};

/// Error marker the block tool emits for an image it does not know.
const IMAGE_NOT_FOUND: NotFoundMatcher = NotFoundMatcher::new(&["No such file or directory"]);

/// Desired block image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Image name; `pool` and `name` together form the unique key.
    pub name: String,

    /// Pool the image lives in.
    pub pool: String,

    /// Capacity in the block tool's human form, e.g. `10G`.
    pub size: String,

    /// Image features enabled at creation. Never read back from the
    /// cluster; observed state carries the spec's set unchanged.
    #[serde(default)]
    pub features: BTreeSet<String>,
}

impl ImageSpec {
    /// The `<pool>/<name>` path the block tool addresses images by.
    pub fn path(&self) -> String {
        format!("{}/{}", self.pool, self.name)
    }
}

/// Block-image state as last read from the cluster.
///
/// Same shape as [`ImageSpec`]; `size` is normalized to a byte count
/// (`"<N>B"`) after read-back.
pub type ImageState = ImageSpec;

/// Reconciles block images.
pub struct ImageReconciler {
    client: Arc<ClusterClient>,
    audit: Arc<AuditLog>,
}

impl ImageReconciler {
    pub fn new(client: Arc<ClusterClient>, audit: Arc<AuditLog>) -> Self {
        Self { client, audit }
    }
}

impl Reconcile for ImageReconciler {
    type Spec = ImageSpec;
    type State = ImageState;

    async fn create(&self, spec: &ImageSpec) -> Result<ImageState> {
        let mut cmd = format!("rbd create --size {} {}", spec.size, spec.path());
        if !spec.features.is_empty() {
            let csv = spec
                .features
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(",");
            cmd.push_str(" --image-feature ");
            cmd.push_str(&csv);
        }

        self.client
            .execute(&cmd)
            .await
            .map_err(|source| ReconcileError::Create {
                kind: "block image",
                name: spec.path(),
                source,
            })?;

        info!(image = %spec.name, pool = %spec.pool, size = %spec.size, "Created block image");
        self.audit.image_created(&spec.path(), &spec.size);

        Ok(spec.clone())
    }

    async fn observe(&self, prior: &ImageState) -> Result<Option<ImageState>> {
        let cmd = format!("rbd info {} --format json", prior.path());
        let output = match self.client.execute(&cmd).await {
            Ok(output) => output,
            Err(err) if IMAGE_NOT_FOUND.matches(&err) => return Ok(None),
            Err(source) => {
                return Err(ReconcileError::Observe {
                    kind: "block image",
                    name: prior.path(),
                    source,
                });
            }
        };

        // Only the size is recovered; a malformed document leaves the
        // prior value in place.
        let mut state = prior.clone();
        if let Ok(doc) = serde_json::from_str::<Value>(&output) {
            if let Some(size) = parse::json_path(&doc, &["size"]).and_then(Value::as_u64) {
                state.size = format!("{}B", size);
            }
        }

        Ok(Some(state))
    }

    async fn update(&self, spec: &ImageSpec, prior: &ImageState) -> Result<ImageState> {
        if spec.size != prior.size {
            // Issued for shrink as well as grow; the tool itself decides
            // whether to refuse.
            let cmd = format!("rbd resize --size {} {}", spec.size, spec.path());
            self.client
                .execute(&cmd)
                .await
                .map_err(|source| ReconcileError::SetProperty {
                    kind: "block image",
                    name: spec.path(),
                    property: "size",
                    source,
                })?;

            info!(image = %spec.name, pool = %spec.pool, size = %spec.size, "Resized block image");
            self.audit.image_resized(&spec.path(), &spec.size);
        }

        Ok(spec.clone())
    }

    async fn delete(&self, prior: &ImageState) -> Result<()> {
        let cmd = format!("rbd rm {}", prior.path());
        self.client
            .execute(&cmd)
            .await
            .map_err(|source| ReconcileError::Delete {
                kind: "block image",
                name: prior.path(),
                source,
            })?;

        info!(image = %prior.name, pool = %prior.pool, "Deleted block image");
        self.audit.image_deleted(&prior.path());

        Ok(())
    }
}
