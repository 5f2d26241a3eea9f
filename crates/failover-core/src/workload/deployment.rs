// # Deployment Workload
//
// Scales a deployment between an active and an idle replica count through
// the kubectl CLI. "Running" means the deployment currently asks for more
// replicas than its idle count.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::traits::Workload;
use crate::workload::run_tool_checked;

/// A deployment scaled via `kubectl scale`
#[derive(Debug, Clone)]
pub struct DeploymentWorkload {
    namespace: String,
    name: String,
    active_replicas: u32,
    idle_replicas: u32,
}

impl DeploymentWorkload {
    /// Create an adapter for `namespace/name` with the two replica counts
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        active_replicas: u32,
        idle_replicas: u32,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            active_replicas,
            idle_replicas,
        }
    }

    async fn scale_to(&self, replicas: u32) -> Result<()> {
        let replicas_arg = format!("--replicas={}", replicas);
        run_tool_checked(
            "kubectl",
            &[
                "-n",
                &self.namespace,
                "scale",
                "deployment",
                &self.name,
                &replicas_arg,
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Workload for DeploymentWorkload {
    async fn start(&mut self) -> Result<()> {
        tracing::info!(
            deployment = %self.name,
            replicas = self.active_replicas,
            "scaling deployment up"
        );
        self.scale_to(self.active_replicas).await
    }

    async fn stop(&mut self) -> Result<()> {
        tracing::info!(
            deployment = %self.name,
            replicas = self.idle_replicas,
            "scaling deployment down"
        );
        self.scale_to(self.idle_replicas).await
    }

    async fn is_running(&mut self) -> Result<bool> {
        let replicas = run_tool_checked(
            "kubectl",
            &[
                "-n",
                &self.namespace,
                "get",
                "deployment",
                &self.name,
                "-o",
                "jsonpath={.spec.replicas}",
            ],
        )
        .await?;
        let replicas: u32 = replicas
            .parse()
            .map_err(|e| Error::workload(format!("unparsable replica count '{}': {}", replicas, e)))?;
        Ok(replicas > self.idle_replicas)
    }

    fn workload_name(&self) -> &'static str {
        "deployment"
    }
}
