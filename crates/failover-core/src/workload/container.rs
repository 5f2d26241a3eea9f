// # Container Workload
//
// Starts and stops an existing named container through the docker CLI.
// The container must already exist (created, possibly stopped); this
// adapter never creates or removes it.

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::Workload;
use crate::workload::run_tool_checked;

/// A named container managed via `docker start` / `docker stop`
#[derive(Debug, Clone)]
pub struct ContainerWorkload {
    name: String,
}

impl ContainerWorkload {
    /// Create an adapter for the given container name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Workload for ContainerWorkload {
    async fn start(&mut self) -> Result<()> {
        tracing::info!(container = %self.name, "starting container");
        run_tool_checked("docker", &["start", &self.name]).await?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        tracing::info!(container = %self.name, "stopping container");
        // `docker stop` already applies SIGTERM + grace + SIGKILL.
        run_tool_checked("docker", &["stop", &self.name]).await?;
        Ok(())
    }

    async fn is_running(&mut self) -> Result<bool> {
        let state = run_tool_checked(
            "docker",
            &["inspect", "-f", "{{.State.Running}}", &self.name],
        )
        .await?;
        Ok(state == "true")
    }

    fn workload_name(&self) -> &'static str {
        "container"
    }
}
