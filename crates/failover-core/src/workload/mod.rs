//! Managed workload adapters
//!
//! The ownership follower drives exactly one of these: a supervised local
//! subprocess, a named container, or a deployment scaled between two
//! replica counts.

pub mod container;
pub mod deployment;
pub mod process;

pub use container::ContainerWorkload;
pub use deployment::DeploymentWorkload;
pub use process::ProcessWorkload;

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{Error, Result};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Run an external tool to completion with a bounded timeout.
///
/// Used by the container and deployment adapters, which manage their
/// workload through `docker`/`kubectl` rather than owning a child process.
pub(crate) async fn run_tool(program: &str, args: &[&str]) -> Result<Output> {
    let output = timeout(COMMAND_TIMEOUT, Command::new(program).args(args).output())
        .await
        .map_err(|_| Error::workload(format!("{} timed out after {:?}", program, COMMAND_TIMEOUT)))?
        .map_err(|e| Error::workload(format!("failed to run {}: {}", program, e)))?;
    Ok(output)
}

/// Like [`run_tool`] but treats a non-zero exit as an error, returning
/// trimmed stdout on success.
pub(crate) async fn run_tool_checked(program: &str, args: &[&str]) -> Result<String> {
    let output = run_tool(program, args).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::workload(format!(
            "{} {} exited with {}: {}",
            program,
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
