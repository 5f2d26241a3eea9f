// # Process Workload
//
// Spawns the managed command as a local subprocess in its own process
// group and supervises it. Graceful stop signals the whole group with
// SIGTERM, then SIGKILLs anything still alive after the grace period, so
// collector-style workloads that fork helpers do not leave orphans.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::traits::Workload;

/// Seconds a stopped workload gets to exit before SIGKILL
const STOP_GRACE: Duration = Duration::from_secs(10);

/// A supervised local subprocess
pub struct ProcessWorkload {
    argv: Vec<String>,
    child: Option<Child>,
}

impl ProcessWorkload {
    /// Create a workload from a whitespace-split command line
    pub fn new(command: &str) -> Result<Self> {
        let argv: Vec<String> = command.split_whitespace().map(String::from).collect();
        if argv.is_empty() {
            return Err(Error::workload("empty workload command"));
        }
        Ok(Self { argv, child: None })
    }

    #[cfg(unix)]
    fn signal_group(child: &Child, signal: i32) {
        if let Some(pid) = child.id() {
            // The child was spawned as a group leader, so its pid is the pgid.
            unsafe {
                libc::killpg(pid as libc::pid_t, signal);
            }
        }
    }
}

#[async_trait]
impl Workload for ProcessWorkload {
    async fn start(&mut self) -> Result<()> {
        if self.is_running().await? {
            return Ok(());
        }

        tracing::info!(command = %self.argv.join(" "), "starting workload process");

        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| Error::workload(format!("failed to spawn {}: {}", self.argv[0], e)))?;

        tracing::info!(pid = child.id(), "workload process started");
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        tracing::info!(pid = child.id(), "stopping workload process");

        #[cfg(unix)]
        Self::signal_group(&child, libc::SIGTERM);
        #[cfg(not(unix))]
        let _ = child.start_kill();

        match timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%status, "workload process stopped");
            }
            Ok(Err(e)) => {
                return Err(Error::workload(format!("wait failed: {}", e)));
            }
            Err(_) => {
                tracing::warn!("workload did not stop within grace period, killing");
                #[cfg(unix)]
                Self::signal_group(&child, libc::SIGKILL);
                child
                    .kill()
                    .await
                    .map_err(|e| Error::workload(format!("kill failed: {}", e)))?;
                let _ = child.wait().await;
            }
        }

        Ok(())
    }

    async fn is_running(&mut self) -> Result<bool> {
        match &mut self.child {
            Some(child) => {
                let exited = child
                    .try_wait()
                    .map_err(|e| Error::workload(format!("try_wait failed: {}", e)))?;
                if exited.is_some() {
                    self.child = None;
                    Ok(false)
                } else {
                    Ok(true)
                }
            }
            None => Ok(false),
        }
    }

    fn workload_name(&self) -> &'static str {
        "process"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_stop_round_trip() {
        let mut workload = ProcessWorkload::new("sleep 60").unwrap();
        assert!(!workload.is_running().await.unwrap());

        workload.start().await.unwrap();
        assert!(workload.is_running().await.unwrap());

        // Starting while running is a no-op.
        workload.start().await.unwrap();

        workload.stop().await.unwrap();
        assert!(!workload.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn exited_process_reads_as_not_running() {
        let mut workload = ProcessWorkload::new("true").unwrap();
        workload.start().await.unwrap();

        // Give the process a moment to exit.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!workload.is_running().await.unwrap());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(ProcessWorkload::new("   ").is_err());
    }
}
