//! plugins/manager/installer.rs
//!
//! Fetching plugin sources. The default implementation shells out to `git`.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::Error;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PluginInstaller: Send + Sync {
    /// Clones `url` into `dest`, which must not exist yet.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), Error>;

    /// Brings an already cloned plugin up to date.
    async fn pull(&self, dir: &Path) -> Result<(), Error>;
}

#[derive(Debug, Clone, Default)]
pub struct GitInstaller;

impl GitInstaller {
    async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<(), Error> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!("Running git {:?} in {:?}", args, cwd);
        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Plugin(format!("git {} failed: {}", args[0], stderr.trim())));
        }
        Ok(())
    }
}

#[async_trait]
impl PluginInstaller for GitInstaller {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), Error> {
        let dest_str = dest.to_string_lossy();
        info!("Cloning plugin {} into {}", url, dest_str);
        Self::run_git(&["clone", "--depth", "1", url, &dest_str], None).await
    }

    async fn pull(&self, dir: &Path) -> Result<(), Error> {
        info!("Updating plugin in {:?}", dir);
        Self::run_git(&["pull"], Some(dir)).await
    }
}
