//! Ephemeral per-execution project directories.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use uuid::Uuid;

use crate::{
    config::{ToolchainConfig, WorkspaceConfig},
    error::WorkspaceError,
    sandbox::{env::CommandEnv, process::CommandSpec},
};

/// A uniquely named project directory owned by exactly one execution.
///
/// Call [`release`](Self::release) when done. A guard dropped without release
/// (panic, cancelled task) removes its directory synchronously instead.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    entry_point: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_point(&self) -> PathBuf {
        self.path.join(&self.entry_point)
    }

    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => tracing::debug!(workspace = %self.path.display(), "workspace released"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                workspace = %self.path.display(),
                error = %err,
                "failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = std::fs::remove_dir_all(&self.path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                workspace = %self.path.display(),
                error = %err,
                "failed to remove abandoned workspace"
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    config: WorkspaceConfig,
    toolchain: Arc<ToolchainConfig>,
}

impl WorkspaceManager {
    pub fn new(config: WorkspaceConfig, toolchain: Arc<ToolchainConfig>) -> Self {
        Self { config, toolchain }
    }

    pub fn projects_root(&self) -> &Path {
        &self.config.projects_root
    }

    /// Creates a fresh directory and lays down a cargo skeleton in it.
    pub async fn create(&self) -> Result<Workspace, WorkspaceError> {
        tokio::fs::create_dir_all(self.projects_root())
            .await
            .map_err(WorkspaceError::CreateRoot)?;

        let id = Uuid::new_v4();
        let path = self
            .projects_root()
            .join(format!("rust-project-{}", id.as_simple()));
        tokio::fs::create_dir(&path)
            .await
            .map_err(WorkspaceError::CreateDir)?;

        let workspace = Workspace {
            id,
            path,
            entry_point: self.config.entry_point.clone(),
            released: false,
        };

        if let Err(err) = self.init_skeleton(&workspace).await {
            workspace.release().await;
            return Err(err);
        }

        tracing::debug!(
            execution_id = %id,
            workspace = %workspace.path.display(),
            "workspace ready"
        );
        Ok(workspace)
    }

    /// Writes the snippet verbatim over the skeleton's entry point.
    pub async fn write_source(
        &self,
        workspace: &Workspace,
        code: &str,
    ) -> Result<(), WorkspaceError> {
        let entry = workspace.entry_point();
        if let Some(parent) = entry.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(WorkspaceError::WriteSource)?;
        }
        tokio::fs::write(&entry, code.as_bytes())
            .await
            .map_err(WorkspaceError::WriteSource)
    }

    async fn init_skeleton(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        let env = CommandEnv::for_toolchain(&self.toolchain, std::env::vars_os());
        let output = CommandSpec::new(&self.toolchain.cargo_path, workspace.path(), env)
            .args(["init", "--name", self.config.project_name.as_str(), "--vcs", "none"])
            .arg(workspace.path())
            .command()
            .output()
            .await
            .map_err(WorkspaceError::InitSpawn)?;

        if !output.status.success() {
            return Err(WorkspaceError::InitFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{path::Path, sync::Arc};

    use super::WorkspaceManager;
    use crate::{
        config::{ToolchainConfig, WorkspaceConfig},
        error::WorkspaceError,
        sandbox::testing::{install_fake_cargo, FAKE_CARGO_BROKEN_INIT},
        toolchain::platform::Platform,
    };

    fn manager(root: &Path) -> WorkspaceManager {
        let toolchain = Arc::new(ToolchainConfig::resolve(root, Platform::current()));
        WorkspaceManager::new(WorkspaceConfig::new(root), toolchain)
    }

    #[tokio::test]
    async fn creates_unique_skeleton_directories() {
        let root = tempfile::tempdir().unwrap();
        install_fake_cargo(root.path());
        let manager = manager(root.path());

        let first = manager.create().await.unwrap();
        let second = manager.create().await.unwrap();

        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(manager.projects_root()));
        assert!(first.entry_point().is_file());

        first.release().await;
        second.release().await;
    }

    #[tokio::test]
    async fn source_overwrites_placeholder() {
        let root = tempfile::tempdir().unwrap();
        install_fake_cargo(root.path());
        let manager = manager(root.path());

        let workspace = manager.create().await.unwrap();
        manager.write_source(&workspace, "echo snippet").await.unwrap();
        let written = std::fs::read_to_string(workspace.entry_point()).unwrap();
        assert_eq!(written, "echo snippet");
        workspace.release().await;
    }

    #[tokio::test]
    async fn release_and_drop_both_remove_directory() {
        let root = tempfile::tempdir().unwrap();
        install_fake_cargo(root.path());
        let manager = manager(root.path());

        let released = manager.create().await.unwrap();
        let released_path = released.path().to_path_buf();
        released.release().await;
        assert!(!released_path.exists());

        let dropped = manager.create().await.unwrap();
        let dropped_path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!dropped_path.exists());
    }

    #[tokio::test]
    async fn failed_init_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        crate::sandbox::testing::write_fake_cargo(root.path(), FAKE_CARGO_BROKEN_INIT);
        let manager = manager(root.path());

        let err = manager.create().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::InitFailed { .. }));
        assert!(err.to_string().contains("skeleton refused"));
        let leftovers = std::fs::read_dir(manager.projects_root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn missing_build_tool_is_an_init_failure() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager(root.path());

        let err = manager.create().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::InitSpawn(_)));
        assert_eq!(std::fs::read_dir(manager.projects_root()).unwrap().count(), 0);
    }
}
