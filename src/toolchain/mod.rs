pub mod installer;
pub mod platform;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{config::ToolchainConfig, error::ProvisionError, sandbox::env::CommandEnv};

pub use installer::{HttpInstallerFetcher, InstallerFetcher};

/// Installs the private toolchain once, before any request is served.
pub struct ToolchainProvisioner {
    config: Arc<ToolchainConfig>,
    fetcher: Arc<dyn InstallerFetcher>,
}

impl ToolchainProvisioner {
    pub fn new(config: Arc<ToolchainConfig>, fetcher: Arc<dyn InstallerFetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn is_installed(&self) -> bool {
        self.config.is_installed()
    }

    pub async fn ensure_installed(&self) -> Result<(), ProvisionError> {
        if self.is_installed() {
            tracing::info!(
                rustup_home = %self.config.rustup_home.display(),
                "toolchain already installed"
            );
            return Ok(());
        }

        tracing::info!(
            rustup_home = %self.config.rustup_home.display(),
            channel = %self.config.channel,
            toolchain = %self.config.toolchain_name,
            "installing toolchain"
        );
        create_dir(&self.config.rustup_home).await?;
        create_dir(&self.config.cargo_home).await?;

        let installer = self.ensure_installer().await?;
        self.run_installer(&installer).await?;

        if !self.is_installed() {
            return Err(ProvisionError::BuildToolMissing {
                path: self.config.cargo_path.clone(),
            });
        }

        tracing::info!(
            rustup_home = %self.config.rustup_home.display(),
            cargo_home = %self.config.cargo_home.display(),
            cargo = %self.config.cargo_path.display(),
            "toolchain installed"
        );
        Ok(())
    }

    async fn ensure_installer(&self) -> Result<PathBuf, ProvisionError> {
        let path = self.config.installer_path.clone();
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            tracing::info!(path = %path.display(), size = meta.len(), "reusing cached installer");
            return Ok(path);
        }

        create_dir(&self.config.workspace_root).await?;
        let url = self.config.platform.installer_url();
        self.fetcher.fetch(&url, &path).await?;
        mark_executable(&path).await?;

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|source| ProvisionError::Verify { source })?;
        tracing::info!(path = %path.display(), size = meta.len(), "installer verified");
        Ok(path)
    }

    async fn run_installer(&self, installer: &Path) -> Result<(), ProvisionError> {
        let env = CommandEnv::for_toolchain(&self.config, std::env::vars_os());
        let mut cmd = tokio::process::Command::new(installer);
        cmd.args([
            "--default-toolchain",
            self.config.toolchain_name.as_str(),
            "--profile",
            "minimal",
            "--no-modify-path",
            "-y",
        ]);
        env.apply(&mut cmd);

        let output = cmd
            .output()
            .await
            .map_err(|source| ProvisionError::InstallerSpawn {
                path: installer.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(ProvisionError::InstallerFailed {
                status: output.status,
                output: combined,
            });
        }
        Ok(())
    }
}

async fn create_dir(path: &Path) -> Result<(), ProvisionError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| ProvisionError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(unix)]
async fn mark_executable(path: &Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|source| ProvisionError::Permissions {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
async fn mark_executable(_path: &Path) -> Result<(), ProvisionError> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use std::{
        path::Path,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;

    use super::{InstallerFetcher, ToolchainProvisioner};
    use crate::{
        config::ToolchainConfig,
        error::ProvisionError,
        sandbox::testing::write_executable,
        toolchain::platform::Platform,
    };

    /// Lays down `bin/cargo` for the requested toolchain and logs each run.
    const FAKE_RUSTUP_INIT: &str = r#"#!/bin/sh
mkdir -p "$RUSTUP_HOME/toolchains/$2/bin" || exit 1
printf '#!/bin/sh\n' > "$RUSTUP_HOME/toolchains/$2/bin/cargo"
echo "$*" >> "$RUSTUP_HOME/install.log"
"#;

    const FAILING_RUSTUP_INIT: &str = r#"#!/bin/sh
echo "error: could not download component" >&2
exit 1
"#;

    struct ScriptFetcher {
        script: &'static str,
        calls: AtomicUsize,
    }

    impl ScriptFetcher {
        fn new(script: &'static str) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl InstallerFetcher for ScriptFetcher {
        async fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, ProvisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            write_executable(dest, self.script);
            Ok(self.script.len() as u64)
        }
    }

    fn config(root: &Path) -> Arc<ToolchainConfig> {
        Arc::new(ToolchainConfig::resolve(root, Platform::current()))
    }

    #[tokio::test]
    async fn installs_once_and_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let cfg = config(root.path());
        let fetcher = ScriptFetcher::new(FAKE_RUSTUP_INIT);
        let provisioner = ToolchainProvisioner::new(cfg.clone(), fetcher.clone());

        assert!(!provisioner.is_installed());
        provisioner.ensure_installed().await.unwrap();
        provisioner.ensure_installed().await.unwrap();

        assert!(provisioner.is_installed());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        let log = std::fs::read_to_string(cfg.rustup_home.join("install.log")).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains(&format!("--default-toolchain {}", cfg.toolchain_name)));
        assert!(log.contains("--profile minimal --no-modify-path -y"));
        assert!(cfg.cargo_home.is_dir());
    }

    #[tokio::test]
    async fn cached_installer_is_not_downloaded_again() {
        let root = tempfile::tempdir().unwrap();
        let cfg = config(root.path());
        write_executable(&cfg.installer_path, FAKE_RUSTUP_INIT);
        let fetcher = ScriptFetcher::new(FAKE_RUSTUP_INIT);

        ToolchainProvisioner::new(cfg.clone(), fetcher.clone())
            .ensure_installed()
            .await
            .unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(cfg.cargo_path.is_file());
    }

    #[tokio::test]
    async fn installer_failure_is_fatal_with_output() {
        let root = tempfile::tempdir().unwrap();
        let cfg = config(root.path());
        let provisioner = ToolchainProvisioner::new(cfg, ScriptFetcher::new(FAILING_RUSTUP_INIT));

        let err = provisioner.ensure_installed().await.unwrap_err();
        match err {
            ProvisionError::InstallerFailed { output, .. } => {
                assert!(output.contains("could not download component"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!provisioner.is_installed());
    }

    #[tokio::test]
    async fn installer_that_installs_nothing_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let provisioner = ToolchainProvisioner::new(
            config(root.path()),
            ScriptFetcher::new("#!/bin/sh\nexit 0\n"),
        );

        let err = provisioner.ensure_installed().await.unwrap_err();
        assert!(matches!(err, ProvisionError::BuildToolMissing { .. }));
    }
}
