use anyhow::{Context, Result};
use std::{
    env,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::toolchain::platform::Platform;

pub const DEFAULT_PORT: u16 = 8081;
pub const WORKSPACE_DIR_NAME: &str = "local-playground-workspace";
pub const TOOLCHAIN_CHANNEL: &str = "stable";
pub const EXECUTION_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub workspace_root: PathBuf,
    pub log_level: String,
    pub download_timeout: Duration,
    pub max_output_bytes: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = parse_port(lookup("PORT"))?;

        let workspace_root = match lookup("PLAYGROUND_WORKSPACE") {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => env::current_dir()
                .context("failed to resolve working directory")?
                .join(WORKSPACE_DIR_NAME),
        };

        Ok(Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            workspace_root,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            download_timeout: Duration::from_secs(parse_or(
                lookup("INSTALLER_DOWNLOAD_TIMEOUT_SECS"),
                60u64,
            )),
            max_output_bytes: parse_or(lookup("MAX_OUTPUT_BYTES"), 4 * 1024 * 1024usize)
                .max(1024),
        })
    }
}

fn parse_port(raw: Option<String>) -> Result<u16> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid PORT: {raw}")),
        _ => Ok(DEFAULT_PORT),
    }
}

/// Private toolchain layout, resolved once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    pub platform: Platform,
    pub channel: String,
    pub toolchain_name: String,
    pub rustup_home: PathBuf,
    pub cargo_home: PathBuf,
    pub cargo_path: PathBuf,
    pub rustc_path: PathBuf,
    pub installer_path: PathBuf,
    pub workspace_root: PathBuf,
}

impl ToolchainConfig {
    pub fn resolve(workspace_root: &Path, platform: Platform) -> Self {
        let channel = TOOLCHAIN_CHANNEL.to_string();
        let toolchain_name = format!("{channel}-{}", platform.target_triple());
        let rustup_home = workspace_root.join("rust-toolchain");
        let cargo_home = rustup_home.join("cargo");
        let bin_dir = rustup_home
            .join("toolchains")
            .join(&toolchain_name)
            .join("bin");
        let suffix = platform.exe_suffix();

        Self {
            platform,
            channel,
            toolchain_name,
            cargo_path: bin_dir.join(format!("cargo{suffix}")),
            rustc_path: bin_dir.join(format!("rustc{suffix}")),
            installer_path: workspace_root.join(platform.installer_file_name()),
            rustup_home,
            cargo_home,
            workspace_root: workspace_root.to_path_buf(),
        }
    }

    pub fn target_triple(&self) -> &'static str {
        self.platform.target_triple()
    }

    pub fn is_installed(&self) -> bool {
        self.cargo_path.is_file()
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    pub projects_root: PathBuf,
    pub project_name: String,
    pub entry_point: PathBuf,
}

impl WorkspaceConfig {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            projects_root: workspace_root.join("temp-projects"),
            project_name: "temp_project".to_string(),
            entry_point: Path::new("src").join("main.rs"),
        }
    }
}

fn parse_or<T>(raw: Option<String>, default: T) -> T
where
    T: FromStr,
{
    raw.and_then(|raw| raw.parse().ok()).unwrap_or(default)
}
