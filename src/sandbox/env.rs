use std::{
    collections::BTreeMap,
    ffi::{OsStr, OsString},
};

use tokio::process::Command;

use crate::config::ToolchainConfig;

/// Ambient variables that would move build output out of the workspace.
pub const DENIED_VARS: &[&str] = &["CARGO_TARGET_DIR", "CARGO_BUILD_TARGET_DIR"];

/// Explicit environment for a child process: ambient snapshot, then
/// overrides, then the deny list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl CommandEnv {
    pub fn from_ambient<I, K, V>(ambient: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            vars: ambient
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Toolchain-pinned environment used for the installer and skeleton init.
    pub fn for_toolchain<I, K, V>(toolchain: &ToolchainConfig, ambient: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self::from_ambient(ambient)
            .set("RUSTUP_HOME", &toolchain.rustup_home)
            .set("CARGO_HOME", &toolchain.cargo_home)
            .deny(DENIED_VARS)
    }

    /// Environment for `cargo run`: the toolchain pins plus the compiler
    /// path and, where the host needs it, the bundled linker.
    pub fn for_build<I, K, V>(toolchain: &ToolchainConfig, ambient: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let env = Self::for_toolchain(toolchain, ambient).set("RUSTC", &toolchain.rustc_path);
        if toolchain.platform.needs_self_contained_linker() {
            env.set("RUSTFLAGS", "-C linker=rust-lld")
        } else {
            env
        }
    }

    pub fn set(mut self, key: impl Into<OsString>, value: impl AsRef<OsStr>) -> Self {
        self.vars.insert(key.into(), value.as_ref().to_os_string());
        self
    }

    pub fn deny(mut self, keys: &[&str]) -> Self {
        for key in keys {
            self.vars.remove(OsStr::new(key));
        }
        self
    }

    pub fn apply(&self, cmd: &mut Command) {
        cmd.env_clear();
        cmd.envs(&self.vars);
    }
}

#[cfg(test)]
impl CommandEnv {
    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(OsStr::new(key))
    }
}
