//! Stand-in build tool for exercising the pipeline without a real toolchain.
//! `init` lays down a skeleton; `run` executes `src/main.rs` as a shell script.

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use crate::{config::ToolchainConfig, toolchain::platform::Platform};

pub const FAKE_CARGO: &str = r#"#!/bin/sh
case "$1" in
  init)
    for last in "$@"; do :; done
    mkdir -p "$last/src" || exit 1
    printf 'fn main() {}\n' > "$last/src/main.rs"
    ;;
  run)
    exec /bin/sh src/main.rs
    ;;
  *)
    echo "unsupported subcommand: $1" >&2
    exit 2
    ;;
esac
"#;

pub const FAKE_CARGO_BROKEN_INIT: &str = r#"#!/bin/sh
echo "skeleton refused" >&2
exit 101
"#;

pub fn install_fake_cargo(root: &Path) -> PathBuf {
    write_fake_cargo(root, FAKE_CARGO)
}

pub fn write_fake_cargo(root: &Path, script: &str) -> PathBuf {
    let cargo = ToolchainConfig::resolve(root, Platform::current()).cargo_path;
    write_executable(&cargo, script);
    cargo
}

pub fn write_executable(path: &Path, script: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, script).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
