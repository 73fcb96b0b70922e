use std::{env::consts, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
    Other,
}

/// Host facts that select the toolchain variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    pub fn current() -> Self {
        let os = match consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::MacOs,
            "windows" => Os::Windows,
            _ => Os::Other,
        };
        let arch = match consts::ARCH {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            _ => Arch::Other,
        };
        Self::new(os, arch)
    }

    pub fn target_triple(&self) -> &'static str {
        match (self.os, self.arch) {
            (Os::Windows, _) => "x86_64-pc-windows-gnu",
            (Os::MacOs, Arch::Aarch64) => "aarch64-apple-darwin",
            (Os::MacOs, _) => "x86_64-apple-darwin",
            (Os::Linux, Arch::Aarch64) => "aarch64-unknown-linux-gnu",
            (Os::Linux, _) => "x86_64-unknown-linux-gnu",
            (Os::Other, _) => "x86_64-unknown-linux-gnu",
        }
    }

    pub fn exe_suffix(&self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            _ => "",
        }
    }

    pub fn installer_file_name(&self) -> String {
        format!("rustup-init{}", self.exe_suffix())
    }

    pub fn installer_url(&self) -> String {
        format!(
            "https://static.rust-lang.org/rustup/dist/{}/{}",
            self.target_triple(),
            self.installer_file_name()
        )
    }

    /// Hosts without a dependable system linker get rust-lld instead.
    pub fn needs_self_contained_linker(&self) -> bool {
        !matches!(self.os, Os::Linux | Os::Windows)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target_triple())
    }
}
