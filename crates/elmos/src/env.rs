//! Build environments for kernel and module `make` runs.

use std::path::PathBuf;

use crate::arch::{self, ArchConfig};
use crate::config::Config;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::packages::PackageResolver;
use crate::platform::Platform;
use crate::toolchain::ToolchainPaths;

/// Ordered `KEY=VALUE` list holding at most one entry per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvList {
    entries: Vec<String>,
}

impl EnvList {
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut out = Self::default();
        for (k, v) in vars {
            out.set(k.as_ref(), v.as_ref());
        }
        out
    }

    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars())
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.split_once('=').is_some_and(|(k, _)| k == key))
    }

    /// Replace in place when `key` exists, append otherwise.
    pub fn set(&mut self, key: &str, value: &str) {
        let entry = format!("{key}={value}");
        match self.position(key) {
            Some(i) => self.entries[i] = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key)
            .and_then(|i| self.entries[i].split_once('='))
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let i = self.position(key)?;
        let entry = self.entries.remove(i);
        entry.split_once('=').map(|(_, v)| v.to_string())
    }

    pub fn into_vec(self) -> Vec<String> {
        self.entries
    }

    pub fn as_slice(&self) -> &[String] {
        &self.entries
    }
}

/// Prepend the non-empty `dirs` to `path`, in order.
pub fn prepend_path(dirs: &[String], path: &str) -> String {
    let mut parts: Vec<&str> = dirs
        .iter()
        .map(String::as_str)
        .filter(|d| !d.is_empty())
        .collect();
    if !path.is_empty() {
        parts.push(path);
    }
    parts.join(":")
}

const MACOS_HOSTCFLAGS: &[&str] = &[
    "-D_UUID_T",
    "-D__GETHOSTUUID_H",
    "-D_DARWIN_C_SOURCE",
    "-D_FILE_OFFSET_BITS=64",
];

const LINUX_SYSTEM_DIRS: &[&str] = &["/usr/bin", "/usr/sbin", "/bin", "/sbin"];

/// Assembles the environment kernel and module `make` runs execute in.
pub struct EnvironmentBuilder<'a> {
    config: &'a Config,
    packages: &'a dyn PackageResolver,
    fs: &'a dyn FileSystem,
    platform: Platform,
    base_env: EnvList,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(
        config: &'a Config,
        packages: &'a dyn PackageResolver,
        fs: &'a dyn FileSystem,
        platform: Platform,
    ) -> Self {
        Self {
            config,
            packages,
            fs,
            platform,
            base_env: EnvList::from_process(),
        }
    }

    pub fn with_base_env(mut self, env: EnvList) -> Self {
        self.base_env = env;
        self
    }

    pub fn arch(&self) -> Result<&'static ArchConfig> {
        arch::require(&self.config.build.arch)
    }

    fn toolchain_bin(&self, arch: &ArchConfig) -> Option<PathBuf> {
        let triple = arch.target_triple()?;
        let bin = ToolchainPaths::from_config(self.config)
            .x_tools
            .join(triple)
            .join("bin");
        self.fs.is_dir(&bin).then_some(bin)
    }

    /// `CROSS_COMPILE` value: the built toolchain's absolute prefix when its
    /// gcc is present, the bare triple prefix otherwise.
    pub fn cross_compile_prefix(&self) -> Result<String> {
        let arch = self.arch()?;
        let Some(triple) = arch.target_triple() else {
            return Ok(String::new());
        };
        if let Some(bin) = self.toolchain_bin(arch) {
            if self.fs.exists(&bin.join(arch.gcc_binary)) {
                return Ok(format!("{}/{triple}-", bin.display()));
            }
        }
        Ok(format!("{triple}-"))
    }

    fn make_path(&self, arch: &ArchConfig, inherited: &str) -> String {
        let mut dirs = Vec::<String>::new();
        if let Some(bin) = self.toolchain_bin(arch) {
            dirs.push(bin.display().to_string());
        }
        match self.platform {
            Platform::MacOs => {
                dirs.push(self.packages.libexec_bin("gnu-sed"));
                dirs.push(self.packages.libexec_bin("coreutils"));
                dirs.push(self.packages.bin("llvm"));
                dirs.push(self.packages.bin("lld"));
                dirs.push(self.packages.sbin("e2fsprogs"));
            }
            Platform::Linux | Platform::Wsl2 => {
                for sys in LINUX_SYSTEM_DIRS {
                    if !inherited.contains(sys) {
                        dirs.push((*sys).to_string());
                    }
                }
            }
        }
        prepend_path(&dirs, inherited)
    }

    fn host_cflags(&self) -> String {
        let mut flags = Vec::<String>::new();
        if self.platform.is_macos() {
            flags.push(format!("-I{}", self.config.libraries_dir().display()));
            let libelf = self.packages.include("libelf");
            if !libelf.is_empty() {
                flags.push(format!("-I{libelf}"));
            }
            flags.extend(MACOS_HOSTCFLAGS.iter().map(|f| f.to_string()));
        } else {
            flags.push("-D_FILE_OFFSET_BITS=64".into());
        }
        flags.join(" ")
    }

    pub fn build_make_env(&self) -> Result<Vec<String>> {
        let arch = self.arch()?;
        let mut env = self.base_env.clone();
        let inherited = env.remove("PATH").unwrap_or_default();

        env.set("PATH", &self.make_path(arch, &inherited));
        env.set("ARCH", arch.kernel_arch);
        env.set("LLVM", "1");
        env.set("CROSS_COMPILE", &self.cross_compile_prefix()?);

        let cflags = self.host_cflags();
        if !cflags.is_empty() {
            env.set("HOSTCFLAGS", &cflags);
        }
        Ok(env.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_updates_in_place() {
        let mut env = EnvList::from_vars([("HOME", "/root"), ("PATH", "/bin"), ("LANG", "C")]);
        env.set("PATH", "/opt/bin:/bin");
        env.set("CT_PREFIX", "/x");
        assert_eq!(
            env.as_slice(),
            &[
                "HOME=/root".to_string(),
                "PATH=/opt/bin:/bin".to_string(),
                "LANG=C".to_string(),
                "CT_PREFIX=/x".to_string(),
            ]
        );
    }

    #[test]
    fn values_may_contain_equals() {
        let env = EnvList::from_vars([("CPPFLAGS", "-DFOO=1")]);
        assert_eq!(env.get("CPPFLAGS"), Some("-DFOO=1"));
        assert_eq!(env.get("CPP"), None);
    }

    #[test]
    fn prepend_path_skips_empty_dirs() {
        let dirs = vec!["/a".to_string(), String::new(), "/b".to_string()];
        assert_eq!(prepend_path(&dirs, "/usr/bin"), "/a:/b:/usr/bin");
        assert_eq!(prepend_path(&dirs, ""), "/a:/b");
    }
}
