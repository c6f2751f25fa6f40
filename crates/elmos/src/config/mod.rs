use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Value;

use crate::error::{Error, Result};
use crate::platform::Platform;

pub const DEFAULT_CONFIG_FILE: &str = "elmos.toml";

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_arch() -> String {
    "arm64".into()
}

fn default_volume_name() -> String {
    "elmos".into()
}

fn default_ctng_repo() -> String {
    "https://github.com/crosstool-ng/crosstool-ng.git".into()
}

/// Workspace configuration. Loaded once by the binary and borrowed by every
/// builder; nothing in the crate keeps a global copy.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub build: BuildConfig,
    pub image: ImageConfig,
    pub toolchain: ToolchainConfig,
    /// Host the workspace lives on. Not read from the file; the binary sets
    /// it from the one startup detection.
    #[serde(skip)]
    pub platform: Platform,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Mounted case-sensitive workspace volume.
    pub workspace_dir: Option<PathBuf>,
    pub toolchains_dir: Option<PathBuf>,
    pub libraries_dir: Option<PathBuf>,
    pub kernel_dir: Option<PathBuf>,
    pub modules_dir: Option<PathBuf>,
    pub apps_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            workspace_dir: None,
            toolchains_dir: None,
            libraries_dir: None,
            kernel_dir: None,
            modules_dir: None,
            apps_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    #[serde(default = "default_arch")]
    pub arch: String,
    /// 0 = host CPU count.
    pub jobs: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            arch: default_arch(),
            jobs: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    #[serde(default = "default_volume_name")]
    pub volume_name: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            volume_name: default_volume_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    #[serde(default = "default_ctng_repo")]
    pub repo: String,
    pub git_ref: Option<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            repo: default_ctng_repo(),
            git_ref: None,
        }
    }
}

impl Config {
    pub fn project_root(&self) -> &Path {
        &self.paths.project_root
    }

    pub fn workspace_dir(&self) -> PathBuf {
        match &self.paths.workspace_dir {
            Some(p) => self.rooted(p),
            None if self.platform.is_macos() => {
                PathBuf::from("/Volumes").join(&self.image.volume_name)
            }
            None => self.paths.project_root.join(&self.image.volume_name),
        }
    }

    pub fn toolchains_dir(&self) -> PathBuf {
        match &self.paths.toolchains_dir {
            Some(p) => self.rooted(p),
            None => self.workspace_dir().join("toolchains"),
        }
    }

    /// Host headers (elf.h and friends) the kernel's host tools need on macOS.
    pub fn libraries_dir(&self) -> PathBuf {
        match &self.paths.libraries_dir {
            Some(p) => self.rooted(p),
            None => self.paths.project_root.join("libraries"),
        }
    }

    pub fn kernel_dir(&self) -> PathBuf {
        match &self.paths.kernel_dir {
            Some(p) => self.rooted(p),
            None => self.workspace_dir().join("linux"),
        }
    }

    pub fn modules_dir(&self) -> PathBuf {
        match &self.paths.modules_dir {
            Some(p) => self.rooted(p),
            None => self.paths.project_root.join("modules"),
        }
    }

    pub fn apps_dir(&self) -> PathBuf {
        match &self.paths.apps_dir {
            Some(p) => self.rooted(p),
            None => self.paths.project_root.join("apps"),
        }
    }

    fn rooted(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.paths.project_root.join(p)
        }
    }

    /// `ELMOS_ARCH` / `ELMOS_TOOLCHAINS_DIR` win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(arch) = env_non_empty("ELMOS_ARCH") {
            self.build.arch = arch;
        }
        if let Some(dir) = env_non_empty("ELMOS_TOOLCHAINS_DIR") {
            self.paths.toolchains_dir = Some(PathBuf::from(dir));
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "config extends cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path).map_err(|e| Error::config_io(path, e))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        let base_path = resolve_ref_path(path, ext);
        out = load_value_inner(&base_path, stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn parse(value: Value) -> Result<Config> {
    value
        .try_into()
        .map_err(|e| Error::msg(format!("invalid config: {e}")))
}

/// Load a config file, following `extends`. A relative `project_root` is
/// resolved against the directory holding the file.
pub fn load(path: &Path) -> Result<Config> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    let mut cfg = parse(value)?;
    if cfg.paths.project_root.is_relative() {
        let dir = config_dir(path)?;
        cfg.paths.project_root = normalize(&dir.join(&cfg.paths.project_root));
    }
    Ok(cfg)
}

/// Absolute directory holding `path`. A bare file name lives in the cwd.
fn config_dir(path: &Path) -> Result<PathBuf> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match dir.canonicalize() {
        Ok(abs) => Ok(abs),
        Err(_) => std::path::absolute(dir)
            .map_err(|e| Error::msg(format!("cannot resolve {}: {e}", dir.display()))),
    }
}

/// Drop `.` components so derived paths print cleanly.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

/// Like [`load`], but a missing file yields the defaults rooted at `cwd`.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load(path);
    }
    let cwd = std::env::current_dir().map_err(|e| Error::msg(format!("cwd error: {e}")))?;
    let mut cfg = Config::default();
    cfg.paths.project_root = cwd;
    Ok(cfg)
}
