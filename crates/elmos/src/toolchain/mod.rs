//! crosstool-ng lifecycle: install, target selection, config patching,
//! toolchain builds, and discovery of what is already built.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Config;
use crate::env::EnvList;
use crate::error::{Error, Result};
use crate::executor::{ExecCtx, Executor, run_stage};
use crate::fs::FileSystem;
use crate::packages::PackageResolver;
use crate::platform::Platform;

mod build_env;
pub mod ctconfig;

pub use ctconfig::{CtConfig, patch_config_text};

const CT_NG_CHECKOUT: &str = "crosstool-ng";

/// On-disk layout of the toolchain workspace. Everything hangs off `base`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainPaths {
    pub base: PathBuf,
    /// crosstool-ng install prefix.
    pub crosstool_ng: PathBuf,
    /// Built toolchains, one directory per target triple.
    pub x_tools: PathBuf,
    /// Tarball cache; also holds the crosstool-ng git checkout.
    pub src: PathBuf,
    /// User-provided `<target>.config` overrides.
    pub configs: PathBuf,
}

impl ToolchainPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            crosstool_ng: base.join("crosstool-ng"),
            x_tools: base.join("x-tools"),
            src: base.join("src"),
            configs: base.join("configs"),
            base,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.toolchains_dir())
    }

    pub fn ct_ng(&self) -> PathBuf {
        self.crosstool_ng.join("bin").join("ct-ng")
    }

    pub fn checkout(&self) -> PathBuf {
        self.src.join(CT_NG_CHECKOUT)
    }

    pub fn active_config(&self) -> PathBuf {
        self.base.join(".config")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainInfo {
    pub target: String,
    pub path: PathBuf,
    /// `path/bin` exists. An interrupted build can leave this true.
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolchainState {
    Uninstalled,
    Installed,
    TargetSelected,
    Built,
}

pub struct ToolchainManager<'a> {
    config: &'a Config,
    exec: &'a dyn Executor,
    fs: &'a dyn FileSystem,
    packages: &'a dyn PackageResolver,
    platform: Platform,
    base_env: EnvList,
    home: Option<PathBuf>,
}

impl<'a> ToolchainManager<'a> {
    pub fn new(
        config: &'a Config,
        exec: &'a dyn Executor,
        fs: &'a dyn FileSystem,
        packages: &'a dyn PackageResolver,
        platform: Platform,
    ) -> Self {
        Self {
            config,
            exec,
            fs,
            packages,
            platform,
            base_env: EnvList::from_process(),
            home: dirs::home_dir(),
        }
    }

    pub fn with_base_env(mut self, env: EnvList) -> Self {
        self.base_env = env;
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Recomputed on every call; the config may have been reloaded.
    pub fn paths(&self) -> ToolchainPaths {
        ToolchainPaths::from_config(self.config)
    }

    pub fn ct_ng_path(&self) -> PathBuf {
        self.paths().ct_ng()
    }

    pub fn is_installed(&self) -> bool {
        self.fs.exists(&self.ct_ng_path())
    }

    pub fn has_target(&self) -> bool {
        self.fs.exists(&self.paths().active_config())
    }

    pub fn state(&self) -> Result<ToolchainState> {
        if !self.is_installed() {
            return Ok(ToolchainState::Uninstalled);
        }
        if self.installed_toolchains()?.iter().any(|t| t.installed) {
            return Ok(ToolchainState::Built);
        }
        if self.has_target() {
            return Ok(ToolchainState::TargetSelected);
        }
        Ok(ToolchainState::Installed)
    }

    fn require_installed(&self) -> Result<()> {
        if self.is_installed() {
            Ok(())
        } else {
            Err(Error::not_installed("crosstool-ng", "elmos toolchain install"))
        }
    }

    /// Project-level overrides win over workspace-local ones.
    pub fn custom_config_path(&self, target: &str) -> Option<PathBuf> {
        let file = format!("{target}.config");
        [
            self.config
                .project_root()
                .join("tools/toolchains/configs")
                .join(&file),
            self.paths().configs.join(&file),
        ]
        .into_iter()
        .find(|p| self.fs.exists(p))
    }

    /// Clone, bootstrap, configure, build and install crosstool-ng into
    /// `crosstool_ng`. The clone is skipped when a checkout exists; every
    /// other stage always re-runs so an interrupted install can be resumed.
    pub fn install(&self, ctx: &ExecCtx) -> Result<()> {
        let paths = self.paths();
        let checkout = paths.checkout();
        self.fs.mkdir_all(&paths.src)?;
        self.fs.mkdir_all(&paths.crosstool_ng)?;

        if self.fs.exists(&checkout) {
            tracing::info!(
                checkout = %checkout.display(),
                "crosstool-ng checkout present; skipping clone"
            );
        } else {
            run_stage(ctx, "clone", |ctx| {
                let dest = checkout.display().to_string();
                let mut args = vec!["clone", "--depth", "1"];
                let git_ref = self
                    .config
                    .toolchain
                    .git_ref
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                if let Some(r) = git_ref {
                    args.extend(["--branch", r]);
                }
                args.extend([self.config.toolchain.repo.as_str(), dest.as_str()]);
                self.exec.run(ctx, "git", &args)
            })?;
        }

        let env = self.ct_ng_env(ctx)?;
        let prefix = format!("--prefix={}", paths.crosstool_ng.display());
        let jobs = format!("-j{}", num_cpus::get().max(1));

        run_stage(ctx, "bootstrap", |ctx| {
            self.exec
                .run_with_env_in_dir(ctx, &env, &checkout, "./bootstrap", &[])
        })?;
        run_stage(ctx, "configure", |ctx| {
            self.exec
                .run_with_env_in_dir(ctx, &env, &checkout, "./configure", &[prefix.as_str()])
        })?;
        run_stage(ctx, "make", |ctx| {
            self.exec
                .run_with_env_in_dir(ctx, &env, &checkout, "make", &[jobs.as_str()])
        })?;
        run_stage(ctx, "make-install", |ctx| {
            self.exec
                .run_with_env_in_dir(ctx, &env, &checkout, "make", &["install"])
        })?;
        tracing::info!(ct_ng = %paths.ct_ng().display(), "crosstool-ng installed");
        Ok(())
    }

    /// Make `target` the active configuration, either from a custom config
    /// file or from the crosstool-ng sample of that name, then patch it.
    pub fn select_target(&self, ctx: &ExecCtx, target: &str) -> Result<()> {
        let target = target.trim();
        if target.is_empty() {
            return Err(Error::msg("toolchain target is empty"));
        }
        self.require_installed()?;
        let paths = self.paths();
        let active = paths.active_config();
        self.fs.mkdir_all(&paths.base)?;

        if let Some(custom) = self.custom_config_path(target) {
            tracing::info!(target, config = %custom.display(), "using custom config");
            let data = self.fs.read_file(&custom)?;
            self.fs.write_file(&active, &data)?;
        } else {
            let env = self.ct_ng_env(ctx)?;
            let ct_ng = paths.ct_ng().display().to_string();
            run_stage(ctx, "select", |ctx| {
                self.exec
                    .run_with_env_in_dir(ctx, &env, &paths.base, &ct_ng, &[target])
            })?;
        }

        if self.fs.exists(&active) {
            self.patch_active_config()?;
        } else if !ctx.dry_run {
            tracing::warn!(target, "no .config produced; nothing to patch");
        }
        Ok(())
    }

    /// Rewrite the active `.config` in place for this workspace.
    pub fn patch_active_config(&self) -> Result<()> {
        let paths = self.paths();
        let active = paths.active_config();
        let raw = self.fs.read_file(&active)?;
        let text = String::from_utf8_lossy(&raw);
        let patched = patch_config_text(&text, &paths);
        if patched != text {
            self.fs.write_file(&active, patched.as_bytes())?;
            tracing::info!(config = %active.display(), "patched crosstool-ng config");
        }
        Ok(())
    }

    /// `ct-ng build.<jobs>`; `jobs == 0` uses every host CPU.
    pub fn build(&self, ctx: &ExecCtx, jobs: usize) -> Result<()> {
        self.require_installed()?;
        let paths = self.paths();
        if !self.fs.exists(&paths.active_config()) {
            return Err(Error::NoTargetSelected {
                hint: "elmos toolchain select <target>".into(),
            });
        }
        let jobs = if jobs == 0 {
            num_cpus::get().max(1)
        } else {
            jobs
        };
        self.fs.mkdir_all(&paths.src)?;
        self.fs.mkdir_all(&paths.x_tools)?;

        let env = self.ct_ng_env(ctx)?;
        let ct_ng = paths.ct_ng().display().to_string();
        let goal = format!("build.{jobs}");
        run_stage(ctx, "build", |ctx| {
            self.exec
                .run_with_env_in_dir(ctx, &env, &paths.base, &ct_ng, &[goal.as_str()])
        })
    }

    /// `ct-ng clean`; nothing to do when crosstool-ng is not installed.
    pub fn clean(&self, ctx: &ExecCtx) -> Result<()> {
        if !self.is_installed() {
            tracing::info!("crosstool-ng not installed; nothing to clean");
            return Ok(());
        }
        let paths = self.paths();
        let env = self.ct_ng_env(ctx)?;
        let ct_ng = paths.ct_ng().display().to_string();
        run_stage(ctx, "clean", |ctx| {
            self.exec
                .run_with_env_in_dir(ctx, &env, &paths.base, &ct_ng, &["clean"])
        })
    }

    pub fn menuconfig(&self, ctx: &ExecCtx) -> Result<()> {
        self.require_installed()?;
        let paths = self.paths();
        self.fs.mkdir_all(&paths.base)?;
        let env = self.ct_ng_env(ctx)?;
        let ct_ng = paths.ct_ng().display().to_string();
        run_stage(ctx, "menuconfig", |ctx| {
            self.exec
                .run_interactive(ctx, &env, &paths.base, &ct_ng, &["menuconfig"])
        })?;
        // menuconfig writes unpatched defaults back for anything it touched.
        if self.fs.exists(&paths.active_config()) {
            self.patch_active_config()?;
        }
        Ok(())
    }

    /// Keep the active `.config` as `configs/<name>.config` so later
    /// selections of `name` reuse it.
    pub fn save_config(&self, name: &str) -> Result<PathBuf> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(Error::msg(format!("invalid config name '{name}'")));
        }
        let paths = self.paths();
        let active = paths.active_config();
        if !self.fs.exists(&active) {
            return Err(Error::NoTargetSelected {
                hint: "elmos toolchain select <target>".into(),
            });
        }
        let data = self.fs.read_file(&active)?;
        let dest = paths.configs.join(format!("{name}.config"));
        self.fs.mkdir_all(&paths.configs)?;
        self.fs.write_file(&dest, &data)?;
        Ok(dest)
    }

    pub fn list_samples(&self, ctx: &ExecCtx) -> Result<Vec<String>> {
        self.require_installed()?;
        let paths = self.paths();
        let env = self.ct_ng_env(ctx)?;
        let ct_ng = paths.ct_ng().display().to_string();
        let out = self
            .exec
            .output_with_env(ctx, &env, Some(&paths.base), &ct_ng, &["list-samples"])
            .map_err(|e| Error::stage("list-samples", e))?;
        Ok(parse_samples(&String::from_utf8_lossy(&out)))
    }

    /// Every directory under `x_tools`, sorted by name. A missing `x_tools`
    /// simply means nothing has been built yet.
    pub fn installed_toolchains(&self) -> Result<Vec<ToolchainInfo>> {
        let x_tools = self.paths().x_tools;
        if !self.fs.is_dir(&x_tools) {
            return Ok(Vec::new());
        }
        let out = self
            .fs
            .read_dir(&x_tools)?
            .into_iter()
            .filter(|e| e.is_dir)
            .map(|e| ToolchainInfo {
                installed: self.fs.is_dir(&e.path.join("bin")),
                target: e.name,
                path: e.path,
                version: None,
            })
            .collect();
        Ok(out)
    }

    pub fn find_toolchain(&self, target: &str) -> Result<Option<ToolchainInfo>> {
        Ok(self
            .installed_toolchains()?
            .into_iter()
            .find(|t| t.target == target))
    }

    /// `<target>-gcc -dumpfullversion`, or `None` when it cannot be run.
    pub fn toolchain_version(&self, ctx: &ExecCtx, info: &ToolchainInfo) -> Option<String> {
        let gcc = gcc_path(&info.path, &info.target);
        if !self.fs.exists(&gcc) {
            return None;
        }
        let gcc = gcc.display().to_string();
        match self.exec.output(ctx, &gcc, &["-dumpfullversion"]) {
            Ok(out) => {
                let v = String::from_utf8_lossy(&out).trim().to_string();
                (!v.is_empty()).then_some(v)
            }
            Err(e) => {
                tracing::debug!(target = %info.target, error = %e, "gcc version probe failed");
                None
            }
        }
    }
}

fn gcc_path(toolchain_dir: &Path, target: &str) -> PathBuf {
    toolchain_dir.join("bin").join(format!("{target}-gcc"))
}

/// Sample lines look like `[L..X]   arm-unknown-linux-gnueabi`.
pub fn parse_samples(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('['))
        .filter_map(|l| l.split_whitespace().last())
        .map(ToOwned::to_owned)
        .collect()
}
