use std::path::PathBuf;

use super::{jobs_arg, kernel_config_path, require_kernel_config, run_make};
use crate::arch::{self, ArchConfig};
use crate::config::Config;
use crate::env::{EnvList, EnvironmentBuilder};
use crate::error::{Error, Result};
use crate::executor::{ExecCtx, Executor, run_stage};
use crate::fs::FileSystem;
use crate::packages::PackageResolver;
use crate::platform::Platform;

pub struct KernelBuilder<'a> {
    config: &'a Config,
    exec: &'a dyn Executor,
    fs: &'a dyn FileSystem,
    env: EnvironmentBuilder<'a>,
}

impl<'a> KernelBuilder<'a> {
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
            env: EnvironmentBuilder::new(config, packages, fs, platform),
        }
    }

    pub fn with_base_env(mut self, env: EnvList) -> Self {
        self.env = self.env.with_base_env(env);
        self
    }

    pub fn arch(&self) -> Result<&'static ArchConfig> {
        arch::require(&self.config.build.arch)
    }

    pub fn source_dir(&self) -> PathBuf {
        self.config.kernel_dir()
    }

    pub fn is_configured(&self) -> bool {
        self.fs.exists(&kernel_config_path(&self.source_dir()))
    }

    /// `arch/<arch>/boot/<image>`, the file QEMU boots.
    pub fn image_path(&self) -> Result<PathBuf> {
        let arch = self.arch()?;
        Ok(self
            .source_dir()
            .join("arch")
            .join(arch.kernel_arch)
            .join("boot")
            .join(arch.kernel_image))
    }

    fn require_source(&self) -> Result<PathBuf> {
        let dir = self.source_dir();
        if !self.fs.exists(&dir.join("Makefile")) {
            return Err(Error::not_installed(
                format!("kernel source in {}", dir.display()),
                format!("git clone https://github.com/torvalds/linux {}", dir.display()),
            ));
        }
        Ok(dir)
    }

    pub fn configure(&self, ctx: &ExecCtx, kind: &str) -> Result<()> {
        if !arch::is_valid_config_type(kind) {
            return Err(Error::msg(format!(
                "invalid kernel config type '{kind}' (valid: {})",
                arch::KERNEL_CONFIG_TYPES.join(", ")
            )));
        }
        let dir = self.require_source()?;
        let env = self.env.build_make_env()?;
        run_stage(ctx, "kernel-config", |ctx| {
            if kind == "menuconfig" {
                let dir_arg = dir.display().to_string();
                return self
                    .exec
                    .run_interactive(ctx, &env, &dir, "make", &["-C", dir_arg.as_str(), kind]);
            }
            run_make(ctx, self.exec, &env, &dir, &[kind.to_string()])
        })
    }

    /// Build `targets`, or the arch's defaults when empty.
    pub fn build(&self, ctx: &ExecCtx, jobs: usize, targets: &[String]) -> Result<()> {
        let arch = self.arch()?;
        let targets: Vec<String> = if targets.is_empty() {
            arch.default_targets.iter().map(|t| t.to_string()).collect()
        } else {
            targets.to_vec()
        };
        if let Some(bad) = targets.iter().find(|t| !arch::is_valid_build_target(t)) {
            return Err(Error::msg(format!(
                "invalid kernel build target '{bad}' (valid: {})",
                arch::VALID_BUILD_TARGETS.join(", ")
            )));
        }
        let dir = self.require_source()?;
        require_kernel_config(self.fs, &dir)?;

        let env = self.env.build_make_env()?;
        let mut args = vec![jobs_arg(jobs)];
        args.extend(targets);
        run_stage(ctx, "kernel-build", |ctx| {
            run_make(ctx, self.exec, &env, &dir, &args)
        })
    }

    /// `make clean`, or `make mrproper` when `deep` (drops `.config` too).
    pub fn clean(&self, ctx: &ExecCtx, deep: bool) -> Result<()> {
        let dir = self.require_source()?;
        let env = self.env.build_make_env()?;
        let goal = if deep { "mrproper" } else { "clean" };
        run_stage(ctx, "kernel-clean", |ctx| {
            run_make(ctx, self.exec, &env, &dir, &[goal.to_string()])
        })
    }
}
