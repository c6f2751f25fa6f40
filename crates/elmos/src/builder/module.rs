use std::path::PathBuf;

use super::{buildable_dirs, jobs_arg, require_kernel_config, run_make, select};
use crate::config::Config;
use crate::env::{EnvList, EnvironmentBuilder};
use crate::error::Result;
use crate::executor::{ExecCtx, Executor, run_stage};
use crate::fs::FileSystem;
use crate::packages::PackageResolver;
use crate::platform::Platform;

const MODULE_MARKERS: &[&str] = &["Kbuild", "Makefile"];

/// Out-of-tree kernel modules, one directory each under `modules_dir`.
pub struct ModuleBuilder<'a> {
    config: &'a Config,
    exec: &'a dyn Executor,
    fs: &'a dyn FileSystem,
    env: EnvironmentBuilder<'a>,
}

impl<'a> ModuleBuilder<'a> {
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

    pub fn list(&self) -> Result<Vec<String>> {
        buildable_dirs(self.fs, &self.config.modules_dir(), MODULE_MARKERS)
    }

    fn module_dir(&self, name: &str) -> PathBuf {
        self.config.modules_dir().join(name)
    }

    fn run_goal(&self, ctx: &ExecCtx, name: Option<&str>, jobs: usize, goal: &str) -> Result<()> {
        let selected = select(self.list()?, name, "module", &self.config.modules_dir())?;
        let kernel_dir = self.config.kernel_dir();
        require_kernel_config(self.fs, &kernel_dir)?;
        let env = self.env.build_make_env()?;

        for module in selected {
            let args = vec![
                jobs_arg(jobs),
                format!("M={}", self.module_dir(&module).display()),
                goal.to_string(),
            ];
            run_stage(ctx, &format!("module:{module}:{goal}"), |ctx| {
                run_make(ctx, self.exec, &env, &kernel_dir, &args)
            })?;
        }
        Ok(())
    }

    /// Build one module, or all of them when `name` is `None`.
    pub fn build(&self, ctx: &ExecCtx, name: Option<&str>, jobs: usize) -> Result<()> {
        self.run_goal(ctx, name, jobs, "modules")
    }

    pub fn clean(&self, ctx: &ExecCtx, name: Option<&str>) -> Result<()> {
        self.run_goal(ctx, name, 1, "clean")
    }
}
