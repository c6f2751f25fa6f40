use super::{buildable_dirs, jobs_arg, run_make, select};
use crate::config::Config;
use crate::env::{EnvList, EnvironmentBuilder};
use crate::error::{Error, Result};
use crate::executor::{ExecCtx, Executor, run_stage};
use crate::fs::FileSystem;
use crate::packages::PackageResolver;
use crate::platform::Platform;

/// Userspace programs under `apps_dir`, cross-compiled with the crosstool-ng
/// gcc so they link against its sysroot.
pub struct AppBuilder<'a> {
    config: &'a Config,
    exec: &'a dyn Executor,
    fs: &'a dyn FileSystem,
    env: EnvironmentBuilder<'a>,
}

impl<'a> AppBuilder<'a> {
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
        buildable_dirs(self.fs, &self.config.apps_dir(), &["Makefile"])
    }

    /// `CC=` for app builds. Requires the built toolchain: the bare triple
    /// prefix would pick up whatever happens to be on PATH.
    fn compiler(&self) -> Result<Option<String>> {
        let arch = self.env.arch()?;
        let Some(triple) = arch.target_triple() else {
            return Ok(None);
        };
        let prefix = self.env.cross_compile_prefix()?;
        if !prefix.starts_with('/') {
            return Err(Error::not_installed(
                format!("{triple} toolchain"),
                format!("elmos toolchain select {triple} && elmos toolchain build"),
            ));
        }
        Ok(Some(format!("{prefix}gcc")))
    }

    fn run_goal(
        &self,
        ctx: &ExecCtx,
        name: Option<&str>,
        jobs: usize,
        goal: Option<&str>,
    ) -> Result<()> {
        let root = self.config.apps_dir();
        let selected = select(self.list()?, name, "app", &root)?;
        // Only a build needs the cross compiler; clean runs without one.
        let cc = match goal {
            None => self.compiler()?,
            Some(_) => None,
        };
        let env = self.env.build_make_env()?;

        for app in selected {
            let dir = root.join(&app);
            let mut args = vec![jobs_arg(jobs)];
            if let Some(cc) = &cc {
                args.push(format!("CC={cc}"));
            }
            if let Some(goal) = goal {
                args.push(goal.to_string());
            }
            let stage = format!("app:{app}:{}", goal.unwrap_or("build"));
            run_stage(ctx, &stage, |ctx| run_make(ctx, self.exec, &env, &dir, &args))?;
        }
        Ok(())
    }

    pub fn build(&self, ctx: &ExecCtx, name: Option<&str>, jobs: usize) -> Result<()> {
        self.run_goal(ctx, name, jobs, None)
    }

    pub fn clean(&self, ctx: &ExecCtx, name: Option<&str>) -> Result<()> {
        self.run_goal(ctx, name, 1, Some("clean"))
    }
}
