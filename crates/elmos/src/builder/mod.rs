//! Consumers of the build environment: kernel, out-of-tree modules and
//! userspace apps. Each validates its inputs against the static tables and
//! hands `make` the environment from
//! [`EnvironmentBuilder`](crate::env::EnvironmentBuilder).

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::executor::{ExecCtx, Executor};
use crate::fs::FileSystem;

mod app;
mod kernel;
mod module;

pub use app::AppBuilder;
pub use kernel::KernelBuilder;
pub use module::ModuleBuilder;

fn jobs_arg(jobs: usize) -> String {
    let jobs = if jobs == 0 {
        num_cpus::get().max(1)
    } else {
        jobs
    };
    format!("-j{jobs}")
}

fn run_make(
    ctx: &ExecCtx,
    exec: &dyn Executor,
    env: &[String],
    make_dir: &Path,
    args: &[String],
) -> Result<()> {
    let dir_arg = make_dir.display().to_string();
    let mut argv: Vec<&str> = vec!["-C", dir_arg.as_str()];
    argv.extend(args.iter().map(String::as_str));
    exec.run_with_env_in_dir(ctx, env, make_dir, "make", &argv)
}

/// Subdirectories of `root` containing any of `markers`, sorted by name.
fn buildable_dirs(fs: &dyn FileSystem, root: &Path, markers: &[&str]) -> Result<Vec<String>> {
    if !fs.is_dir(root) {
        return Ok(Vec::new());
    }
    Ok(fs
        .read_dir(root)?
        .into_iter()
        .filter(|e| e.is_dir && markers.iter().any(|m| fs.exists(&e.path.join(m))))
        .map(|e| e.name)
        .collect())
}

/// `Some(name)` must be one of `known`; `None` selects all of them.
fn select(known: Vec<String>, name: Option<&str>, kind: &str, root: &Path) -> Result<Vec<String>> {
    match name {
        Some(n) if known.iter().any(|k| k == n) => Ok(vec![n.to_string()]),
        Some(n) => Err(Error::msg(format!(
            "unknown {kind} '{n}' under {} (known: {})",
            root.display(),
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        ))),
        None => Ok(known),
    }
}

fn kernel_config_path(kernel_dir: &Path) -> PathBuf {
    kernel_dir.join(".config")
}

fn require_kernel_config(fs: &dyn FileSystem, kernel_dir: &Path) -> Result<()> {
    if fs.exists(&kernel_config_path(kernel_dir)) {
        Ok(())
    } else {
        Err(Error::not_installed(
            format!("kernel config in {}", kernel_dir.display()),
            "elmos kernel config defconfig",
        ))
    }
}
