#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use elmos::config::Config;
use elmos::executor::{CommandSpec, ExecCtx, Executor};
use elmos::packages::PackageResolver;
use elmos::{Error, Result};

type Hook = Box<dyn Fn(&CommandSpec) + Send + Sync>;

/// Records every command instead of running it.
#[derive(Default)]
pub struct FakeExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    outputs: Mutex<HashMap<String, Vec<u8>>>,
    paths: Mutex<HashMap<String, PathBuf>>,
    fail_programs: Mutex<Vec<String>>,
    on_execute: Mutex<Option<Hook>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned stdout for `program args...` (as rendered by `CommandSpec::display`).
    pub fn with_output(self, cmdline: &str, out: &str) -> Self {
        self.outputs
            .lock()
            .expect("outputs lock")
            .insert(cmdline.to_string(), out.as_bytes().to_vec());
        self
    }

    pub fn with_path(self, program: &str, path: impl Into<PathBuf>) -> Self {
        self.paths
            .lock()
            .expect("paths lock")
            .insert(program.to_string(), path.into());
        self
    }

    pub fn failing(self, program: &str) -> Self {
        self.fail_programs
            .lock()
            .expect("fail lock")
            .push(program.to_string());
        self
    }

    pub fn on_execute(self, hook: impl Fn(&CommandSpec) + Send + Sync + 'static) -> Self {
        *self.on_execute.lock().expect("hook lock") = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn cmdlines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls().iter().filter(|c| c.program == program).count()
    }

    fn record(&self, cmd: &CommandSpec) -> Result<()> {
        self.calls.lock().expect("calls lock").push(cmd.clone());
        let fails = self
            .fail_programs
            .lock()
            .expect("fail lock")
            .iter()
            .any(|p| p == &cmd.program);
        if fails {
            return Err(Error::msg(format!("{} exited with status 1", cmd.program)));
        }
        Ok(())
    }
}

impl Executor for FakeExecutor {
    fn execute(&self, _ctx: &ExecCtx, cmd: &CommandSpec) -> Result<()> {
        self.record(cmd)?;
        if let Some(hook) = self.on_execute.lock().expect("hook lock").as_ref() {
            hook(cmd);
        }
        Ok(())
    }

    fn capture(&self, _ctx: &ExecCtx, cmd: &CommandSpec) -> Result<Vec<u8>> {
        self.record(cmd)?;
        self.outputs
            .lock()
            .expect("outputs lock")
            .get(&cmd.display())
            .cloned()
            .ok_or_else(|| Error::msg(format!("{}: command not found", cmd.program)))
    }

    fn look_path(&self, program: &str) -> Result<PathBuf> {
        self.paths
            .lock()
            .expect("paths lock")
            .get(program)
            .cloned()
            .ok_or_else(|| Error::msg(format!("{program} not found in PATH")))
    }
}

/// Map-backed resolver. Unknown packages resolve to `""`.
#[derive(Default)]
pub struct FakePackages {
    pub prefixes: HashMap<String, String>,
    pub libexec: HashMap<String, String>,
    pub bins: HashMap<String, String>,
}

impl FakePackages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix_of(mut self, pkg: &str, prefix: &str) -> Self {
        self.prefixes.insert(pkg.into(), prefix.into());
        self
    }

    pub fn libexec_of(mut self, pkg: &str, dir: &str) -> Self {
        self.libexec.insert(pkg.into(), dir.into());
        self
    }

    pub fn bin_of(mut self, pkg: &str, dir: &str) -> Self {
        self.bins.insert(pkg.into(), dir.into());
        self
    }
}

impl PackageResolver for FakePackages {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn prefix(&self, pkg: &str) -> String {
        self.prefixes.get(pkg).cloned().unwrap_or_default()
    }

    fn bin(&self, pkg: &str) -> String {
        match self.bins.get(pkg) {
            Some(b) => b.clone(),
            None => match self.prefixes.get(pkg) {
                Some(p) if !p.is_empty() => format!("{p}/bin"),
                _ => String::new(),
            },
        }
    }

    fn libexec_bin(&self, pkg: &str) -> String {
        match self.libexec.get(pkg) {
            Some(d) => d.clone(),
            None => match self.prefixes.get(pkg) {
                Some(p) if !p.is_empty() => format!("{p}/libexec/gnubin"),
                _ => String::new(),
            },
        }
    }

    fn list_installed(&self) -> Result<Vec<String>> {
        let mut pkgs: Vec<String> = self.prefixes.keys().cloned().collect();
        pkgs.sort();
        Ok(pkgs)
    }

    fn clear_cache(&self) {}
}

/// Config rooted in a scratch dir: project at `<root>/proj`, workspace at
/// `<root>/ws`.
pub fn scratch_config(root: &Path, arch: &str) -> Config {
    let mut cfg = Config::default();
    cfg.paths.project_root = root.join("proj");
    cfg.paths.workspace_dir = Some(root.join("ws"));
    cfg.build.arch = arch.to_string();
    cfg
}

pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, b"").expect("touch");
}

pub fn env_value<'a>(env: &'a [String], key: &str) -> Option<&'a str> {
    env.iter()
        .filter_map(|e| e.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}
