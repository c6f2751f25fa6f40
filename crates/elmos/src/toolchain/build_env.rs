use std::path::{Path, PathBuf};

use super::ToolchainManager;
use crate::env::{EnvList, prepend_path};
use crate::error::Result;
use crate::executor::ExecCtx;

/// Host libraries crosstool-ng links its own tools against. Several are
/// keg-only on Homebrew.
const BUILD_DEPS: &[&str] = &["bison", "flex", "ncurses", "zlib", "binutils"];

/// Homebrew formulae shipping GNU tools under `libexec/gnubin`.
const GNU_TOOLS: &[&str] = &["coreutils", "findutils", "gnu-sed", "gnu-tar", "grep", "make"];

/// Keg-only generators ct-ng needs ahead of the ancient macOS versions.
const KEG_ONLY_BINS: &[&str] = &["bison", "flex"];

/// Homebrew gcc majors to probe, in preference order.
const GCC_MAJORS: &[&str] = &["14", "15", "13", "12"];

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn join_with_existing(ours: &[String], sep: &str, existing: Option<&str>) -> String {
    let mut parts = ours.to_vec();
    if let Some(e) = existing.filter(|e| !e.is_empty()) {
        parts.push(e.to_string());
    }
    parts.join(sep)
}

impl ToolchainManager<'_> {
    fn local_bin(&self) -> Option<PathBuf> {
        self.home.as_ref().map(|h| h.join(".local/bin"))
    }

    /// ct-ng refuses Apple clang masquerading as gcc, so put a real gcc
    /// first on PATH via `~/.local/bin`. Live links are left alone; dangling
    /// ones are replaced.
    pub fn ensure_gcc_links(&self) -> Result<()> {
        if !self.platform.is_macos() {
            return Ok(());
        }
        let Some(local_bin) = self.local_bin() else {
            tracing::warn!("no home directory; cannot link Homebrew gcc");
            return Ok(());
        };
        let gcc_link = local_bin.join("gcc");
        if self.fs.exists(&gcc_link) {
            return Ok(());
        }
        let brew_bin = self.packages.bin("gcc");
        if brew_bin.is_empty() {
            tracing::warn!("Homebrew gcc not found; crosstool-ng will reject clang");
            return Ok(());
        }
        let brew_bin = Path::new(&brew_bin);

        for major in GCC_MAJORS {
            let gcc = brew_bin.join(format!("gcc-{major}"));
            if !self.fs.exists(&gcc) {
                continue;
            }
            self.fs.mkdir_all(&local_bin)?;
            self.relink(&gcc, &gcc_link)?;
            let gxx = brew_bin.join(format!("g++-{major}"));
            let gxx_link = local_bin.join("g++");
            if self.fs.exists(&gxx) && !self.fs.exists(&gxx_link) {
                self.relink(&gxx, &gxx_link)?;
            }
            tracing::info!(gcc = %gcc.display(), "linked Homebrew gcc into ~/.local/bin");
            return Ok(());
        }
        tracing::warn!(
            "no gcc-{{{}}} under {}; crosstool-ng will reject clang",
            GCC_MAJORS.join(","),
            brew_bin.display()
        );
        Ok(())
    }

    /// Point `link` at `target`, dropping a dangling link left by an
    /// uninstalled gcc first.
    fn relink(&self, target: &Path, link: &Path) -> Result<()> {
        if self.fs.is_symlink(link) {
            tracing::info!(link = %link.display(), "replacing dangling link");
            self.fs.remove_file(link)?;
        }
        self.fs.symlink(target, link)
    }

    /// `toolchain_build_env` plus the gcc links ct-ng needs. Linking is
    /// skipped on dry runs and never fails the command.
    pub(super) fn ct_ng_env(&self, ctx: &ExecCtx) -> Result<Vec<String>> {
        if ctx.dry_run {
            return self.toolchain_build_env();
        }
        if let Err(e) = self.ensure_gcc_links() {
            tracing::warn!(error = %e, "could not link Homebrew gcc");
        }
        self.toolchain_build_env()
    }

    /// Environment for building crosstool-ng and running `ct-ng`.
    pub fn toolchain_build_env(&self) -> Result<Vec<String>> {
        let paths = self.paths();
        let mut env: EnvList = self.base_env.clone();

        env.set("CT_PREFIX", &paths.x_tools.display().to_string());
        env.set(
            "ELMOS_WORKSPACE",
            &self.config.workspace_dir().display().to_string(),
        );

        let mut ldflags = Vec::new();
        let mut cppflags = Vec::new();
        let mut pkg_config = Vec::new();
        for dep in BUILD_DEPS {
            let lib = self.packages.lib(dep);
            if !lib.is_empty() && self.fs.is_dir(Path::new(&lib)) {
                push_unique(&mut ldflags, format!("-L{lib}"));
                let pc = format!("{lib}/pkgconfig");
                if self.fs.is_dir(Path::new(&pc)) {
                    push_unique(&mut pkg_config, pc);
                }
            }
            let include = self.packages.include(dep);
            if !include.is_empty() && self.fs.is_dir(Path::new(&include)) {
                push_unique(&mut cppflags, format!("-I{include}"));
            }
        }
        if !ldflags.is_empty() {
            let v = join_with_existing(&ldflags, " ", env.get("LDFLAGS"));
            env.set("LDFLAGS", &v);
        }
        if !cppflags.is_empty() {
            let v = join_with_existing(&cppflags, " ", env.get("CPPFLAGS"));
            env.set("CPPFLAGS", &v);
        }
        if !pkg_config.is_empty() {
            let v = join_with_existing(&pkg_config, ":", env.get("PKG_CONFIG_PATH"));
            env.set("PKG_CONFIG_PATH", &v);
        }

        if let Ok(gmake) = self.exec.look_path("gmake") {
            env.set("CT_MAKE_FOR_BUILD", &gmake.display().to_string());
        }

        let mut dirs = Vec::<String>::new();
        if let Some(local_bin) = self.local_bin() {
            dirs.push(local_bin.display().to_string());
        }
        for tool in GNU_TOOLS {
            dirs.push(self.packages.libexec_bin(tool));
        }
        if self.platform.is_macos() {
            for pkg in KEG_ONLY_BINS {
                dirs.push(self.packages.bin(pkg));
            }
        }
        let inherited = env.get("PATH").unwrap_or_default().to_string();
        env.set("PATH", &prepend_path(&dirs, &inherited));

        Ok(env.into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_keep_existing_values_last() {
        let ours = vec!["-L/opt/zlib/lib".to_string()];
        assert_eq!(
            join_with_existing(&ours, " ", Some("-L/usr/local/lib")),
            "-L/opt/zlib/lib -L/usr/local/lib"
        );
        assert_eq!(join_with_existing(&ours, " ", Some("")), "-L/opt/zlib/lib");
    }
}
