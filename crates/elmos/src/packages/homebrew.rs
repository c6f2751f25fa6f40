use std::sync::Arc;

use super::{PackageResolver, PrefixCache, join_prefix, stdout_lines};
use crate::error::Result;
use crate::executor::{ExecCtx, Executor};

pub struct HomebrewResolver {
    exec: Arc<dyn Executor>,
    ctx: ExecCtx,
    cache: PrefixCache,
}

impl HomebrewResolver {
    pub fn new(exec: Arc<dyn Executor>) -> Self {
        Self {
            exec,
            ctx: ExecCtx::quiet(),
            cache: PrefixCache::default(),
        }
    }
}

impl PackageResolver for HomebrewResolver {
    fn name(&self) -> &'static str {
        "homebrew"
    }

    fn prefix(&self, pkg: &str) -> String {
        self.cache.get_or_resolve(pkg, || {
            match self.exec.output(&self.ctx, "brew", &["--prefix", pkg]) {
                Ok(out) => String::from_utf8_lossy(&out).trim().to_string(),
                Err(e) => {
                    tracing::debug!(pkg, error = %e, "brew --prefix failed");
                    String::new()
                }
            }
        })
    }

    fn libexec_bin(&self, pkg: &str) -> String {
        join_prefix(&self.prefix(pkg), "libexec/gnubin")
    }

    fn list_installed(&self) -> Result<Vec<String>> {
        let out = self
            .exec
            .output(&self.ctx, "brew", &["list", "--formulae"])?;
        Ok(stdout_lines(&out))
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
