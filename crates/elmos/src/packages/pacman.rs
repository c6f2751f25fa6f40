use std::sync::Arc;

use super::apt::LINUX_PREFIX;
use super::{PackageResolver, PrefixCache, stdout_lines};
use crate::error::Result;
use crate::executor::{ExecCtx, Executor};

pub struct PacmanResolver {
    exec: Arc<dyn Executor>,
    ctx: ExecCtx,
    cache: PrefixCache,
}

impl PacmanResolver {
    pub fn new(exec: Arc<dyn Executor>) -> Self {
        Self {
            exec,
            ctx: ExecCtx::quiet(),
            cache: PrefixCache::default(),
        }
    }
}

impl PackageResolver for PacmanResolver {
    fn name(&self) -> &'static str {
        "pacman"
    }

    fn prefix(&self, pkg: &str) -> String {
        self.cache.get_or_resolve(pkg, || {
            if let Err(e) = self.exec.output(&self.ctx, "pacman", &["-Ql", pkg]) {
                tracing::debug!(pkg, error = %e, "pacman -Ql failed");
            }
            LINUX_PREFIX.to_string()
        })
    }

    // Arch merged /usr/sbin into /usr/bin.
    fn sbin(&self, _pkg: &str) -> String {
        "/usr/bin".to_string()
    }

    fn list_installed(&self) -> Result<Vec<String>> {
        let out = self.exec.output(&self.ctx, "pacman", &["-Qq"])?;
        Ok(stdout_lines(&out))
    }

    fn is_installed(&self, pkg: &str) -> bool {
        self.exec.output(&self.ctx, "pacman", &["-Qq", pkg]).is_ok()
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
