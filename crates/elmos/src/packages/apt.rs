use std::sync::Arc;

use super::{PackageResolver, PrefixCache, stdout_lines};
use crate::error::Result;
use crate::executor::{ExecCtx, Executor};

/// Debian packages install under `/usr`; that is also the fallback when
/// `dpkg` knows nothing about the package.
pub(crate) const LINUX_PREFIX: &str = "/usr";

pub struct AptResolver {
    exec: Arc<dyn Executor>,
    ctx: ExecCtx,
    cache: PrefixCache,
}

impl AptResolver {
    pub fn new(exec: Arc<dyn Executor>) -> Self {
        Self {
            exec,
            ctx: ExecCtx::quiet(),
            cache: PrefixCache::default(),
        }
    }
}

impl PackageResolver for AptResolver {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn prefix(&self, pkg: &str) -> String {
        self.cache.get_or_resolve(pkg, || {
            match self.exec.output(&self.ctx, "dpkg", &["-L", pkg]) {
                Ok(out) if !stdout_lines(&out).is_empty() => {}
                Ok(_) => tracing::debug!(pkg, "dpkg -L listed no files"),
                Err(e) => tracing::debug!(pkg, error = %e, "dpkg -L failed"),
            }
            LINUX_PREFIX.to_string()
        })
    }

    fn list_installed(&self) -> Result<Vec<String>> {
        let out = self
            .exec
            .output(&self.ctx, "dpkg-query", &["-W", "-f=${Package}\n"])?;
        Ok(stdout_lines(&out))
    }

    fn is_installed(&self, pkg: &str) -> bool {
        self.exec
            .output(&self.ctx, "dpkg", &["-s", pkg])
            .map(|out| String::from_utf8_lossy(&out).contains("Status: install ok installed"))
            .unwrap_or(false)
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
