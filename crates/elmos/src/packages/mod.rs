//! Host package lookup.
//!
//! Resolvers answer "where did the host package manager put `pkg`?". A miss
//! is always the empty string (or `false`), never an error: callers fall back
//! to a sensible default.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::executor::Executor;
use crate::platform::Platform;

mod apt;
mod homebrew;
mod pacman;

pub use apt::AptResolver;
pub use homebrew::HomebrewResolver;
pub use pacman::PacmanResolver;

pub trait PackageResolver: Send + Sync {
    fn name(&self) -> &'static str;
    /// Install prefix of `pkg`, or `""` when unresolvable.
    fn prefix(&self, pkg: &str) -> String;
    fn list_installed(&self) -> Result<Vec<String>>;
    fn clear_cache(&self);

    fn bin(&self, pkg: &str) -> String {
        join_prefix(&self.prefix(pkg), "bin")
    }

    fn sbin(&self, pkg: &str) -> String {
        join_prefix(&self.prefix(pkg), "sbin")
    }

    fn include(&self, pkg: &str) -> String {
        join_prefix(&self.prefix(pkg), "include")
    }

    fn lib(&self, pkg: &str) -> String {
        join_prefix(&self.prefix(pkg), "lib")
    }

    /// GNU tools installed with a `g` prefix keep their plain names here.
    /// Only Homebrew has this layout.
    fn libexec_bin(&self, _pkg: &str) -> String {
        String::new()
    }

    fn is_installed(&self, pkg: &str) -> bool {
        self.list_installed()
            .map(|pkgs| pkgs.iter().any(|p| p == pkg))
            .unwrap_or(false)
    }
}

pub(crate) fn join_prefix(prefix: &str, sub: &str) -> String {
    if prefix.is_empty() {
        return String::new();
    }
    format!("{}/{sub}", prefix.trim_end_matches('/'))
}

pub(crate) fn stdout_lines(out: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(out)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Per-resolver prefix cache. Misses are cached too; `clear` forgets both.
#[derive(Debug, Default)]
pub(crate) struct PrefixCache {
    inner: Mutex<HashMap<String, String>>,
}

impl PrefixCache {
    pub fn get_or_resolve(&self, pkg: &str, resolve: impl FnOnce() -> String) -> String {
        if let Ok(g) = self.inner.lock() {
            if let Some(hit) = g.get(pkg) {
                return hit.clone();
            }
        }
        let resolved = resolve();
        if let Ok(mut g) = self.inner.lock() {
            g.insert(pkg.to_string(), resolved.clone());
        }
        resolved
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.inner.lock() {
            g.clear();
        }
    }
}

/// Pick the resolver for this host. Called once at startup.
pub fn for_host(platform: Platform, exec: Arc<dyn Executor>) -> Box<dyn PackageResolver> {
    match platform {
        Platform::MacOs => Box::new(HomebrewResolver::new(exec)),
        Platform::Linux | Platform::Wsl2 => {
            if exec.look_path("pacman").is_ok() {
                Box::new(PacmanResolver::new(exec))
            } else {
                Box::new(AptResolver::new(exec))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_prefix_keeps_empty_sentinel() {
        assert_eq!(join_prefix("", "bin"), "");
        assert_eq!(join_prefix("/opt/homebrew/opt/bison/", "bin"), "/opt/homebrew/opt/bison/bin");
    }

    #[test]
    fn prefix_cache_resolves_once() {
        let cache = PrefixCache::default();
        let mut calls = 0;
        for _ in 0..3 {
            let got = cache.get_or_resolve("flex", || {
                calls += 1;
                "/usr".to_string()
            });
            assert_eq!(got, "/usr");
        }
        assert_eq!(calls, 1);
        cache.clear();
        cache.get_or_resolve("flex", || {
            calls += 1;
            String::new()
        });
        assert_eq!(calls, 2);
    }
}
