//! Line-oriented model of a crosstool-ng `.config`.
//!
//! Only the three line shapes kconfig emits are distinguished; everything
//! else is carried through untouched so rendering is lossless.

use std::sync::LazyLock;

use regex::Regex;

use super::ToolchainPaths;

static ASSIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_]+)=(.*)$").expect("assignment regex"));
static UNSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^# ([A-Za-z0-9_]+) is not set$").expect("unset regex"));

/// Companion tools ct-ng would build for the host. Mixing them with the
/// Homebrew toolchain on macOS breaks the build.
pub const DISABLED_COMP_TOOLS: &[&str] = &[
    "CT_COMP_TOOLS_M4",
    "CT_COMP_TOOLS_MAKE",
    "CT_COMP_TOOLS_AUTOCONF",
    "CT_COMP_TOOLS_AUTOMAKE",
    "CT_COMP_TOOLS_LIBTOOL",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Quoted(String),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Assign { key: String, value: Value },
    Unset(String),
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtConfig {
    lines: Vec<Line>,
    trailing_newline: bool,
}

impl CtConfig {
    pub fn parse(text: &str) -> Self {
        let lines = text.lines().map(parse_line).collect();
        Self {
            lines,
            trailing_newline: text.is_empty() || text.ends_with('\n'),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|l| match l {
            Line::Assign { key: k, value } if k == key => Some(match value {
                Value::Quoted(v) | Value::Raw(v) => v.as_str(),
            }),
            _ => None,
        })
    }

    pub fn is_unset(&self, key: &str) -> bool {
        self.lines
            .iter()
            .any(|l| matches!(l, Line::Unset(k) if k == key))
    }

    /// Rewrite the quoted value of `key`. Absent or unquoted keys are left
    /// alone; returns whether anything matched.
    pub fn set_quoted(&mut self, key: &str, new_value: &str) -> bool {
        let mut hit = false;
        for line in &mut self.lines {
            if let Line::Assign {
                key: k,
                value: Value::Quoted(v),
            } = line
            {
                if k.as_str() == key {
                    *v = new_value.to_string();
                    hit = true;
                }
            }
        }
        hit
    }

    /// Literal substring replacement inside every assigned value.
    pub fn replace_in_values(&mut self, from: &str, to: &str) {
        for line in &mut self.lines {
            if let Line::Assign {
                value: Value::Quoted(v) | Value::Raw(v),
                ..
            } = line
            {
                if v.contains(from) {
                    *v = v.replace(from, to);
                }
            }
        }
    }

    /// Turn `KEY=...` into kconfig's `# KEY is not set`.
    pub fn disable(&mut self, key: &str) {
        for line in &mut self.lines {
            if matches!(line, Line::Assign { key: k, .. } if k.as_str() == key) {
                *line = Line::Unset(key.to_string());
            }
        }
    }

    /// Point install prefix and tarball cache into the workspace and drop
    /// the companion tools. Applying it twice is the same as applying it once.
    pub fn apply_workspace_paths(&mut self, paths: &ToolchainPaths) {
        let x_tools = paths.x_tools.display().to_string();
        let src = paths.src.display().to_string();

        for home in ["$HOME", "${HOME}"] {
            self.replace_in_values(&format!("{home}/x-tools"), &x_tools);
            self.replace_in_values(&format!("{home}/src"), &src);
        }
        self.set_quoted("CT_PREFIX_DIR", &format!("{x_tools}/${{CT_TARGET}}"));
        self.set_quoted("CT_LOCAL_TARBALLS_DIR", &src);
        for key in DISABLED_COMP_TOOLS {
            self.disable(key);
        }
    }

    pub fn render(&self) -> String {
        let mut out = self
            .lines
            .iter()
            .map(|l| match l {
                Line::Assign {
                    key,
                    value: Value::Quoted(v),
                } => format!("{key}=\"{v}\""),
                Line::Assign {
                    key,
                    value: Value::Raw(v),
                } => format!("{key}={v}"),
                Line::Unset(key) => format!("# {key} is not set"),
                Line::Other(raw) => raw.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

fn parse_line(raw: &str) -> Line {
    if let Some(c) = ASSIGN_RE.captures(raw) {
        let key = c[1].to_string();
        let val = &c[2];
        let value = match val
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
        {
            Some(inner) if val.len() >= 2 => Value::Quoted(inner.to_string()),
            _ => Value::Raw(val.to_string()),
        };
        return Line::Assign { key, value };
    }
    if let Some(c) = UNSET_RE.captures(raw) {
        return Line::Unset(c[1].to_string());
    }
    Line::Other(raw.to_string())
}

/// Patch `.config` text for the given workspace layout.
pub fn patch_config_text(text: &str, paths: &ToolchainPaths) -> String {
    let mut cfg = CtConfig::parse(text);
    cfg.apply_workspace_paths(paths);
    cfg.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> ToolchainPaths {
        ToolchainPaths::new("/Volumes/elmos/toolchains")
    }

    const SAMPLE: &str = "\
#
# Automatically generated file; DO NOT EDIT.
# crosstool-NG 1.26.0 Configuration
#
CT_CONFIGURE_has_static_link=y
CT_LOCAL_TARBALLS_DIR=\"${HOME}/src\"
CT_SAVE_TARBALLS=y
CT_PREFIX_DIR=\"$HOME/x-tools/${CT_TARGET}\"
CT_COMP_TOOLS_M4=y
CT_COMP_TOOLS_MAKE=y
# CT_COMP_TOOLS_AUTOCONF is not set
CT_COMP_TOOLS_LIBTOOL=y
CT_PARALLEL_JOBS=0
";

    #[test]
    fn rewrites_prefix_and_tarball_dir() {
        let out = patch_config_text(SAMPLE, &paths());
        assert!(out.contains(
            "CT_PREFIX_DIR=\"/Volumes/elmos/toolchains/x-tools/${CT_TARGET}\"\n"
        ));
        assert!(out.contains("CT_LOCAL_TARBALLS_DIR=\"/Volumes/elmos/toolchains/src\"\n"));
        assert!(!out.contains("$HOME"));
        assert!(!out.contains("${HOME}"));
    }

    #[test]
    fn disables_companion_tools() {
        let out = patch_config_text(SAMPLE, &paths());
        let cfg = CtConfig::parse(&out);
        for key in DISABLED_COMP_TOOLS {
            assert_eq!(cfg.get(key), None, "{key} still set");
        }
        assert!(cfg.is_unset("CT_COMP_TOOLS_M4"));
        assert!(cfg.is_unset("CT_COMP_TOOLS_AUTOCONF"));
        // CT_COMP_TOOLS_AUTOMAKE was absent; it must not be invented.
        assert!(!cfg.is_unset("CT_COMP_TOOLS_AUTOMAKE"));
        assert_eq!(cfg.get("CT_PARALLEL_JOBS"), Some("0"));
    }

    #[test]
    fn patching_is_idempotent() {
        let input = "CT_PREFIX_DIR=\"$HOME/x-tools/${CT_TARGET}\"\n";
        let once = patch_config_text(input, &paths());
        let twice = patch_config_text(&once, &paths());
        assert_eq!(once, twice);
        assert_eq!(
            once,
            "CT_PREFIX_DIR=\"/Volumes/elmos/toolchains/x-tools/${CT_TARGET}\"\n"
        );

        let full_once = patch_config_text(SAMPLE, &paths());
        assert_eq!(patch_config_text(&full_once, &paths()), full_once);
    }

    #[test]
    fn set_quoted_ignores_missing_and_unquoted_keys() {
        let mut cfg = CtConfig::parse("CT_PARALLEL_JOBS=0\n");
        assert!(!cfg.set_quoted("CT_PARALLEL_JOBS", "8"));
        assert!(!cfg.set_quoted("CT_PREFIX_DIR", "/x"));
        assert_eq!(cfg.render(), "CT_PARALLEL_JOBS=0\n");
    }

    #[test]
    fn unrelated_lines_round_trip() {
        let text = "# comment\n\nCT_FOO=\"a b\"\n  weird line\n";
        assert_eq!(CtConfig::parse(text).render(), text);
    }
}
