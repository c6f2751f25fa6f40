//! Static per-architecture build facts.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchConfig {
    pub name: &'static str,
    /// Value passed as `ARCH=` to the kernel build.
    pub kernel_arch: &'static str,
    /// Image file under `arch/<kernel_arch>/boot/`.
    pub kernel_image: &'static str,
    pub default_targets: &'static [&'static str],
    pub qemu_binary: &'static str,
    pub qemu_machine: &'static str,
    pub qemu_cpu: &'static str,
    /// Empty when the arch is built with the host's LLVM only.
    pub gcc_binary: &'static str,
    pub gdb_binary: &'static str,
    pub toolchain_pkg: &'static str,
}

pub const ARCHES: &[ArchConfig] = &[
    ArchConfig {
        name: "arm64",
        kernel_arch: "arm64",
        kernel_image: "Image",
        default_targets: &["Image", "dtbs", "modules"],
        qemu_binary: "qemu-system-aarch64",
        qemu_machine: "virt",
        qemu_cpu: "cortex-a72",
        gcc_binary: "aarch64-unknown-linux-gnu-gcc",
        gdb_binary: "aarch64-unknown-linux-gnu-gdb",
        toolchain_pkg: "aarch64-unknown-linux-gnu",
    },
    ArchConfig {
        name: "arm",
        kernel_arch: "arm",
        kernel_image: "zImage",
        default_targets: &["zImage", "dtbs", "modules"],
        qemu_binary: "qemu-system-arm",
        qemu_machine: "virt",
        qemu_cpu: "cortex-a15",
        gcc_binary: "arm-unknown-linux-gnueabi-gcc",
        gdb_binary: "arm-unknown-linux-gnueabi-gdb",
        toolchain_pkg: "arm-unknown-linux-gnueabi",
    },
    ArchConfig {
        name: "riscv",
        kernel_arch: "riscv",
        kernel_image: "Image",
        default_targets: &["Image", "modules"],
        qemu_binary: "qemu-system-riscv64",
        qemu_machine: "virt",
        qemu_cpu: "rv64",
        gcc_binary: "riscv64-unknown-linux-gnu-gcc",
        gdb_binary: "riscv64-unknown-linux-gnu-gdb",
        toolchain_pkg: "riscv64-unknown-linux-gnu",
    },
    ArchConfig {
        name: "x86_64",
        kernel_arch: "x86_64",
        kernel_image: "bzImage",
        default_targets: &["bzImage", "modules"],
        qemu_binary: "qemu-system-x86_64",
        qemu_machine: "q35",
        qemu_cpu: "max",
        gcc_binary: "",
        gdb_binary: "gdb",
        toolchain_pkg: "",
    },
];

/// Kernel `make` goals the builders accept.
pub const VALID_BUILD_TARGETS: &[&str] = &[
    "all",
    "vmlinux",
    "Image",
    "Image.gz",
    "zImage",
    "bzImage",
    "dtbs",
    "modules",
    "modules_prepare",
    "headers_install",
];

/// Kernel configuration goals accepted by `kernel config`.
pub const KERNEL_CONFIG_TYPES: &[&str] = &[
    "defconfig",
    "tinyconfig",
    "allnoconfig",
    "allyesconfig",
    "allmodconfig",
    "olddefconfig",
    "oldconfig",
    "menuconfig",
    "kvm_guest.config",
];

pub fn lookup(name: &str) -> Option<&'static ArchConfig> {
    ARCHES.iter().find(|a| a.name == name)
}

pub fn require(name: &str) -> Result<&'static ArchConfig> {
    lookup(name).ok_or_else(|| {
        let known = ARCHES.iter().map(|a| a.name).collect::<Vec<_>>().join(", ");
        Error::msg(format!("unknown arch '{name}' (known: {known})"))
    })
}

impl ArchConfig {
    /// Canonical target triple, e.g. `aarch64-unknown-linux-gnu`.
    pub fn target_triple(&self) -> Option<&'static str> {
        self.gcc_binary
            .strip_suffix("-gcc")
            .filter(|t| !t.is_empty())
    }
}

pub fn is_valid_build_target(target: &str) -> bool {
    VALID_BUILD_TARGETS.contains(&target)
}

pub fn is_valid_config_type(kind: &str) -> bool {
    KERNEL_CONFIG_TYPES.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcc_binaries_end_in_gcc() {
        for arch in ARCHES {
            if arch.gcc_binary.is_empty() {
                assert_eq!(arch.target_triple(), None);
                continue;
            }
            assert!(arch.gcc_binary.ends_with("-gcc"), "{}", arch.name);
            assert_eq!(arch.target_triple(), Some(arch.toolchain_pkg));
        }
    }

    #[test]
    fn default_targets_are_valid() {
        for arch in ARCHES {
            for t in arch.default_targets {
                assert!(is_valid_build_target(t), "{}: {t}", arch.name);
            }
        }
    }

    #[test]
    fn unknown_arch_lists_known_ones() {
        let err = require("mips").unwrap_err().to_string();
        assert!(err.contains("arm64, arm, riscv, x86_64"), "{err}");
    }
}
