mod common;

use std::fs;
use std::path::Path;

use common::{FakeExecutor, FakePackages, env_value, scratch_config, touch};
use elmos::Error;
use elmos::builder::{AppBuilder, KernelBuilder, ModuleBuilder};
use elmos::config::Config;
use elmos::env::EnvList;
use elmos::executor::ExecCtx;
use elmos::fs::OsFileSystem;
use elmos::platform::Platform;
use elmos::toolchain::ToolchainPaths;

fn base_env() -> EnvList {
    EnvList::from_vars([("PATH", "/usr/bin:/usr/sbin:/bin:/sbin")])
}

fn kernel<'a>(
    cfg: &'a Config,
    exec: &'a FakeExecutor,
    pkgs: &'a FakePackages,
) -> KernelBuilder<'a> {
    KernelBuilder::new(cfg, exec, &OsFileSystem, pkgs, Platform::Linux).with_base_env(base_env())
}

fn seed_kernel(cfg: &Config, configured: bool) {
    let dir = cfg.kernel_dir();
    touch(&dir.join("Makefile"));
    if configured {
        touch(&dir.join(".config"));
    }
}

fn dir_str(p: &Path) -> String {
    p.display().to_string()
}

#[test]
fn kernel_config_type_is_validated_first() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm64");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());

    let err = kernel(&cfg, &exec, &pkgs)
        .configure(&ExecCtx::quiet(), "randconfig")
        .unwrap_err();
    assert!(err.to_string().contains("invalid kernel config type 'randconfig'"), "{err}");

    let err = kernel(&cfg, &exec, &pkgs)
        .configure(&ExecCtx::quiet(), "defconfig")
        .unwrap_err();
    assert!(matches!(err, Error::NotInstalled { .. }), "{err}");
    assert!(exec.calls().is_empty());
}

#[test]
fn kernel_defconfig_runs_make_in_source_dir() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm64");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());
    seed_kernel(&cfg, false);
    let k = kernel(&cfg, &exec, &pkgs);
    assert!(!k.is_configured());

    k.configure(&ExecCtx::quiet(), "defconfig").expect("defconfig");
    k.configure(&ExecCtx::quiet(), "menuconfig").expect("menuconfig");

    let dir = cfg.kernel_dir();
    let calls = exec.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].program, "make");
    assert_eq!(calls[0].args, vec!["-C".to_string(), dir_str(&dir), "defconfig".into()]);
    assert_eq!(calls[0].dir.as_deref(), Some(dir.as_path()));
    assert!(!calls[0].interactive);
    assert!(calls[1].interactive);
    let env = calls[0].env.as_deref().expect("env");
    assert_eq!(env_value(env, "ARCH"), Some("arm64"));
    assert_eq!(env_value(env, "LLVM"), Some("1"));
}

#[test]
fn kernel_build_validates_targets_and_config() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm64");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());
    seed_kernel(&cfg, false);
    let k = kernel(&cfg, &exec, &pkgs);
    let ctx = ExecCtx::quiet();

    let err = k.build(&ctx, 2, &["Image".into(), "uImage".into()]).unwrap_err();
    assert!(err.to_string().contains("'uImage'"), "{err}");

    let err = k.build(&ctx, 2, &[]).unwrap_err();
    assert!(matches!(err, Error::NotInstalled { .. }), "{err}");
    assert!(exec.calls().is_empty());
}

#[test]
fn kernel_build_defaults_to_arch_targets() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm64");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());
    seed_kernel(&cfg, true);
    let k = kernel(&cfg, &exec, &pkgs);
    assert!(k.is_configured());

    k.build(&ExecCtx::quiet(), 6, &[]).expect("build");
    k.build(&ExecCtx::quiet(), 6, &["vmlinux".into()]).expect("build vmlinux");

    let dir = dir_str(&cfg.kernel_dir());
    assert_eq!(
        exec.cmdlines(),
        vec![
            format!("make -C {dir} -j6 Image dtbs modules"),
            format!("make -C {dir} -j6 vmlinux"),
        ]
    );
    assert_eq!(
        k.image_path().expect("image"),
        cfg.kernel_dir().join("arch/arm64/boot/Image")
    );
}

#[test]
fn kernel_clean_deep_is_mrproper() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());
    seed_kernel(&cfg, true);
    let k = kernel(&cfg, &exec, &pkgs);

    k.clean(&ExecCtx::quiet(), false).expect("clean");
    k.clean(&ExecCtx::quiet(), true).expect("mrproper");

    let last: Vec<String> = exec
        .calls()
        .iter()
        .filter_map(|c| c.args.last().cloned())
        .collect();
    assert_eq!(last, vec!["clean".to_string(), "mrproper".to_string()]);
}

fn seed_modules(cfg: &Config) {
    let root = cfg.modules_dir();
    touch(&root.join("hello/Kbuild"));
    touch(&root.join("gpio_demo/Makefile"));
    fs::create_dir_all(root.join("notes")).expect("notes");
    touch(&root.join("README"));
}

#[test]
fn modules_are_built_against_the_kernel_tree() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm64");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());
    seed_kernel(&cfg, true);
    seed_modules(&cfg);
    let m = ModuleBuilder::new(&cfg, &exec, &OsFileSystem, &pkgs, Platform::Linux)
        .with_base_env(base_env());

    assert_eq!(
        m.list().expect("list"),
        vec!["gpio_demo".to_string(), "hello".to_string()]
    );

    m.build(&ExecCtx::quiet(), Some("hello"), 2).expect("build hello");
    let kdir = dir_str(&cfg.kernel_dir());
    let hello = dir_str(&cfg.modules_dir().join("hello"));
    assert_eq!(
        exec.cmdlines(),
        vec![format!("make -C {kdir} -j2 M={hello} modules")]
    );

    m.clean(&ExecCtx::quiet(), None).expect("clean all");
    assert_eq!(exec.calls().len(), 3);
    assert!(exec.cmdlines()[1..].iter().all(|c| c.ends_with(" clean")));
}

#[test]
fn unknown_module_lists_known_ones() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm64");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());
    seed_kernel(&cfg, true);
    seed_modules(&cfg);
    let m = ModuleBuilder::new(&cfg, &exec, &OsFileSystem, &pkgs, Platform::Linux)
        .with_base_env(base_env());

    let err = m.build(&ExecCtx::quiet(), Some("notes"), 2).unwrap_err();
    assert!(err.to_string().contains("known: gpio_demo, hello"), "{err}");
    assert!(exec.calls().is_empty());
}

#[test]
fn modules_need_a_configured_kernel() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm64");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());
    seed_modules(&cfg);
    let m = ModuleBuilder::new(&cfg, &exec, &OsFileSystem, &pkgs, Platform::Linux)
        .with_base_env(base_env());

    let err = m.build(&ExecCtx::quiet(), None, 2).unwrap_err();
    assert!(matches!(err, Error::NotInstalled { .. }), "{err}");
}

#[test]
fn apps_require_the_built_toolchain() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm64");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());
    touch(&cfg.apps_dir().join("blink/Makefile"));
    let a = AppBuilder::new(&cfg, &exec, &OsFileSystem, &pkgs, Platform::Linux)
        .with_base_env(base_env());

    let err = a.build(&ExecCtx::quiet(), None, 1).unwrap_err();
    assert!(matches!(err, Error::NotInstalled { .. }), "{err}");
    assert!(err.to_string().contains("elmos toolchain build"), "{err}");

    let bin = ToolchainPaths::from_config(&cfg)
        .x_tools
        .join("aarch64-unknown-linux-gnu/bin");
    touch(&bin.join("aarch64-unknown-linux-gnu-gcc"));

    a.build(&ExecCtx::quiet(), Some("blink"), 4).expect("build");
    a.clean(&ExecCtx::quiet(), Some("blink")).expect("clean");

    let app = dir_str(&cfg.apps_dir().join("blink"));
    let cc = format!("CC={}/aarch64-unknown-linux-gnu-gcc", bin.display());
    assert_eq!(
        exec.cmdlines(),
        vec![
            format!("make -C {app} -j4 {cc}"),
            format!("make -C {app} -j1 clean"),
        ]
    );
}

#[test]
fn app_clean_runs_without_a_toolchain() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = scratch_config(tmp.path(), "arm64");
    let (exec, pkgs) = (FakeExecutor::new(), FakePackages::new());
    touch(&cfg.apps_dir().join("blink/Makefile"));
    touch(&cfg.apps_dir().join("fan/Makefile"));
    let a = AppBuilder::new(&cfg, &exec, &OsFileSystem, &pkgs, Platform::Linux)
        .with_base_env(base_env());

    a.clean(&ExecCtx::quiet(), None).expect("clean without toolchain");

    let root = cfg.apps_dir();
    assert_eq!(
        exec.cmdlines(),
        vec![
            format!("make -C {} -j1 clean", dir_str(&root.join("blink"))),
            format!("make -C {} -j1 clean", dir_str(&root.join("fan"))),
        ]
    );
    assert!(exec.cmdlines().iter().all(|c| !c.contains("CC=")));
}
