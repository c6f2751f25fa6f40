use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use elmos::config::{Config, DEFAULT_CONFIG_FILE};
use elmos::env::EnvironmentBuilder;
use elmos::executor::{ExecCtx, Executor, StdoutSink, SystemExecutor};
use elmos::fs::OsFileSystem;
use elmos::packages::{self, PackageResolver};
use elmos::platform::Platform;
use elmos::toolchain::ToolchainManager;
use elmos::{Result, arch, builder};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Workspace config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Debug logging (overridden by ELMOS_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
    /// Print commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,
    /// Only show subprocess output when a stage fails
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// crosstool-ng toolchain lifecycle
    Toolchain {
        #[command(subcommand)]
        cmd: ToolchainCmd,
    },
    /// Linux kernel configuration and builds
    Kernel {
        #[command(subcommand)]
        cmd: KernelCmd,
    },
    /// Out-of-tree kernel modules
    Module {
        #[command(subcommand)]
        cmd: UnitCmd,
    },
    /// Userspace apps
    App {
        #[command(subcommand)]
        cmd: UnitCmd,
    },
    /// Print the environment kernel `make` runs with
    Env,
    /// List supported architectures
    Arch,
}

#[derive(Debug, Subcommand)]
enum ToolchainCmd {
    /// Clone, build and install crosstool-ng
    Install,
    /// Select a sample or custom config as the active target
    Select { target: String },
    /// Build the selected toolchain
    Build {
        /// Parallel jobs (0 = config, then CPU count)
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,
    },
    /// Run `ct-ng clean`
    Clean,
    /// Edit the active config interactively
    Menuconfig,
    /// List crosstool-ng samples
    Samples,
    /// List toolchains under x-tools
    List {
        #[arg(long)]
        json: bool,
        /// Probe each toolchain's gcc version
        #[arg(long)]
        versions: bool,
    },
    /// Show lifecycle state and paths
    Status,
    /// Save the active config as configs/<name>.config
    SaveConfig { name: String },
    /// Print the environment ct-ng runs with
    Env,
}

#[derive(Debug, Subcommand)]
enum KernelCmd {
    /// Generate .config
    Config {
        #[arg(default_value = "defconfig")]
        kind: String,
    },
    /// Build kernel targets (default: the arch's default targets)
    Build {
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,
        targets: Vec<String>,
    },
    /// `make clean` (or `mrproper` with --deep)
    Clean {
        #[arg(long)]
        deep: bool,
    },
}

#[derive(Debug, Subcommand)]
enum UnitCmd {
    List,
    Build {
        name: Option<String>,
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,
    },
    Clean {
        name: Option<String>,
    },
}

struct Host {
    config: Config,
    platform: Platform,
    exec: Arc<dyn Executor>,
    fs: OsFileSystem,
    packages: Box<dyn PackageResolver>,
    ctx: ExecCtx,
}

impl Host {
    fn init(args: &Args) -> Result<Self> {
        let platform = Platform::detect();
        let mut config = elmos::config::load_or_default(&args.config)?;
        config.platform = platform;
        config.apply_env_overrides();
        arch::require(&config.build.arch)?;

        let exec: Arc<dyn Executor> = Arc::new(SystemExecutor);
        let packages = packages::for_host(platform, exec.clone());
        tracing::debug!(
            platform = platform.name(),
            resolver = packages.name(),
            arch = %config.build.arch,
            "host initialised"
        );

        let ctx = ExecCtx::new(Arc::new(StdoutSink::new(args.quiet))).with_dry_run(args.dry_run);
        elmos::executor::cancel_on_interrupt(ctx.cancel.clone());
        Ok(Self {
            config,
            platform,
            exec,
            fs: OsFileSystem,
            packages,
            ctx,
        })
    }

    fn toolchain(&self) -> ToolchainManager<'_> {
        ToolchainManager::new(
            &self.config,
            self.exec.as_ref(),
            &self.fs,
            self.packages.as_ref(),
            self.platform,
        )
    }

    fn jobs(&self, requested: usize) -> usize {
        if requested == 0 {
            self.config.build.jobs
        } else {
            requested
        }
    }
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();
    elmos::logging::init(args.verbose, args.log_json);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let host = Host::init(&args)?;
    match args.cmd {
        Command::Toolchain { cmd } => cmd_toolchain(&host, cmd),
        Command::Kernel { cmd } => cmd_kernel(&host, cmd),
        Command::Module { cmd } => {
            let b = builder::ModuleBuilder::new(
                &host.config,
                host.exec.as_ref(),
                &host.fs,
                host.packages.as_ref(),
                host.platform,
            );
            match cmd {
                UnitCmd::List => print_lines(&b.list()?),
                UnitCmd::Build { name, jobs } => {
                    b.build(&host.ctx, name.as_deref(), host.jobs(jobs))
                }
                UnitCmd::Clean { name } => b.clean(&host.ctx, name.as_deref()),
            }
        }
        Command::App { cmd } => {
            let b = builder::AppBuilder::new(
                &host.config,
                host.exec.as_ref(),
                &host.fs,
                host.packages.as_ref(),
                host.platform,
            );
            match cmd {
                UnitCmd::List => print_lines(&b.list()?),
                UnitCmd::Build { name, jobs } => {
                    b.build(&host.ctx, name.as_deref(), host.jobs(jobs))
                }
                UnitCmd::Clean { name } => b.clean(&host.ctx, name.as_deref()),
            }
        }
        Command::Env => {
            let env = EnvironmentBuilder::new(
                &host.config,
                host.packages.as_ref(),
                &host.fs,
                host.platform,
            );
            print_lines(&env.build_make_env()?)
        }
        Command::Arch => {
            for a in arch::ARCHES {
                println!(
                    "{:<8} ARCH={:<8} image={:<8} gcc={}",
                    a.name,
                    a.kernel_arch,
                    a.kernel_image,
                    if a.gcc_binary.is_empty() { "-" } else { a.gcc_binary }
                );
            }
            Ok(())
        }
    }
}

fn cmd_toolchain(host: &Host, cmd: ToolchainCmd) -> Result<()> {
    let tc = host.toolchain();
    match cmd {
        ToolchainCmd::Install => tc.install(&host.ctx),
        ToolchainCmd::Select { target } => tc.select_target(&host.ctx, &target),
        ToolchainCmd::Build { jobs } => tc.build(&host.ctx, host.jobs(jobs)),
        ToolchainCmd::Clean => tc.clean(&host.ctx),
        ToolchainCmd::Menuconfig => tc.menuconfig(&host.ctx),
        ToolchainCmd::Samples => print_lines(&tc.list_samples(&host.ctx)?),
        ToolchainCmd::List { json, versions } => {
            let mut list = tc.installed_toolchains()?;
            if versions {
                for t in &mut list {
                    t.version = tc.toolchain_version(&host.ctx, t);
                }
            }
            if json {
                let s = serde_json::to_string_pretty(&list)
                    .map_err(|e| elmos::Error::msg(format!("json encode error: {e}")))?;
                println!("{s}");
                return Ok(());
            }
            for t in &list {
                println!(
                    "{:<32} {:<10} {}",
                    t.target,
                    if t.installed { "installed" } else { "incomplete" },
                    t.version.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        ToolchainCmd::Status => {
            let paths = tc.paths();
            println!("state:        {:?}", tc.state()?);
            println!("base:         {}", paths.base.display());
            println!("ct-ng:        {}", paths.ct_ng().display());
            println!("x-tools:      {}", paths.x_tools.display());
            println!("tarballs:     {}", paths.src.display());
            if let Some(triple) = arch::require(&host.config.build.arch)?.target_triple() {
                let custom = tc.custom_config_path(triple);
                println!(
                    "custom config: {}",
                    custom
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".into())
                );
            }
            Ok(())
        }
        ToolchainCmd::SaveConfig { name } => {
            let dest = tc.save_config(&name)?;
            println!("{}", dest.display());
            Ok(())
        }
        ToolchainCmd::Env => print_lines(&tc.toolchain_build_env()?),
    }
}

fn cmd_kernel(host: &Host, cmd: KernelCmd) -> Result<()> {
    let k = builder::KernelBuilder::new(
        &host.config,
        host.exec.as_ref(),
        &host.fs,
        host.packages.as_ref(),
        host.platform,
    );
    match cmd {
        KernelCmd::Config { kind } => k.configure(&host.ctx, &kind),
        KernelCmd::Build { jobs, targets } => {
            k.build(&host.ctx, host.jobs(jobs), &targets)?;
            println!("{}", k.image_path()?.display());
            Ok(())
        }
        KernelCmd::Clean { deep } => k.clean(&host.ctx, deep),
    }
}

fn print_lines(lines: &[String]) -> Result<()> {
    for l in lines {
        println!("{l}");
    }
    Ok(())
}
