//! Process-execution seam.
//!
//! Every subprocess the crate starts goes through an [`Executor`], driven by an
//! [`ExecCtx`] that carries the cancellation flag and the event sink that
//! streaming callers subscribe to.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Instant;

use crate::error::{Error, Result};

mod sanitize;
mod system;

pub use sanitize::sanitize_log_line;
pub use system::{SystemExecutor, cancel_on_interrupt};

/// One subprocess invocation. `env`, when set, replaces the inherited
/// environment entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Option<Vec<String>>,
    pub dir: Option<PathBuf>,
    pub interactive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn env(mut self, env: &[String]) -> Self {
        self.env = Some(env.to_vec());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Shell-ish rendering for logs.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for a in &self.args {
            out.push(' ');
            out.push_str(a);
        }
        out
    }
}

pub trait Executor: Send + Sync {
    /// Run to completion, streaming output lines to `ctx`'s sink.
    fn execute(&self, ctx: &ExecCtx, cmd: &CommandSpec) -> Result<()>;
    /// Run to completion and return stdout.
    fn capture(&self, ctx: &ExecCtx, cmd: &CommandSpec) -> Result<Vec<u8>>;
    fn look_path(&self, program: &str) -> Result<PathBuf>;

    fn run(&self, ctx: &ExecCtx, program: &str, args: &[&str]) -> Result<()> {
        self.execute(ctx, &CommandSpec::new(program).args(args))
    }

    fn run_in_dir(&self, ctx: &ExecCtx, dir: &Path, program: &str, args: &[&str]) -> Result<()> {
        self.execute(ctx, &CommandSpec::new(program).args(args).current_dir(dir))
    }

    fn run_with_env(
        &self,
        ctx: &ExecCtx,
        env: &[String],
        program: &str,
        args: &[&str],
    ) -> Result<()> {
        self.execute(ctx, &CommandSpec::new(program).args(args).env(env))
    }

    fn run_with_env_in_dir(
        &self,
        ctx: &ExecCtx,
        env: &[String],
        dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<()> {
        self.execute(
            ctx,
            &CommandSpec::new(program).args(args).env(env).current_dir(dir),
        )
    }

    /// Attach the child to the terminal (menuconfig and friends).
    fn run_interactive(
        &self,
        ctx: &ExecCtx,
        env: &[String],
        dir: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<()> {
        self.execute(
            ctx,
            &CommandSpec::new(program)
                .args(args)
                .env(env)
                .current_dir(dir)
                .interactive(),
        )
    }

    fn output(&self, ctx: &ExecCtx, program: &str, args: &[&str]) -> Result<Vec<u8>> {
        self.capture(ctx, &CommandSpec::new(program).args(args))
    }

    fn output_with_env(
        &self,
        ctx: &ExecCtx,
        env: &[String],
        dir: Option<&Path>,
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>> {
        let mut cmd = CommandSpec::new(program).args(args).env(env);
        if let Some(dir) = dir {
            cmd = cmd.current_dir(dir);
        }
        self.capture(ctx, &cmd)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    StageStarted {
        stage: String,
    },
    Output {
        stage: String,
        line: String,
    },
    StageFinished {
        stage: String,
        ok: bool,
        error: Option<String>,
        elapsed_ms: u128,
    },
}

pub trait ExecSink: Send + Sync {
    fn emit(&self, ev: ExecEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ExecSink for NullSink {
    fn emit(&self, _ev: ExecEvent) {}
}

/// Relays events to a streaming consumer (progress UI, RPC wrapper).
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ExecEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ExecEvent>) -> Self {
        Self { tx }
    }
}

impl ExecSink for ChannelSink {
    fn emit(&self, ev: ExecEvent) {
        let _ = self.tx.send(ev);
    }
}

const TAIL_LINES: usize = 40;

/// Terminal sink. In quiet mode output lines are held back and only the tail
/// of a failed stage is printed.
#[derive(Default)]
pub struct StdoutSink {
    quiet: bool,
    tail: Mutex<VecDeque<String>>,
}

impl StdoutSink {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            tail: Mutex::new(VecDeque::new()),
        }
    }
}

impl ExecSink for StdoutSink {
    fn emit(&self, ev: ExecEvent) {
        match ev {
            ExecEvent::StageStarted { stage } => {
                if let Ok(mut t) = self.tail.lock() {
                    t.clear();
                }
                println!("==> {stage}");
            }
            ExecEvent::Output { stage, line } => {
                if !self.quiet {
                    println!("[{stage}] {line}");
                    return;
                }
                if let Ok(mut t) = self.tail.lock() {
                    while t.len() >= TAIL_LINES {
                        t.pop_front();
                    }
                    t.push_back(line);
                }
            }
            ExecEvent::StageFinished {
                stage,
                ok,
                error,
                elapsed_ms,
            } => {
                let secs = elapsed_ms as f64 / 1000.0;
                if ok {
                    println!("<== {stage} ok ({secs:.1}s)");
                    return;
                }
                if self.quiet {
                    if let Ok(mut t) = self.tail.lock() {
                        for line in t.drain(..) {
                            println!("[{stage}] {line}");
                        }
                    }
                }
                println!(
                    "<== {stage} FAILED ({secs:.1}s) {}",
                    error.unwrap_or_default()
                );
            }
        }
    }
}

#[derive(Clone)]
pub struct ExecCtx {
    pub dry_run: bool,
    pub cancel: Arc<AtomicBool>,
    pub sink: Arc<dyn ExecSink>,
    pub stage: Option<String>,
}

impl ExecCtx {
    pub fn new(sink: Arc<dyn ExecSink>) -> Self {
        Self {
            dry_run: false,
            cancel: Arc::new(AtomicBool::new(false)),
            sink,
            stage: None,
        }
    }

    /// Context for short queries whose output nobody watches.
    pub fn quiet() -> Self {
        Self::new(Arc::new(NullSink))
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_stage(&self, stage: &str) -> Self {
        let mut out = self.clone();
        out.stage = Some(stage.to_string());
        out
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn log(&self, line: &str) {
        let stage = self.stage.clone().unwrap_or_else(|| "<none>".into());
        self.sink.emit(ExecEvent::Output {
            stage,
            line: line.to_string(),
        });
    }
}

/// Run `f` as a named stage: emits start/finish events, logs via tracing, and
/// wraps any failure with the stage name.
pub fn run_stage<T>(
    ctx: &ExecCtx,
    stage: &str,
    f: impl FnOnce(&ExecCtx) -> Result<T>,
) -> Result<T> {
    if ctx.cancelled() {
        return Err(Error::Cancelled);
    }
    let ctx = ctx.with_stage(stage);
    tracing::info!(stage, "starting");
    ctx.sink.emit(ExecEvent::StageStarted {
        stage: stage.to_string(),
    });
    let started = Instant::now();
    let res = f(&ctx);
    let elapsed_ms = started.elapsed().as_millis();
    ctx.sink.emit(ExecEvent::StageFinished {
        stage: stage.to_string(),
        ok: res.is_ok(),
        error: res.as_ref().err().map(ToString::to_string),
        elapsed_ms,
    });
    match res {
        Ok(v) => {
            tracing::info!(stage, elapsed_ms = elapsed_ms as u64, "finished");
            Ok(v)
        }
        Err(e) => {
            tracing::warn!(stage, error = %e, "failed");
            Err(Error::stage(stage, e))
        }
    }
}
