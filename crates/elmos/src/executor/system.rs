use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, mpsc};
use std::time::{Duration, Instant};

use super::{CommandSpec, ExecCtx, Executor, sanitize_log_line};
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Executor backed by real child processes.
///
/// Streamed children run in their own process group so a cancel tears down
/// the whole tree (`ct-ng` forks `make`, which forks compilers).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn command(cmd: &CommandSpec) -> Command {
        let mut c = Command::new(&cmd.program);
        c.args(&cmd.args);
        if let Some(dir) = &cmd.dir {
            c.current_dir(dir);
        }
        if let Some(env) = &cmd.env {
            c.env_clear();
            for kv in env {
                if let Some((k, v)) = kv.split_once('=') {
                    c.env(k, v);
                }
            }
        }
        c
    }

    fn run_attached(&self, ctx: &ExecCtx, cmd: &CommandSpec) -> Result<()> {
        let status = Self::command(cmd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| Error::msg(format!("failed to run {}: {e}", cmd.program)))?;
        if ctx.cancelled() {
            return Err(Error::Cancelled);
        }
        if !status.success() {
            return Err(Error::msg(format!("{} exited with {status}", cmd.program)));
        }
        Ok(())
    }

    fn run_streamed(&self, ctx: &ExecCtx, cmd: &CommandSpec) -> Result<()> {
        let mut command = Self::command(cmd);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                command.pre_exec(|| {
                    if libc::setpgid(0, 0) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = command
            // A child in its own process group that reads the TTY gets SIGTTIN.
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::msg(format!("failed to run {}: {e}", cmd.program)))?;

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(out) = child.stdout.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(out, tx));
        }
        if let Some(err) = child.stderr.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(err, tx));
        }
        drop(tx);

        loop {
            if ctx.cancelled() {
                terminate(&mut child);
                return Err(Error::Cancelled);
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    let line = sanitize_log_line(&line);
                    if !line.is_empty() {
                        ctx.log(&line);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child
            .wait()
            .map_err(|e| Error::msg(format!("wait failed: {e}")))?;
        if !status.success() {
            return Err(Error::msg(format!("{} exited with {status}", cmd.program)));
        }
        Ok(())
    }
}

impl Executor for SystemExecutor {
    fn execute(&self, ctx: &ExecCtx, cmd: &CommandSpec) -> Result<()> {
        if ctx.cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::debug!(command = %cmd.display(), dir = ?cmd.dir, "exec");
        if ctx.dry_run {
            ctx.log(&format!("DRY-RUN: {}", cmd.display()));
            return Ok(());
        }
        if cmd.interactive {
            self.run_attached(ctx, cmd)
        } else {
            self.run_streamed(ctx, cmd)
        }
    }

    fn capture(&self, ctx: &ExecCtx, cmd: &CommandSpec) -> Result<Vec<u8>> {
        if ctx.cancelled() {
            return Err(Error::Cancelled);
        }
        let out = Self::command(cmd)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::msg(format!("failed to run {}: {e}", cmd.program)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(Error::msg(format!(
                "{} exited with {}: {}",
                cmd.display(),
                out.status,
                stderr.trim()
            )));
        }
        Ok(out.stdout)
    }

    fn look_path(&self, program: &str) -> Result<PathBuf> {
        which::which(program).map_err(|e| Error::msg(format!("{program} not found in PATH: {e}")))
    }
}

fn terminate(child: &mut Child) {
    let pgid = child.id();
    kill_pgroup(pgid, false);
    let deadline = Instant::now() + TERM_GRACE;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    kill_pgroup(pgid, true);
    let _ = child.wait();
}

fn kill_pgroup(pgid: u32, force: bool) {
    #[cfg(unix)]
    {
        let sig = if force { libc::SIGKILL } else { libc::SIGTERM };
        unsafe {
            libc::kill(-(pgid as i32), sig);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (pgid, force);
    }
}

fn read_output_stream<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    const MAX_PENDING_BYTES: usize = 16 * 1024;
    let mut r = BufReader::new(reader);
    let mut buf = [0u8; 8192];
    let mut pending = Vec::with_capacity(1024);

    loop {
        let n = match r.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for b in &buf[..n] {
            if *b == b'\n' || pending.len() >= MAX_PENDING_BYTES {
                if !pending.is_empty() {
                    let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
                if *b == b'\n' {
                    continue;
                }
            }
            pending.push(*b);
        }
    }

    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
    }
}

static INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

#[cfg(unix)]
extern "C" fn on_interrupt(_sig: libc::c_int) {
    if let Some(flag) = INTERRUPT_FLAG.get() {
        flag.store(true, Ordering::Relaxed);
    }
}

/// Route SIGINT/SIGTERM into `cancel` instead of killing the process, so the
/// running child group is torn down by the executor. First caller wins.
pub fn cancel_on_interrupt(cancel: Arc<AtomicBool>) {
    if INTERRUPT_FLAG.set(cancel).is_err() {
        return;
    }
    #[cfg(unix)]
    unsafe {
        let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::{ChannelSink, ExecEvent};

    #[test]
    fn streams_output_lines_to_the_sink() {
        let (tx, rx) = mpsc::channel();
        let ctx = ExecCtx::new(Arc::new(ChannelSink::new(tx))).with_stage("probe");
        SystemExecutor
            .run(&ctx, "sh", &["-c", "echo one; echo two >&2"])
            .expect("run sh");

        let mut lines: Vec<String> = rx
            .try_iter()
            .filter_map(|ev| match ev {
                ExecEvent::Output { line, .. } => Some(line),
                _ => None,
            })
            .collect();
        lines.sort();
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn env_replaces_inherited_environment() {
        let ctx = ExecCtx::quiet();
        let out = SystemExecutor
            .output_with_env(
                &ctx,
                &["ELMOS_PROBE=42".to_string()],
                None,
                "/bin/sh",
                &["-c", "echo \"$ELMOS_PROBE:${HOME:-unset}\""],
            )
            .expect("output");
        assert_eq!(String::from_utf8_lossy(&out).trim(), "42:unset");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let ctx = ExecCtx::quiet();
        let err = SystemExecutor
            .run(&ctx, "sh", &["-c", "exit 3"])
            .unwrap_err()
            .to_string();
        assert!(err.contains("exited with"), "{err}");
    }

    #[test]
    fn cancel_terminates_a_running_child() {
        let ctx = ExecCtx::quiet();
        let cancel = ctx.cancel.clone();
        let started = Instant::now();
        let killer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            cancel.store(true, Ordering::Relaxed);
        });
        let err = SystemExecutor.run(&ctx, "sleep", &["30"]).unwrap_err();
        killer.join().expect("join");
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn dry_run_does_not_spawn() {
        let ctx = ExecCtx::quiet().with_dry_run(true);
        SystemExecutor
            .run(&ctx, "definitely-not-a-real-program-elmos", &[])
            .expect("dry run");
    }
}
