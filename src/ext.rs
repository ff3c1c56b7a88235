use std::{
  io::Read,
  path::Path,
  process::{Command, Stdio},
  thread,
  time::{Duration, Instant},
};

use anyhow::{Context, Result};
use wait_timeout::ChildExt as WaitExt;

/// Captured outcome of a single external command invocation.
#[derive(Debug)]
pub struct Capture {
  pub exit_code: Option<i32>,
  pub timed_out: bool,
  pub stdout: String,
  pub stderr: String,
  pub duration: Duration,
}

impl Capture {
  pub fn success(&self) -> bool {
    !self.timed_out && self.exit_code == Some(0)
  }

  pub fn elapsed_ms(&self) -> u64 {
    self.duration.as_millis() as u64
  }
}

/// Kills an entire process group. `make` and test scripts spawn their own
/// children, which would survive a kill of the direct child alone.
fn kill_group(pgid: u32) {
  unsafe {
    libc::kill(-(pgid as libc::pid_t), libc::SIGKILL);
  }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
  thread::spawn(move || {
    let mut buf = String::new();
    let _ = pipe.read_to_string(&mut buf);
    buf
  })
}

#[extend::ext]
pub impl Command {
  /// Runs the command to completion or until `timeout` expires, capturing
  /// stdout, stderr, exit status, and wall-clock duration. The child is placed
  /// in its own process group; on timeout the whole group is killed so no
  /// orphaned children keep running.
  fn capture_timeout(&mut self, timeout: Duration) -> Result<Capture> {
    use std::os::unix::process::CommandExt;

    let start = Instant::now();

    let mut child = self
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .process_group(0)
      .spawn()
      .context("spawn")?;
    let pgid = child.id();

    let stdout = drain(child.stdout.take().context("stdout")?);
    let stderr = drain(child.stderr.take().context("stderr")?);

    let status = child.wait_timeout(timeout).context("wait")?;
    let timed_out = status.is_none();
    if timed_out {
      kill_group(pgid);
      child.wait().context("wait after kill")?;
    }

    Ok(Capture {
      exit_code: status.and_then(|status| status.code()),
      timed_out,
      stdout: stdout.join().unwrap_or_default(),
      stderr: stderr.join().unwrap_or_default(),
      duration: start.elapsed(),
    })
  }
}

/// Runs `line` through the shell in `dir`, bounded by `timeout`. This is the
/// single subprocess entry point for the whole harness.
pub fn run_shell(line: &str, dir: &Path, timeout: Duration) -> Result<Capture> {
  Command::new("sh")
    .arg("-c")
    .arg(line)
    .current_dir(dir)
    .capture_timeout(timeout)
    .with_context(|| format!("sh -c {line:?} in {dir:?}"))
}
