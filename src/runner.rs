use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use tracing::debug;

use crate::{
  ext::{run_shell, Capture},
  flags::FlagCombination,
  metadata::ProgramSpec,
  report::{CaseResult, Stage, Variant},
  transpile::{test_stem, TranspileAdapter},
};

/// Executes one (program, flag combination, variant) case, with every external
/// invocation bounded by `timeout`.
pub struct Runner {
  corpus_root: PathBuf,
  timeout: Duration,
  adapter: TranspileAdapter,
}

impl Runner {
  pub fn new(corpus_root: PathBuf, timeout: Duration, adapter: TranspileAdapter) -> Self {
    Self {
      corpus_root,
      timeout,
      adapter,
    }
  }

  fn program_dir(&self, spec: &ProgramSpec) -> PathBuf {
    self.corpus_root.join(&spec.path)
  }

  pub fn run(&self, spec: &ProgramSpec, combination: &FlagCombination, variant: Variant) -> Result<CaseResult> {
    debug!(program = %spec.name, %combination, ?variant, "running case");

    match variant {
      Variant::Original => self.run_original(spec, combination),
      Variant::Transpiled => self.run_transpiled(spec, combination),
    }
  }

  /// Builds the baseline C program under `bear` tracing, then runs its test
  /// executables. Build failure short-circuits the test stage.
  fn run_original(&self, spec: &ProgramSpec, combination: &FlagCombination) -> Result<CaseResult> {
    let dir = self.program_dir(spec);
    let mut elapsed = 0;

    // Stale artifacts from the previous combination would contaminate this
    // one. A failing clean on a fresh tree is fine; a hanging one is not.
    let clean = run_shell(&spec.clean_command, &dir, self.timeout).context("clean")?;
    elapsed += clean.elapsed_ms();
    if clean.timed_out {
      return Ok(case(combination, Variant::Original, Stage::TimedOut, &clean, elapsed));
    }

    let line = spec.build_command.replace("{flags}", &combination.join());
    let build = run_shell(line.trim(), &dir, self.timeout).context("build")?;
    elapsed += build.elapsed_ms();

    if build.timed_out {
      return Ok(case(combination, Variant::Original, Stage::TimedOut, &build, elapsed));
    }
    if !build.success() {
      return Ok(case(combination, Variant::Original, Stage::BuildFailed, &build, elapsed));
    }

    let mut last = build;
    for test_file in &spec.test_files {
      let line = spec
        .test_command
        .replace("{test_stem}", &test_stem(test_file))
        .replace("{test}", test_file);

      let test = run_shell(&line, &dir, self.timeout).with_context(|| format!("test {test_file}"))?;
      elapsed += test.elapsed_ms();

      if test.timed_out {
        return Ok(case(combination, Variant::Original, Stage::TimedOut, &test, elapsed));
      }
      if !test.success() {
        return Ok(case(combination, Variant::Original, Stage::TestFailed, &test, elapsed));
      }

      last = test;
    }

    Ok(case(combination, Variant::Original, Stage::Passed, &last, elapsed))
  }

  /// Transpiles the build trace left by the traced baseline build, compiles
  /// the emitted crate, then links and runs each C test binary against it.
  /// Transpile, Rust-build, and link failures all land on the transpile stage;
  /// only a failing linked binary counts as a test failure.
  fn run_transpiled(&self, spec: &ProgramSpec, combination: &FlagCombination) -> Result<CaseResult> {
    let dir = self.program_dir(spec);
    let mut elapsed = 0;

    let mut last = None;
    for line in self.adapter.build_lines() {
      let capture = run_shell(line, &dir, self.timeout).with_context(|| format!("transpile step {line:?}"))?;
      elapsed += capture.elapsed_ms();

      if capture.timed_out {
        return Ok(case(combination, Variant::Transpiled, Stage::TimedOut, &capture, elapsed));
      }
      if !capture.success() {
        return Ok(case(combination, Variant::Transpiled, Stage::TranspileFailed, &capture, elapsed));
      }

      last = Some(capture);
    }
    let mut last = last.context("no transpile steps")?;

    for test_file in &spec.test_files {
      let (link_line, run_line) = self.adapter.link_line(test_file);

      let link = run_shell(&link_line, &dir, self.timeout).with_context(|| format!("link {test_file}"))?;
      elapsed += link.elapsed_ms();

      if link.timed_out {
        return Ok(case(combination, Variant::Transpiled, Stage::TimedOut, &link, elapsed));
      }
      if !link.success() {
        return Ok(case(combination, Variant::Transpiled, Stage::TranspileFailed, &link, elapsed));
      }

      let test = run_shell(&run_line, &dir, self.timeout).with_context(|| format!("run {run_line}"))?;
      elapsed += test.elapsed_ms();

      if test.timed_out {
        return Ok(case(combination, Variant::Transpiled, Stage::TimedOut, &test, elapsed));
      }
      if !test.success() {
        return Ok(case(combination, Variant::Transpiled, Stage::TestFailed, &test, elapsed));
      }

      last = test;
    }

    Ok(case(combination, Variant::Transpiled, Stage::Passed, &last, elapsed))
  }
}

/// Assembles a CaseResult from the capture that decided the case's outcome.
fn case(
  combination: &FlagCombination,
  variant: Variant,
  stage: Stage,
  capture: &Capture,
  elapsed_ms: u64,
) -> CaseResult {
  CaseResult {
    flags: combination.0.clone(),
    variant,
    success: stage == Stage::Passed,
    exit_code: capture.exit_code,
    stage,
    duration_ms: elapsed_ms,
    stdout: capture.stdout.clone(),
    stderr: capture.stderr.clone(),
  }
}

/// A case that was never executed because its program is on the exclusion
/// list.
pub fn skipped_case() -> CaseResult {
  CaseResult {
    flags: Vec::new(),
    variant: Variant::Original,
    success: false,
    exit_code: None,
    stage: Stage::Skipped,
    duration_ms: 0,
    stdout: String::new(),
    stderr: String::new(),
  }
}
