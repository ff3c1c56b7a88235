use std::{collections::BTreeMap, fmt, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
  Original,
  Transpiled,
}

/// Where in the pipeline a case stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
  Passed,
  BuildFailed,
  TranspileFailed,
  TestFailed,
  TimedOut,
  Skipped,
}

impl Stage {
  pub fn as_str(self) -> &'static str {
    match self {
      Stage::Passed => "passed",
      Stage::BuildFailed => "build-failed",
      Stage::TranspileFailed => "transpile-failed",
      Stage::TestFailed => "test-failed",
      Stage::TimedOut => "timed-out",
      Stage::Skipped => "skipped",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Outcome of one (program, flag combination, variant) execution. Immutable
/// once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
  pub flags: Vec<String>,
  pub variant: Variant,
  pub success: bool,
  pub exit_code: Option<i32>,
  pub stage: Stage,
  pub duration_ms: u64,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub stdout: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub stderr: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollup {
  pub total: usize,
  pub passed: usize,
  pub failed: usize,
  pub skipped: usize,
}

/// The full results artifact, keyed by program name. Rewritten after every
/// case so an interrupted run keeps everything recorded so far.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
  pub programs: BTreeMap<String, Vec<CaseResult>>,
  pub rollup: Rollup,
}

impl BenchmarkSummary {
  pub fn push(&mut self, program: &str, case: CaseResult) {
    self.programs.entry(program.to_string()).or_default().push(case);
    self.rollup = rollup(&self.programs);
  }

  /// Writes to a sibling temp file and renames, so an interrupt never leaves a
  /// torn summary on disk.
  pub fn write(&self, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(self).context("serialize summary")?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).with_context(|| format!("write {tmp:?}"))?;
    fs::rename(&tmp, path).with_context(|| format!("rename to {path:?}"))?;

    Ok(())
  }

  pub fn load(path: &Path) -> Result<Self> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {path:?}"))?;

    serde_json::from_str(&contents).with_context(|| format!("parse {path:?}"))
  }
}

fn rollup(programs: &BTreeMap<String, Vec<CaseResult>>) -> Rollup {
  let mut rollup = Rollup::default();

  for case in programs.values().flatten() {
    rollup.total += 1;
    match case.stage {
      Stage::Passed => rollup.passed += 1,
      Stage::Skipped => rollup.skipped += 1,
      _ => rollup.failed += 1,
    }
  }

  rollup
}

/// Rollup counts plus a per-stage failure breakdown, derived purely from a
/// previously written results file.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Report {
  pub rollup: Rollup,
  pub failed_by_stage: BTreeMap<&'static str, usize>,
}

pub fn summarize(results_path: &Path) -> Result<Report> {
  let summary = BenchmarkSummary::load(results_path).context("load results")?;

  let mut failed_by_stage = BTreeMap::new();
  for case in summary.programs.values().flatten() {
    if !matches!(case.stage, Stage::Passed | Stage::Skipped) {
      *failed_by_stage.entry(case.stage.as_str()).or_insert(0) += 1;
    }
  }

  Ok(Report {
    rollup: summary.rollup,
    failed_by_stage,
  })
}

pub fn render(report: &Report) -> String {
  let Rollup {
    total,
    passed,
    failed,
    skipped,
  } = report.rollup;

  let mut out = format!("Tests Passed: {passed}/{total}\n");
  out.push_str(&format!("failed: {failed}  skipped: {skipped}\n"));
  for (stage, count) in &report.failed_by_stage {
    out.push_str(&format!("  failed at {stage}: {count}\n"));
  }

  out
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;

  fn case(flags: &[&str], variant: Variant, stage: Stage) -> CaseResult {
    let exit_code = match stage {
      Stage::Passed => Some(0),
      Stage::TimedOut | Stage::Skipped => None,
      _ => Some(1),
    };

    CaseResult {
      flags: flags.iter().map(|flag| flag.to_string()).collect(),
      variant,
      success: stage == Stage::Passed,
      exit_code,
      stage,
      duration_ms: 5,
      stdout: String::new(),
      stderr: String::new(),
    }
  }

  /// One program, two flag combinations: both baselines pass, one translated
  /// run passes, the other fails to compile.
  fn mixed_summary() -> BenchmarkSummary {
    let mut summary = BenchmarkSummary::default();
    summary.push("prog", case(&[], Variant::Original, Stage::Passed));
    summary.push("prog", case(&[], Variant::Transpiled, Stage::Passed));
    summary.push("prog", case(&["-DFOO"], Variant::Original, Stage::Passed));
    summary.push("prog", case(&["-DFOO"], Variant::Transpiled, Stage::TranspileFailed));
    summary
  }

  #[test]
  fn rollup_counts_mixed_outcomes() {
    let summary = mixed_summary();

    assert_eq!(
      summary.rollup,
      Rollup {
        total: 4,
        passed: 3,
        failed: 1,
        skipped: 0
      }
    );
  }

  #[test]
  fn skipped_cases_are_not_failures() {
    let mut summary = BenchmarkSummary::default();
    summary.push("hung", case(&[], Variant::Original, Stage::Skipped));

    assert_eq!(
      summary.rollup,
      Rollup {
        total: 1,
        passed: 0,
        failed: 0,
        skipped: 1
      }
    );
  }

  #[test]
  fn summarize_is_idempotent() {
    let dir = TempDir::with_prefix("crust-bench-report-").unwrap();
    let path = dir.path().join("summary.json");
    mixed_summary().write(&path).unwrap();

    let first = summarize(&path).unwrap();
    let second = summarize(&path).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.failed_by_stage, BTreeMap::from([("transpile-failed", 1)]));
  }

  #[test]
  fn write_then_load_round_trip() {
    let dir = TempDir::with_prefix("crust-bench-report-").unwrap();
    let path = dir.path().join("summary.json");

    let summary = mixed_summary();
    summary.write(&path).unwrap();

    assert_eq!(BenchmarkSummary::load(&path).unwrap(), summary);
    assert!(!path.with_extension("tmp").exists());
  }

  #[test]
  fn render_reports_the_pass_rate() {
    let dir = TempDir::with_prefix("crust-bench-report-").unwrap();
    let path = dir.path().join("summary.json");
    mixed_summary().write(&path).unwrap();

    let rendered = render(&summarize(&path).unwrap());

    assert!(rendered.starts_with("Tests Passed: 3/4\n"));
    assert!(rendered.contains("failed at transpile-failed: 1"));
  }
}
