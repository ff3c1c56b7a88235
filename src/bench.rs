use std::{collections::BTreeSet, path::PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::{
  flags::{combinations, FlagCombination},
  metadata::{MetadataStore, ProgramSpec},
  report::{BenchmarkSummary, CaseResult, Variant},
  runner::{skipped_case, Runner},
};

/// Drives the full benchmark: every program times every flag combination,
/// baseline first, translated only on baseline success. Sequential by design;
/// one case runs at a time.
pub struct Bench {
  store: MetadataStore,
  runner: Runner,
  output_path: PathBuf,
  /// Known-bad programs (e.g. ones that hang) recorded as skipped, never run.
  exclude: BTreeSet<String>,
  /// When set, only the named program runs.
  filter: Option<String>,
  pub summary: BenchmarkSummary,
}

impl Bench {
  pub fn new(
    store: MetadataStore,
    runner: Runner,
    output_path: PathBuf,
    exclude: BTreeSet<String>,
    filter: Option<String>,
  ) -> Self {
    Self {
      store,
      runner,
      output_path,
      exclude,
      filter,
      summary: BenchmarkSummary::default(),
    }
  }

  pub fn run_all(&mut self) -> Result<()> {
    let specs: Vec<ProgramSpec> = self.store.values().cloned().collect();

    for spec in specs {
      if self.filter.as_ref().is_some_and(|filter| *filter != spec.name) {
        continue;
      }

      if self.exclude.contains(&spec.name) {
        info!(program = %spec.name, "excluded, recording skip");
        self.record(&spec.name, skipped_case())?;
        continue;
      }

      info!(program = %spec.name, "benchmarking");
      for combination in combinations(&spec.compile_flags) {
        self.run_case(&spec, &combination)?;
      }
    }

    Ok(())
  }

  fn run_case(&mut self, spec: &ProgramSpec, combination: &FlagCombination) -> Result<()> {
    let baseline = self.runner.run(spec, combination, Variant::Original)?;
    let baseline_ok = baseline.success;
    self.record(&spec.name, baseline)?;

    // A broken baseline is not worth transpiling.
    if !baseline_ok {
      return Ok(());
    }

    let translated = self.runner.run(spec, combination, Variant::Transpiled)?;
    self.record(&spec.name, translated)?;

    Ok(())
  }

  /// Records one case and rewrites the summary file, so an interrupted run
  /// loses at most the case in flight.
  fn record(&mut self, program: &str, case: CaseResult) -> Result<()> {
    self.summary.push(program, case);
    self.summary.write(&self.output_path).context("write summary")
  }
}

#[cfg(test)]
mod tests {
  use std::{fs, path::Path, time::Duration};

  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;
  use crate::{
    metadata::ProgramSpec,
    report::{Rollup, Stage},
    transpile::TranspileAdapter,
  };

  const FAKE_LINK: &str = "printf '#!/bin/sh\\n' > {exe} && chmod +x {exe}";

  fn spec(name: &str, build: &str, flags: &[&str]) -> ProgramSpec {
    ProgramSpec {
      name: name.to_string(),
      path: PathBuf::from(name),
      test_files: vec!["check_test.c".to_string()],
      compile_flags: flags.iter().map(|flag| flag.to_string()).collect(),
      build_command: build.to_string(),
      clean_command: "true".to_string(),
      test_command: "true".to_string(),
    }
  }

  fn harness(specs: Vec<ProgramSpec>) -> (TempDir, Bench) {
    let dir = TempDir::with_prefix("crust-bench-").unwrap();
    let corpus = dir.path().join("corpus");

    let mut store = MetadataStore::new();
    for spec in specs {
      fs::create_dir_all(corpus.join(&spec.path)).unwrap();
      store.insert(spec.name.clone(), spec);
    }

    let adapter = TranspileAdapter {
      transpile_command: "true".to_string(),
      rust_build_command: "true".to_string(),
      link_command: FAKE_LINK.to_string(),
    };
    let runner = Runner::new(corpus, Duration::from_secs(10), adapter);
    let bench = Bench::new(store, runner, dir.path().join("summary.json"), BTreeSet::new(), None);

    (dir, bench)
  }

  fn load_summary(dir: &Path) -> BenchmarkSummary {
    BenchmarkSummary::load(&dir.join("summary.json")).unwrap()
  }

  #[test]
  fn every_combination_runs_once_per_variant() {
    let (dir, mut bench) = harness(vec![spec("prog", "true", &["-DFOO"])]);

    bench.run_all().unwrap();

    let summary = load_summary(dir.path());
    let cases = &summary.programs["prog"];

    // 2 combinations x 2 variants, all passing.
    assert_eq!(cases.len(), 4);
    for variant in [Variant::Original, Variant::Transpiled] {
      let flags: Vec<_> = cases
        .iter()
        .filter(|case| case.variant == variant)
        .map(|case| case.flags.clone())
        .collect();
      assert_eq!(flags, vec![Vec::<String>::new(), vec!["-DFOO".to_string()]]);
    }
    assert_eq!(
      summary.rollup,
      Rollup {
        total: 4,
        passed: 4,
        failed: 0,
        skipped: 0
      }
    );
  }

  #[test]
  fn failed_baseline_never_produces_a_transpiled_case() {
    let (dir, mut bench) = harness(vec![spec("prog", "false", &[])]);

    bench.run_all().unwrap();

    let cases = &load_summary(dir.path()).programs["prog"];

    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].variant, Variant::Original);
    assert_eq!(cases[0].stage, Stage::BuildFailed);
  }

  #[test]
  fn excluded_programs_only_ever_appear_as_skipped() {
    let (dir, mut bench) = harness(vec![spec("hangs", "sleep 30", &[]), spec("ok", "true", &[])]);
    bench.exclude.insert("hangs".to_string());

    bench.run_all().unwrap();

    let summary = load_summary(dir.path());
    let hangs = &summary.programs["hangs"];

    assert_eq!(hangs.len(), 1);
    assert_eq!(hangs[0].stage, Stage::Skipped);
    assert_eq!(summary.rollup.skipped, 1);
    assert_eq!(summary.programs["ok"].len(), 2);
  }

  #[test]
  fn filter_restricts_the_run_to_one_program() {
    let (dir, mut bench) = harness(vec![spec("a", "true", &[]), spec("b", "true", &[])]);
    bench.filter = Some("b".to_string());

    bench.run_all().unwrap();

    let summary = load_summary(dir.path());

    assert!(!summary.programs.contains_key("a"));
    assert_eq!(summary.programs["b"].len(), 2);
  }

  #[test]
  fn summary_file_is_updated_after_every_case() {
    // The second program fails its build; the file on disk must still hold the
    // first program's cases.
    let (dir, mut bench) = harness(vec![spec("a", "true", &[]), spec("b", "false", &[])]);

    bench.run_all().unwrap();

    let summary = load_summary(dir.path());

    assert_eq!(summary.programs.len(), 2);
    assert_eq!(
      summary.rollup,
      Rollup {
        total: 3,
        passed: 2,
        failed: 1,
        skipped: 0
      }
    );
  }
}
