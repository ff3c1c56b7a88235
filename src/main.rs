mod bench;
mod ext;
mod flags;
mod metadata;
mod report;
mod runner;
mod transpile;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::{bench::Bench, runner::Runner, transpile::TranspileAdapter};

#[derive(Parser)]
struct Args {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Scan the corpus and write per-program build/test metadata.
  Generate {
    /// Corpus of benchmark C programs.
    #[arg(long, default_value = "./CBench")]
    corpus_dir: PathBuf,
    /// Where to write the metadata file.
    #[arg(long, default_value = "metadata.json")]
    metadata: PathBuf,
  },
  /// Run the benchmark: baseline C, transpile, translated tests.
  Run {
    #[arg(long, default_value = "./CBench")]
    corpus_dir: PathBuf,
    #[arg(long, default_value = "metadata.json")]
    metadata: PathBuf,
    /// Where to write the results summary.
    #[arg(long, default_value = "benchmark_summary.json")]
    output: PathBuf,
    /// Wall-clock limit per external command, in seconds.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
    /// Only run the named program.
    #[arg(long)]
    filter: Option<String>,
    /// Programs to record as skipped and never execute.
    #[arg(long)]
    exclude: Vec<String>,
  },
  /// Summarize a previously written results file without re-running anything.
  Summarize {
    #[arg(long, default_value = "benchmark_summary.json")]
    results: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  match Args::parse().command {
    Command::Generate { corpus_dir, metadata } => {
      let store = metadata::generate(&corpus_dir, &metadata::FlagFilePolicy).context("generate")?;
      metadata::save(&store, &metadata).context("save metadata")?;

      println!("wrote {} program specs to {metadata:?}", store.len());
    }

    Command::Run {
      corpus_dir,
      metadata,
      output,
      timeout_secs,
      filter,
      exclude,
    } => {
      let store = metadata::load(&metadata).context("load metadata")?;

      let runner = Runner::new(corpus_dir, Duration::from_secs(timeout_secs), TranspileAdapter::default());
      let mut bench = Bench::new(store, runner, output.clone(), exclude.into_iter().collect(), filter);
      bench.run_all().context("run")?;

      // Individual case failures are results, not errors; only infrastructure
      // failures make the exit code non-zero.
      print!("{}", report::render(&report::summarize(&output).context("summarize")?));
    }

    Command::Summarize { results } => {
      print!("{}", report::render(&report::summarize(&results).context("summarize")?));
    }
  }

  Ok(())
}
