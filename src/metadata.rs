use std::{
  collections::{BTreeMap, BTreeSet},
  fs,
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

pub const DEFAULT_BUILD_COMMAND: &str = "bear -- make {flags}";
pub const DEFAULT_CLEAN_COMMAND: &str = "make clean";
pub const DEFAULT_TEST_COMMAND: &str = "./{test_stem}";

/// Optional per-program file declaring the compile-flag domain, one flag per
/// line.
const FLAG_DOMAIN_FILE: &str = "compile_flags.txt";

#[derive(Debug, Error)]
pub enum MetadataError {
  #[error("corpus directory {0:?} does not exist")]
  MissingCorpus(PathBuf),
  #[error("no build recipe found for {0:?} (expected a Makefile)")]
  MalformedSpec(String),
}

/// Build and test configuration for one benchmark program. Produced by
/// `generate`, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSpec {
  pub name: String,
  /// Program directory, relative to the corpus root.
  pub path: PathBuf,
  /// Test sources, relative to the program directory. The Makefile is expected
  /// to build one executable per test, named after the file stem.
  pub test_files: Vec<String>,
  /// Declared flag domain; a run enumerates its power set.
  pub compile_flags: Vec<String>,
  #[serde(default = "default_build_command")]
  pub build_command: String,
  #[serde(default = "default_clean_command")]
  pub clean_command: String,
  #[serde(default = "default_test_command")]
  pub test_command: String,
}

fn default_build_command() -> String {
  DEFAULT_BUILD_COMMAND.to_string()
}

fn default_clean_command() -> String {
  DEFAULT_CLEAN_COMMAND.to_string()
}

fn default_test_command() -> String {
  DEFAULT_TEST_COMMAND.to_string()
}

/// The persisted metadata file, keyed by program name.
pub type MetadataStore = BTreeMap<String, ProgramSpec>;

/// Rule for deriving a program's compile-flag domain from its directory. The
/// corpus does not encode this uniformly, so the policy is swappable.
pub trait FlagPolicy {
  fn discover(&self, program_dir: &Path) -> Result<Vec<String>>;
}

/// Reads `compile_flags.txt` from the program directory; an absent file means
/// an empty domain.
pub struct FlagFilePolicy;

impl FlagPolicy for FlagFilePolicy {
  fn discover(&self, program_dir: &Path) -> Result<Vec<String>> {
    let path = program_dir.join(FLAG_DOMAIN_FILE);
    if !path.exists() {
      return Ok(Vec::new());
    }

    let contents = fs::read_to_string(&path).with_context(|| format!("read {path:?}"))?;

    Ok(
      contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect(),
    )
  }
}

/// Scans the corpus and builds a spec for every program directory. A program
/// whose build recipe cannot be determined is skipped with a warning;
/// generation continues for the rest.
pub fn generate(corpus_dir: &Path, policy: &dyn FlagPolicy) -> Result<MetadataStore> {
  if !corpus_dir.is_dir() {
    return Err(MetadataError::MissingCorpus(corpus_dir.to_path_buf()).into());
  }

  let mut store = MetadataStore::new();

  let mut dirs: Vec<PathBuf> = fs::read_dir(corpus_dir)
    .context("read corpus dir")?
    .filter_map(|entry| entry.ok().map(|entry| entry.path()))
    .filter(|path| path.is_dir())
    .collect();
  dirs.sort();

  for dir in dirs {
    let name = dir
      .file_name()
      .context("program dir name")?
      .to_string_lossy()
      .into_owned();

    match program_spec(&name, &dir, policy) {
      Ok(spec) => {
        store.insert(name, spec);
      }
      Err(err) => warn!(program = %name, %err, "skipping program"),
    }
  }

  Ok(store)
}

fn program_spec(name: &str, dir: &Path, policy: &dyn FlagPolicy) -> Result<ProgramSpec> {
  if !dir.join("Makefile").exists() && !dir.join("makefile").exists() {
    return Err(MetadataError::MalformedSpec(name.to_string()).into());
  }

  Ok(ProgramSpec {
    name: name.to_string(),
    path: PathBuf::from(name),
    test_files: find_test_files(dir),
    compile_flags: policy.discover(dir).context("flag policy")?,
    build_command: default_build_command(),
    clean_command: default_clean_command(),
    test_command: default_test_command(),
  })
}

/// Collects `.c` files under `test`/`tests` directories, plus any `.c` file
/// whose name contains "test", as paths relative to the program directory.
fn find_test_files(dir: &Path) -> Vec<String> {
  let mut found = BTreeSet::new();

  for entry in WalkDir::new(dir).into_iter().filter_map(|entry| entry.ok()) {
    let path = entry.path();
    if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("c") {
      continue;
    }

    let Ok(rel) = path.strip_prefix(dir) else { continue };

    let in_test_dir = rel
      .components()
      .any(|component| matches!(component.as_os_str().to_str(), Some("test" | "tests")));
    let test_named = path
      .file_stem()
      .and_then(|stem| stem.to_str())
      .is_some_and(|stem| stem.contains("test"));

    if in_test_dir || test_named {
      found.insert(rel.to_string_lossy().into_owned());
    }
  }

  found.into_iter().collect()
}

pub fn save(store: &MetadataStore, path: &Path) -> Result<()> {
  let json = serde_json::to_string_pretty(store).context("serialize metadata")?;
  fs::write(path, json).with_context(|| format!("write {path:?}"))?;

  Ok(())
}

pub fn load(path: &Path) -> Result<MetadataStore> {
  let contents = fs::read_to_string(path).with_context(|| format!("read {path:?}"))?;

  serde_json::from_str(&contents).with_context(|| format!("parse {path:?}"))
}
