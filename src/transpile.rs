use std::path::Path;

/// `bear` leaves this trace next to the Makefile during the baseline build;
/// c2rust consumes it so it sees the real compiler invocations instead of
/// guessing flags.
pub const DEFAULT_TRANSPILE_COMMAND: &str = "c2rust transpile --emit-build-files compile_commands.json";
pub const DEFAULT_RUST_BUILD_COMMAND: &str = "cargo build --release";
pub const DEFAULT_LINK_COMMAND: &str =
  "gcc -o {exe} {test} -Isrc -Ltarget/release -lc2rust_out -ldl -lpthread -lm";

/// Command lines for turning a traced C build into a runnable Rust artifact:
/// transpile the trace, build the emitted crate, then link each C test binary
/// against the produced library.
#[derive(Debug, Clone)]
pub struct TranspileAdapter {
  pub transpile_command: String,
  pub rust_build_command: String,
  pub link_command: String,
}

impl Default for TranspileAdapter {
  fn default() -> Self {
    Self {
      transpile_command: DEFAULT_TRANSPILE_COMMAND.to_string(),
      rust_build_command: DEFAULT_RUST_BUILD_COMMAND.to_string(),
      link_command: DEFAULT_LINK_COMMAND.to_string(),
    }
  }
}

impl TranspileAdapter {
  /// The transpile-then-build sequence that produces the translated artifact.
  pub fn build_lines(&self) -> [&str; 2] {
    [&self.transpile_command, &self.rust_build_command]
  }

  /// Executable name for one linked test binary.
  pub fn exe_name(test_file: &str) -> String {
    format!("c2rust_{}", test_stem(test_file))
  }

  /// Link line for one test file, and the command that runs the result.
  pub fn link_line(&self, test_file: &str) -> (String, String) {
    let exe = Self::exe_name(test_file);
    let line = self.link_command.replace("{exe}", &exe).replace("{test}", test_file);

    (line, format!("./{exe}"))
  }
}

pub fn test_stem(test_file: &str) -> String {
  Path::new(test_file)
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_else(|| test_file.to_string())
}
