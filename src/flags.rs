use std::fmt;

use serde::{Deserialize, Serialize};

/// One ordered subset of a program's declared compile flags, applied to a
/// single build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCombination(pub Vec<String>);

impl FlagCombination {
  pub fn join(&self) -> String {
    self.0.join(" ")
  }
}

impl fmt::Display for FlagCombination {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.0.is_empty() {
      write!(f, "(no flags)")
    } else {
      write!(f, "{}", self.join())
    }
  }
}

/// Materializes the power set of `flags`, the empty combination first. The
/// domain is computed once per program and reused for both variants.
pub fn combinations(flags: &[String]) -> Vec<FlagCombination> {
  let mut all = vec![FlagCombination(Vec::new())];

  for flag in flags {
    let len = all.len();
    for i in 0..len {
      let mut with = all[i].0.clone();
      with.push(flag.clone());
      all.push(FlagCombination(with));
    }
  }

  all
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn strings(flags: &[&str]) -> Vec<String> {
    flags.iter().map(|flag| flag.to_string()).collect()
  }

  #[test]
  fn empty_domain_yields_the_empty_combination() {
    assert_eq!(combinations(&[]), vec![FlagCombination(Vec::new())]);
  }

  #[test]
  fn power_set_of_two_flags() {
    let all = combinations(&strings(&["-DFOO", "-DBAR"]));

    assert_eq!(all.len(), 4);
    assert_eq!(all[0].join(), "");
    assert!(all.iter().any(|combination| combination.join() == "-DFOO"));
    assert!(all.iter().any(|combination| combination.join() == "-DBAR"));
    assert!(all.iter().any(|combination| combination.join() == "-DFOO -DBAR"));
  }

  #[test]
  fn power_set_size_doubles_per_flag() {
    assert_eq!(combinations(&strings(&["-DA", "-DB", "-DC"])).len(), 8);
  }
}
