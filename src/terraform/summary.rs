use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static APPLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Resources: (\d+) added, (\d+) changed, (\d+) destroyed\.")
        .expect("apply summary regex is valid")
});

static PLAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Plan: (?:\d+ to import, )?(\d+) to add, (\d+) to change, (\d+) to destroy\.")
        .expect("plan summary regex is valid")
});

static DESTROY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Destroy complete! Resources: (\d+) destroyed\.")
        .expect("destroy summary regex is valid")
});

const NO_CHANGES: &str = "No changes.";

/// Resource counts reported by apply, plan or destroy output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceCount {
    pub add: u32,
    pub change: u32,
    pub destroy: u32,
}

impl ResourceCount {
    /// Parses the last summary line found in `output`.
    ///
    /// Returns `None` when the output carries no recognisable summary.
    pub fn parse(output: &str) -> Option<Self> {
        if let Some(caps) = DESTROY_RE.captures_iter(output).last() {
            return Some(Self {
                destroy: number(&caps, 1)?,
                ..Self::default()
            });
        }

        for re in [&*APPLY_RE, &*PLAN_RE] {
            if let Some(caps) = re.captures_iter(output).last() {
                return Some(Self {
                    add: number(&caps, 1)?,
                    change: number(&caps, 2)?,
                    destroy: number(&caps, 3)?,
                });
            }
        }

        output.contains(NO_CHANGES).then(Self::default)
    }
}

impl std::fmt::Display for ResourceCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} changed, {} destroyed",
            self.add, self.change, self.destroy
        )
    }
}

fn number(caps: &regex::Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index)?.as_str().parse().ok()
}
