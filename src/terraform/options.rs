use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIME_BETWEEN_RETRIES: Duration = Duration::from_secs(5);

const NETWORK_PLUGIN_ERROR: &str = "Failed to retrieve plugin due to transient network error.";

/// Output patterns known to be transient, paired with a human readable reason.
///
/// Patterns are regular expressions matched against combined stdout/stderr.
pub const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    // Parallel runs contend on the network; a retry usually clears these.
    (
        ".*read: connection reset by peer.*",
        "Failed to reach helm charts repository.",
    ),
    (".*transport is closing.*", "Failed to reach Kubernetes API."),
    // `init` regularly flakes in CI while fetching plugins.
    (".*unable to verify signature.*", NETWORK_PLUGIN_ERROR),
    (".*unable to verify checksum.*", NETWORK_PLUGIN_ERROR),
    (".*no provider exists with the given name.*", NETWORK_PLUGIN_ERROR),
    (".*registry service is unreachable.*", NETWORK_PLUGIN_ERROR),
    (".*Error installing provider.*", NETWORK_PLUGIN_ERROR),
    (
        ".*Failed to query available provider packages.*",
        NETWORK_PLUGIN_ERROR,
    ),
    (".*timeout while waiting for plugin to start.*", NETWORK_PLUGIN_ERROR),
    (".*timed out waiting for server handshake.*", NETWORK_PLUGIN_ERROR),
    ("could not query provider registry for", NETWORK_PLUGIN_ERROR),
    // Eventual consistency in providers.
    (
        ".*Provider produced inconsistent result after apply.*",
        "Provider eventual consistency error.",
    ),
];

/// Everything needed to drive one configuration directory through the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Options {
    pub terraform_dir: PathBuf,
    /// NOTE: `None` means auto-detect `terraform`, falling back to `tofu`.
    pub binary: Option<String>,
    pub no_color: bool,
    pub retryable_errors: BTreeMap<String, String>,
    pub max_retries: u32,
    #[serde(with = "duration_secs")]
    pub time_between_retries: Duration,
    pub vars: BTreeMap<String, serde_json::Value>,
    pub var_files: Vec<PathBuf>,
    pub env_vars: BTreeMap<String, String>,
    pub backend_config: BTreeMap<String, String>,
    pub upgrade: bool,
    pub reconfigure: bool,
    pub lock: bool,
    pub lock_timeout: Option<String>,
    pub parallelism: Option<u32>,
    pub targets: Vec<String>,
    pub plugin_cache_dir: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            terraform_dir: PathBuf::from("."),
            binary: None,
            no_color: false,
            retryable_errors: BTreeMap::new(),
            max_retries: 0,
            time_between_retries: Duration::ZERO,
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            env_vars: BTreeMap::new(),
            backend_config: BTreeMap::new(),
            upgrade: false,
            reconfigure: false,
            lock: false,
            lock_timeout: None,
            parallelism: None,
            targets: Vec::new(),
            plugin_cache_dir: None,
        }
    }
}

impl Options {
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Resolved executable name: the configured one, else whichever of
    /// `terraform` / `tofu` is on `PATH`, else `terraform`.
    pub fn binary(&self) -> String {
        match &self.binary {
            Some(binary) => binary.clone(),
            None => detect_binary(),
        }
    }

    /// Environment passed to every invocation.
    pub fn command_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env_vars.clone();
        if let Some(cache) = &self.plugin_cache_dir {
            env.entry("TF_PLUGIN_CACHE_DIR".to_string())
                .or_insert_with(|| cache.display().to_string());
        }
        env
    }
}

/// Returns a copy of `options` with the default transient-error table merged
/// in and the default retry budget applied.
///
/// Entries already present in `options.retryable_errors` take precedence.
pub fn with_default_retryable_errors(options: &Options) -> Options {
    let mut merged: BTreeMap<String, String> = DEFAULT_RETRYABLE_ERRORS
        .iter()
        .map(|(pattern, reason)| (pattern.to_string(), reason.to_string()))
        .collect();
    merged.extend(options.retryable_errors.clone());

    Options {
        retryable_errors: merged,
        max_retries: DEFAULT_MAX_RETRIES,
        time_between_retries: DEFAULT_TIME_BETWEEN_RETRIES,
        ..options.clone()
    }
}

/// Default shared provider cache: `$XDG_CACHE_HOME/tfcheck/plugins`.
pub fn default_plugin_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("tfcheck").join("plugins"))
}

fn detect_binary() -> String {
    ["terraform", "tofu"]
        .into_iter()
        .find(|candidate| on_path(candidate))
        .unwrap_or("terraform")
        .to_string()
}

fn on_path(executable: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(executable).is_file())
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_new_sets_dir_and_defaults() {
        let options = Options::new("demos/default");
        assert_eq!(options.terraform_dir, Path::new("demos/default"));
        assert!(!options.no_color);
        assert!(options.retryable_errors.is_empty());
        assert_eq!(options.max_retries, 0);
    }

    #[test]
    fn test_default_retryable_errors_applied() {
        let options = with_default_retryable_errors(&Options::new("x").with_no_color(true));

        assert!(options.no_color);
        assert_eq!(options.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(options.time_between_retries, Duration::from_secs(5));
        assert_eq!(options.retryable_errors.len(), DEFAULT_RETRYABLE_ERRORS.len());
        assert_eq!(
            options.retryable_errors[".*Error installing provider.*"],
            NETWORK_PLUGIN_ERROR
        );
    }

    #[test]
    fn test_explicit_retryable_error_wins() {
        let mut options = Options::new("x");
        options.retryable_errors.insert(
            ".*transport is closing.*".to_string(),
            "custom reason".to_string(),
        );
        options
            .retryable_errors
            .insert("quota exceeded".to_string(), "cloud quota".to_string());

        let merged = with_default_retryable_errors(&options);

        assert_eq!(merged.retryable_errors[".*transport is closing.*"], "custom reason");
        assert_eq!(merged.retryable_errors["quota exceeded"], "cloud quota");
        assert_eq!(
            merged.retryable_errors.len(),
            DEFAULT_RETRYABLE_ERRORS.len() + 1
        );
    }

    #[test]
    fn test_default_patterns_compile() {
        for (pattern, _) in DEFAULT_RETRYABLE_ERRORS {
            assert!(regex::Regex::new(pattern).is_ok(), "bad pattern {pattern}");
        }
    }

    #[test]
    fn test_explicit_binary_is_used() {
        let options = Options::new("x").with_binary("tofu");
        assert_eq!(options.binary(), "tofu");
    }

    #[test]
    fn test_plugin_cache_in_env() {
        let mut options = Options::new("x");
        options.plugin_cache_dir = Some(PathBuf::from("/tmp/plugins"));
        options
            .env_vars
            .insert("TF_LOG".to_string(), "DEBUG".to_string());

        let env = options.command_env();
        assert_eq!(env["TF_PLUGIN_CACHE_DIR"], "/tmp/plugins");
        assert_eq!(env["TF_LOG"], "DEBUG");
    }

    #[test]
    fn test_explicit_plugin_cache_env_wins() {
        let mut options = Options::new("x");
        options.plugin_cache_dir = Some(PathBuf::from("/tmp/plugins"));
        options
            .env_vars
            .insert("TF_PLUGIN_CACHE_DIR".to_string(), "/custom".to_string());

        assert_eq!(options.command_env()["TF_PLUGIN_CACHE_DIR"], "/custom");
    }

    #[test]
    fn test_options_deserialize_partial() {
        let json = r#"{
            "terraform_dir": "demos/diff-rg",
            "no_color": true,
            "vars": {"location": "westeurope", "count": 2},
            "time_between_retries": 10
        }"#;
        let options: Options = serde_json::from_str(json).unwrap();
        assert_eq!(options.terraform_dir, PathBuf::from("demos/diff-rg"));
        assert!(options.no_color);
        assert_eq!(options.vars["location"], "westeurope");
        assert_eq!(options.vars["count"], 2);
        assert_eq!(options.time_between_retries, Duration::from_secs(10));
        assert!(options.targets.is_empty());
    }
}
