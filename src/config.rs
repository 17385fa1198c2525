use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Inkgrade";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// History file name. Bumping the suffix is the only schema migration.
pub const HISTORY_FILE_NAME: &str = "history_v1.json";

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "gemma3:12b";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Get the application data directory.
/// `INKGRADE_DATA_DIR` wins; otherwise `<data dir>/Inkgrade`.
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("INKGRADE_DATA_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the persisted grading history.
pub fn history_path() -> PathBuf {
    app_data_dir().join(HISTORY_FILE_NAME)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "inkgrade=debug,inkgrade_lib=debug"
    } else {
        "inkgrade=info,inkgrade_lib=info"
    }
}

/// Connection settings for the grading model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraderConfig {
    /// Base URL of the Ollama instance.
    pub ollama_url: String,
    /// Vision-capable model that performs OCR and grading.
    pub model: String,
    /// Whole-request timeout. Grading several pages on CPU is slow.
    pub timeout_secs: u64,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GraderConfig {
    /// Read `INKGRADE_OLLAMA_URL`, `INKGRADE_MODEL` and `INKGRADE_TIMEOUT_SECS`,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs = match non_empty("INKGRADE_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Ignoring invalid INKGRADE_TIMEOUT_SECS");
                defaults.timeout_secs
            }),
            None => defaults.timeout_secs,
        };

        Self {
            ollama_url: non_empty("INKGRADE_OLLAMA_URL").unwrap_or(defaults.ollama_url),
            model: non_empty("INKGRADE_MODEL").unwrap_or(defaults.model),
            timeout_secs,
        }
    }

    /// Apply command-line overrides on top of the environment values.
    pub fn with_overrides(mut self, url: Option<String>, model: Option<String>) -> Self {
        if let Some(url) = url {
            self.ollama_url = url;
        }
        if let Some(model) = model {
            self.model = model;
        }
        self
    }
}
